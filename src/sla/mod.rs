//! SLA core: business-time arithmetic and the threshold classifier.

pub mod business_time;
pub mod classifier;

pub use business_time::BusinessCalendar;
pub use classifier::{ClassificationStats, SlaClassifier, SlaThresholds};
