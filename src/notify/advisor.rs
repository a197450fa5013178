//! Optional message-rewriting seam for an LLM-assisted advisor.
//!
//! The deterministic renderer is authoritative: the advisor may only
//! rewrite the already-rendered draft, never affect task state, and any
//! failure falls back to the draft unchanged.

use std::future::Future;
use std::pin::Pin;

use crate::models::task::TaskType;
use crate::Result;

/// Optional rewriter applied to a rendered notification body.
pub trait DecisionAdvisor: Send + Sync {
    /// Produce an alternative rendering of `draft` for the given group and
    /// tier.
    ///
    /// # Errors
    ///
    /// Implementations may fail freely; the caller always falls back to the
    /// deterministic draft.
    fn rewrite(
        &self,
        org_name: &str,
        task_type: TaskType,
        draft: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Default advisor that returns the draft untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdvisor;

impl DecisionAdvisor for NoopAdvisor {
    fn rewrite(
        &self,
        _org_name: &str,
        _task_type: TaskType,
        draft: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let draft = draft.to_owned();
        Box::pin(async move { Ok(draft) })
    }
}
