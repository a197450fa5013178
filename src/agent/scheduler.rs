//! Tick scheduler: fires the orchestrator at a fixed interval and exposes
//! a manual trigger.
//!
//! Triggers are delivered over a capacity-one channel to a single consumer,
//! so at most one tick executes at a time. A trigger that fires while a
//! tick is running is dropped and counted as missed, never queued. The
//! first scheduled tick fires one full interval after start; the process
//! never auto-fires on boot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::AppError;

use super::orchestrator::{TickOrchestrator, TickTrigger};

/// Spawn the scheduler's producer and consumer tasks.
#[must_use]
pub fn spawn(
    orchestrator: Arc<TickOrchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) -> SchedulerHandle {
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<TickTrigger>(1);
    let missed = Arc::new(AtomicU64::new(0));
    let busy = Arc::new(AtomicBool::new(false));

    let producer = {
        let trigger_tx = trigger_tx.clone();
        let missed = Arc::clone(&missed);
        let busy = Arc::clone(&busy);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("scheduler producer shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if busy.load(Ordering::SeqCst)
                            || trigger_tx.try_send(TickTrigger::Scheduled).is_err()
                        {
                            let total = missed.fetch_add(1, Ordering::SeqCst) + 1;
                            warn!(total_missed = total, "tick still running, dropping trigger");
                        }
                    }
                }
            }
        })
    };

    let consumer = {
        let missed = Arc::clone(&missed);
        let busy = Arc::clone(&busy);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("scheduler consumer shutting down");
                        break;
                    }
                    trigger = trigger_rx.recv() => {
                        let Some(trigger) = trigger else { break };
                        busy.store(true, Ordering::SeqCst);
                        match orchestrator.run_tick(trigger).await {
                            Ok(run) => {
                                info!(
                                    run_id = %run.id,
                                    status = ?run.status,
                                    processed = run.opportunities_processed,
                                    sent = run.notifications_sent,
                                    "tick run recorded"
                                );
                            }
                            Err(AppError::Busy(_)) => {
                                missed.fetch_add(1, Ordering::SeqCst);
                                warn!("trigger raced a running tick, dropped");
                            }
                            Err(err) => {
                                error!(%err, "tick failed to open or close its run");
                            }
                        }
                        busy.store(false, Ordering::SeqCst);
                    }
                }
            }
        })
    };

    SchedulerHandle {
        trigger_tx,
        missed,
        busy,
        cancel,
        producer,
        consumer,
    }
}

/// Handle for triggering and shutting down the scheduler.
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<TickTrigger>,
    missed: Arc<AtomicU64>,
    busy: Arc<AtomicBool>,
    cancel: CancellationToken,
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request an immediate manual tick.
    ///
    /// Returns `false` when a tick is already running or queued; the
    /// request is dropped and counted, matching scheduled-trigger behavior.
    pub fn try_trigger(&self) -> bool {
        if self.busy.load(Ordering::SeqCst) {
            self.missed.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        if self.trigger_tx.try_send(TickTrigger::Manual).is_err() {
            self.missed.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Triggers dropped because a tick was still running.
    #[must_use]
    pub fn missed_ticks(&self) -> u64 {
        self.missed.load(Ordering::SeqCst)
    }

    /// Whether a tick is currently executing.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Stop both scheduler tasks and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.producer.await;
        let _ = self.consumer.await;
    }
}
