//! Expiry Sweeper Task
//!
//! Background task that periodically reclaims expired entries in bounded
//! batches. Each store owns the `SweepHandle` of its sweeper; the task holds
//! only a weak reference to store state, so it ends when the store is
//! dropped even if nobody calls `shutdown`.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// == Schedule ==
/// How the sweeper re-arms between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed-rate ticker; a slow sweep delays the next tick instead of bursting
    FixedRate,
    /// Single-shot timer started again after each run completes
    Rearm,
}

// == Sweep Handle ==
/// Owner-side handle of a sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct SweepHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// A handle with no task behind it, used when sweeping is disabled.
    pub fn disabled() -> Self {
        Self {
            token: CancellationToken::new(),
            task: None,
        }
    }

    /// Returns true while the background task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signals the task to stop after its current run.
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns a sweeper that calls `sweep` every `interval`.
///
/// `sweep` returns the number of entries it removed, or `None` once the
/// store it serves is gone, which ends the task. A zero interval, or a call
/// made outside a tokio runtime, yields a disabled handle and expiry stays
/// purely lazy.
pub fn spawn_sweeper<F, Fut>(
    label: &'static str,
    interval: Duration,
    schedule: Schedule,
    mut sweep: F,
) -> SweepHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Option<usize>> + Send + 'static,
{
    if interval.is_zero() {
        debug!(sweeper = label, "Sweep interval is zero, background sweeping disabled");
        return SweepHandle::disabled();
    }

    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            warn!(
                sweeper = label,
                "No tokio runtime available, falling back to lazy expiry only"
            );
            return SweepHandle::disabled();
        }
    };

    let token = CancellationToken::new();
    let cancelled = token.clone();

    let task = runtime.spawn(async move {
        info!(
            sweeper = label,
            interval_ms = interval.as_millis() as u64,
            ?schedule,
            "Starting expiry sweeper"
        );

        match schedule {
            Schedule::FixedRate => {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Skip the first immediate tick
                ticker.tick().await;

                loop {
                    tokio::select! {
                        biased;

                        _ = cancelled.cancelled() => break,

                        _ = ticker.tick() => {
                            if !run_once(label, &mut sweep).await {
                                break;
                            }
                        }
                    }
                }
            }
            Schedule::Rearm => loop {
                tokio::select! {
                    biased;

                    _ = cancelled.cancelled() => break,

                    _ = tokio::time::sleep(interval) => {
                        if !run_once(label, &mut sweep).await {
                            break;
                        }
                    }
                }
            },
        }

        info!(sweeper = label, "Expiry sweeper stopped");
    });

    SweepHandle {
        token,
        task: Some(task),
    }
}

/// Runs one sweep. Returns false when the store has been dropped.
async fn run_once<F, Fut>(label: &'static str, sweep: &mut F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<usize>>,
{
    match sweep().await {
        Some(0) => {
            debug!(sweeper = label, "Sweep: no expired entries found");
            true
        }
        Some(removed) => {
            debug!(sweeper = label, removed, "Sweep: removed expired entries");
            true
        }
        None => {
            debug!(sweeper = label, "Store dropped, ending sweeper");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_sweeper(
        interval: Duration,
        schedule: Schedule,
    ) -> (SweepHandle, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_sweeper("test", interval, schedule, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Some(0)
            }
        });
        (handle, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_rate_sweeper_ticks() {
        let (handle, runs) = counting_sweeper(Duration::from_secs(1), Schedule::FixedRate);
        assert!(handle.is_active());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_sweeper_ticks() {
        let (_handle, runs) = counting_sweeper(Duration::from_secs(1), Schedule::Rearm);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeper() {
        let (handle, runs) = counting_sweeper(Duration::from_secs(1), Schedule::FixedRate);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.shutdown();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_sweeper() {
        let (handle, runs) = counting_sweeper(Duration::from_secs(1), Schedule::Rearm);
        drop(handle);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_ends_when_store_is_gone() {
        let handle = spawn_sweeper("gone", Duration::from_secs(1), Schedule::FixedRate, || async {
            None
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_zero_interval_disables_sweeper() {
        let (handle, _) = counting_sweeper(Duration::ZERO, Schedule::FixedRate);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_no_runtime_disables_sweeper() {
        let handle = spawn_sweeper("orphan", Duration::from_secs(1), Schedule::Rearm, || async {
            Some(0)
        });
        assert!(!handle.is_active());
    }
}
