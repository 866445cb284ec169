//! This module contains the [Scheduler] trait and its tokio implementation.
//!
//! Every protocol timer (heartbeats, repair timeouts, update periods) goes through a
//! [Scheduler], and every clock reading through [Scheduler::now_ms]. With
//! [TokioScheduler] on a paused tokio runtime the same code runs on virtual time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::future::Either;

/// A job run by the scheduler. It is called once per firing.
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Shared scheduler trait object.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Handle of a scheduled job.
/// Dropping the handle leaves the job running; call [TimerHandle::cancel] to stop it.
#[derive(Debug)]
pub struct TimerHandle {
    handle: tokio::task::AbortHandle,
}

impl TimerHandle {
    /// Stop the job. A firing that is in progress is interrupted at its next await point.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the job has run to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Timers and clock consumed by the protocol.
pub trait Scheduler: Send + Sync {
    /// Milliseconds elapsed on this scheduler's clock.
    fn now_ms(&self) -> u64;

    /// A future completing after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Run `job` after `delay`, then every `period` if one is given.
    /// Firings never overlap: the next period starts after the previous firing completes.
    fn schedule(&self, delay: Duration, period: Option<Duration>, job: Job) -> TimerHandle;
}

/// [Scheduler] driven by tokio time.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    origin: tokio::time::Instant,
}

impl TokioScheduler {
    /// Create a scheduler whose clock starts at zero now.
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }

    fn schedule(&self, delay: Duration, period: Option<Duration>, job: Job) -> TimerHandle {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            loop {
                job().await;
                match period {
                    Some(p) => tokio::time::sleep(p).await,
                    None => break,
                }
            }
        });
        TimerHandle {
            handle: task.abort_handle(),
        }
    }
}

/// Race `fut` against a scheduler sleep. Returns `None` when the sleep wins.
pub async fn timeout<F>(scheduler: &dyn Scheduler, duration: Duration, fut: F) -> Option<F::Output>
where F: Future {
    let sleep = scheduler.sleep(duration);
    futures::pin_mut!(fut);
    match futures::future::select(fut, sleep).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    fn counting_job(counter: Arc<AtomicUsize>) -> Job {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_job_runs_once() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule(
            Duration::from_millis(100),
            None,
            counting_job(counter.clone()),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_job_stops_on_cancel() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule(
            Duration::ZERO,
            Some(Duration::from_millis(100)),
            counting_job(counter.clone()),
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        let fired = counter.load(Ordering::SeqCst);
        assert!(fired >= 3, "fired {fired} times");

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(counter.load(Ordering::SeqCst), fired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_paused_time() {
        let scheduler = TokioScheduler::new();
        assert_eq!(scheduler.now_ms(), 0);
        tokio::time::sleep(Duration::from_secs(5)).await;
        let now = scheduler.now_ms();
        assert!((5000..5010).contains(&now), "now is {now}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_race() {
        let scheduler = TokioScheduler::new();
        let quick = timeout(&scheduler, Duration::from_millis(100), async { 7 }).await;
        assert_eq!(quick, Some(7));

        let slow = timeout(
            &scheduler,
            Duration::from_millis(100),
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await;
        assert!(slow.is_none());
    }
}
