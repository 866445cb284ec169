//! This module contains the [Notifier] struct.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::task::Context;
use std::task::Poll;

#[derive(Default)]
struct NotifierState {
    /// Indicates whether state has woken.
    pub(crate) woken: bool,

    /// The wakers associated with State.
    pub(crate) wakers: Vec<std::task::Waker>,
}

/// A notifier that can be woken by calling `wake`.
/// Every clone observes the same wake-up; awaiting a woken notifier completes at once.
#[derive(Clone, Default)]
pub struct Notifier(Arc<Mutex<NotifierState>>);

impl Notifier {
    fn state(&self) -> MutexGuard<'_, NotifierState> {
        // The state stays valid even if a holder panicked.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Immediately wake the notifier.
    pub fn wake(&self) {
        let mut state = self.state();
        state.woken = true;
        for waker in state.wakers.drain(..) {
            waker.wake();
        }
    }
}

impl Future for Notifier {
    type Output = ();
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state();

        if state.woken {
            return Poll::Ready(());
        }

        state.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::scheduler::Scheduler;
    use crate::core::scheduler::TokioScheduler;

    #[tokio::test(start_paused = true)]
    async fn test_notifier_wakes_every_waiter() {
        let scheduler = TokioScheduler::new();
        let notifier = Notifier::default();
        let waker = notifier.clone();
        let sleep = scheduler.sleep(Duration::from_secs(1));
        tokio::spawn(async move {
            sleep.await;
            waker.wake();
        });

        let mut jobs = vec![];

        // Waiters registered before the wake-up.
        for _ in 0..3 {
            let notifier_clone = notifier.clone();
            jobs.push(tokio::spawn(async move {
                notifier_clone.await;
            }));
        }

        // Waiters arriving after the wake-up.
        for _ in 0..3 {
            let notifier_clone = notifier.clone();
            jobs.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                notifier_clone.await;
            }));
        }

        for job in futures::future::join_all(jobs).await {
            assert!(job.is_ok());
        }
        notifier.await;
    }
}
