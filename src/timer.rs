use crate::monotime::MonoTime;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One-shot scheduled callback.
///
/// The callback runs on a spawned task once the deadline passes, unless
/// the handle is cancelled first. Dropping the handle cancels the timer;
/// `cancel` is idempotent. Callers that can lose the cancellation race
/// (a timer firing while its cancel is in flight) must re-validate state
/// inside the callback.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Schedule `f` to run at the absolute deadline `at`.
pub fn schedule_at<F>(at: MonoTime, f: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let token = CancellationToken::new();
    let guard = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = guard.cancelled() => {}
            _ = tokio::time::sleep_until(at.into()) => f(),
        }
    });
    TimerHandle { token }
}

/// Schedule `f` to run after `delay` from now.
pub fn schedule_in<F>(delay: Duration, f: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    schedule_at(MonoTime::now() + delay, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fires_after_deadline() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let _t = schedule_in(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let t = schedule_in(Duration::from_millis(40), move || {
            flag.store(true, Ordering::SeqCst);
        });
        t.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drop_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        drop(schedule_in(Duration::from_millis(40), move || {
            flag.store(true, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
