//! Trailing-edge debounce on top of a tokio timer.
//!
//! Every `trigger` aborts the pending timer and schedules a new one, so a
//! burst of triggers collapses into one callback fired `delay` after the last
//! trigger. The callback is shared so watch tasks can trigger a refresh
//! without holding a reference to the engine.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    callback: Callback,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Debouncer {
    pub fn new(delay: Duration, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            delay,
            callback: Arc::new(callback),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel any pending timer and start a new quiet period.
    ///
    /// Outside a tokio runtime there is no timer to schedule, so the callback
    /// runs immediately.
    pub fn trigger(&self) {
        let mut pending = self.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available, firing debounced callback immediately");
            drop(pending);
            (self.callback)();
            return;
        };

        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));
    }

    /// Drop the pending timer without firing.
    pub fn cancel(&self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        // A panicking callback runs on the timer task, never under this lock.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(delay_ms: u64) -> (Debouncer, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(delay_ms), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (debouncer, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_call() {
        let (debouncer, count) = counting(300);

        for _ in 0..5 {
            debouncer.trigger();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_quiet_periods_fire_separately() {
        let (debouncer, count) = counting(50);

        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(60)).await;
        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_callback() {
        let (debouncer, count) = counting(50);

        debouncer.trigger();
        assert!(debouncer.is_pending());
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_the_timer() {
        let (debouncer, count) = counting(50);
        let other = debouncer.clone();

        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(30)).await;
        other.trigger();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fires_immediately_without_runtime() {
        let (debouncer, count) = counting(50);
        debouncer.trigger();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
