//! Pause and cancel signals for one live collection run.
//!
//! Cancellation is a [`CancellationToken`]; pause is a `watch` channel the
//! run loop blocks on at source boundaries. A [`RunControl`] is cheap to
//! clone and every clone drives the same run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct RunControl {
    cancel: CancellationToken,
    pause: Arc<watch::Sender<bool>>,
    resumed: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            pause: Arc::new(tx),
            resumed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pause(&self) {
        self.pause.send_replace(true);
    }

    pub fn resume(&self) {
        self.resumed.store(true, Ordering::SeqCst);
        self.pause.send_replace(false);
    }

    /// Whether `resume` was called since the last check. Lets the run loop
    /// tell a pause it has already been released from apart from one
    /// persisted by another process.
    pub fn take_resumed(&self) -> bool {
        self.resumed.swap(false, Ordering::SeqCst)
    }

    /// Cancels the run. Also releases a run blocked on pause.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.pause.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Blocks while paused. Returns `false` if the run was cancelled
    /// instead of resumed.
    pub async fn wait_while_paused(&self) -> bool {
        let mut rx = self.pause.subscribe();
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            released = async { rx.wait_for(|paused| !*paused).await.is_ok() } => {
                released && !self.cancel.is_cancelled()
            }
        }
    }

    /// Sleeps for `duration` unless cancelled first. Returns `false` on cancel.
    pub async fn sleep(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn resume_releases_waiter() {
        let control = RunControl::new();
        control.pause();
        assert!(control.is_paused());

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_while_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        control.resume();
        assert!(waiter.await.unwrap());
        assert!(control.take_resumed());
        assert!(!control.take_resumed());
    }

    #[tokio::test]
    async fn cancel_releases_waiter_with_false() {
        let control = RunControl::new();
        control.pause();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_while_paused().await })
        };
        control.cancel();
        assert!(!waiter.await.unwrap());
        assert!(control.is_cancelled());
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn not_paused_returns_immediately() {
        assert!(RunControl::new().wait_while_paused().await);
    }

    #[tokio::test]
    async fn sleep_is_cut_short_by_cancel() {
        let control = RunControl::new();
        control.cancel();
        assert!(!control.sleep(Duration::from_secs(60)).await);
    }
}
