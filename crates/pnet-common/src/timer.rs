//! A cancellable, extendable delayed callback, used for fragment-reassembly
//! reaping and similar reap-after-inactivity timers.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

enum Command {
    Extend(Duration),
    Cancel,
    Expire,
}

/// A handle to a scheduled one-shot callback. Dropping the handle does not
/// cancel the timer; call [`Timer::cancel`] explicitly.
pub struct Timer {
    tx: mpsc::UnboundedSender<Command>,
}

impl Timer {
    /// Schedule `callback` to run after `delay`, unless extended, cancelled,
    /// or expired early in the meantime.
    pub fn start<F>(delay: Duration, callback: F) -> Timer
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut deadline = Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        callback();
                        return;
                    }
                    cmd = rx.recv() => {
                        match cmd {
                            Some(Command::Extend(d)) => deadline = Instant::now() + d,
                            Some(Command::Cancel) | None => return,
                            Some(Command::Expire) => {
                                callback();
                                return;
                            }
                        }
                    }
                }
            }
        });
        Timer { tx }
    }

    /// Reset the remaining delay to `delay`, measured from now.
    pub fn extend(&self, delay: Duration) {
        let _ = self.tx.send(Command::Extend(delay));
    }

    /// Cancel the timer; the callback never runs.
    pub fn cancel(&self) {
        let _ = self.tx.send(Command::Cancel);
    }

    /// Fire the callback immediately, skipping the remaining delay.
    pub fn expire(&self) {
        let _ = self.tx.send(Command::Expire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let _t = Timer::start(Duration::from_secs(5), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn extend_resets_the_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let t = Timer::start(Duration::from_secs(5), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_secs(4)).await;
        t.extend(Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let t = Timer::start(Duration::from_secs(5), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        t.cancel();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_fires_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let t = Timer::start(Duration::from_secs(300), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        t.expire();
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
