//! Fragment reassembly: a single contiguous buffer sized to `totalSize`,
//! reaped after 5 minutes of no new fragment activity.

use std::time::Duration;

use pnet_common::Timer;

use crate::error::Error;

/// Reject reassemblies implausibly larger than this so a forged
/// `totalSize` can't be used to force an enormous allocation.
pub const MAX_REASSEMBLY_SIZE: u64 = 64 * 1024 * 1024;

pub const REAP_AFTER: Duration = Duration::from_secs(5 * 60);

pub struct Reassembly {
    buffer: Vec<u8>,
    total_size: u64,
    received: u64,
    timer: Timer,
}

impl Reassembly {
    pub fn new(total_size: u64, on_expire: impl FnOnce() + Send + 'static) -> Result<Self, Error> {
        if total_size > MAX_REASSEMBLY_SIZE {
            return Err(Error::ImplausibleFragmentSize(total_size));
        }
        Ok(Reassembly {
            buffer: vec![0u8; total_size as usize],
            total_size,
            received: 0,
            timer: Timer::start(REAP_AFTER, on_expire),
        })
    }

    /// Write one fragment's payload at `offset`. Returns the completed
    /// payload once every byte of `[0, total_size)` has arrived; the
    /// overlay's ordering guarantee is trusted not to overlap fragments, so
    /// completion is tracked by total bytes received rather than a bitmap.
    pub fn add_fragment(&mut self, offset: u64, data: &[u8]) -> Option<Vec<u8>> {
        self.timer.extend(REAP_AFTER);
        let start = offset as usize;
        let end = start + data.len();
        if end > self.buffer.len() {
            tracing::debug!(offset, len = data.len(), total = self.total_size, "fragment out of bounds, dropping");
            return None;
        }
        self.buffer[start..end].copy_from_slice(data);
        self.received += data.len() as u64;
        if self.received >= self.total_size {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }
}

impl Drop for Reassembly {
    fn drop(&mut self) {
        self.timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn rejects_implausible_total_size() {
        let err = Reassembly::new(MAX_REASSEMBLY_SIZE + 1, || {}).unwrap_err();
        assert!(matches!(err, Error::ImplausibleFragmentSize(_)));
    }

    #[test]
    fn completes_once_every_byte_arrives_in_order() {
        let mut r = Reassembly::new(10, || {}).unwrap();
        assert!(r.add_fragment(0, &[1, 2, 3, 4, 5]).is_none());
        let complete = r.add_fragment(5, &[6, 7, 8, 9, 10]).unwrap();
        assert_eq!(complete, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn completes_when_fragments_arrive_out_of_order() {
        let mut r = Reassembly::new(10, || {}).unwrap();
        assert!(r.add_fragment(5, &[6, 7, 8, 9, 10]).is_none());
        let complete = r.add_fragment(0, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(complete, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn reaps_after_five_minutes_of_inactivity() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let mut r = Reassembly::new(10, move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        r.add_fragment(0, &[1, 2, 3, 4, 5]);
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        r.add_fragment(5, &[6]); // activity extends the reap timer
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::advance(REAP_AFTER).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
