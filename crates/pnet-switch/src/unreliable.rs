//! Runtime-mutable unreliability knobs for a switch's per-session write
//! path: random bit flips within a sliding byte window, and probabilistic
//! write delay. Both are SPMP-mutable, hence the plain struct rather than
//! constructor-only configuration.

use std::time::Duration;

use rand::Rng;

use crate::error::Error;

#[derive(Debug, Clone, Copy)]
pub struct UnreliableConfig {
    errors_per_horizon: u32,
    error_horizon: u32,
    delay_rate: f64,
    delay_seconds: f64,
}

impl UnreliableConfig {
    pub fn new(
        errors_per_horizon: u32,
        error_horizon: u32,
        delay_rate: f64,
        delay_seconds: f64,
    ) -> Result<Self, Error> {
        if error_horizon == 0 {
            return Err(Error::ZeroErrorHorizon);
        }
        if !(0.0..=1.0).contains(&delay_rate) {
            return Err(Error::DelayRateOutOfRange(delay_rate));
        }
        Ok(UnreliableConfig {
            errors_per_horizon,
            error_horizon,
            delay_rate,
            delay_seconds,
        })
    }

    pub fn delay(&self) -> Option<Duration> {
        if self.delay_rate > 0.0 && rand::thread_rng().gen_bool(self.delay_rate) {
            Some(Duration::from_secs_f64(self.delay_seconds))
        } else {
            None
        }
    }

    /// Flip up to `errors_per_horizon` randomly chosen bits in each
    /// `error_horizon`-byte window of `bytes`, in place.
    pub fn corrupt(&self, bytes: &mut [u8]) {
        if self.errors_per_horizon == 0 {
            return;
        }
        let mut rng = rand::thread_rng();
        for window in bytes.chunks_mut(self.error_horizon as usize) {
            if window.is_empty() {
                continue;
            }
            for _ in 0..self.errors_per_horizon {
                let byte_idx = rng.gen_range(0..window.len());
                let bit = 1u8 << rng.gen_range(0..8);
                window[byte_idx] ^= bit;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_horizon() {
        assert!(matches!(
            UnreliableConfig::new(1, 0, 0.0, 0.0),
            Err(Error::ZeroErrorHorizon)
        ));
    }

    #[test]
    fn rejects_out_of_range_delay_rate() {
        assert!(matches!(
            UnreliableConfig::new(1, 10, 1.5, 0.0),
            Err(Error::DelayRateOutOfRange(_))
        ));
    }

    #[test]
    fn zero_rate_never_corrupts() {
        let cfg = UnreliableConfig::new(0, 10, 0.0, 0.0).unwrap();
        let mut data = vec![1u8, 2, 3, 4, 5];
        let original = data.clone();
        cfg.corrupt(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn zero_rate_never_delays() {
        let cfg = UnreliableConfig::new(0, 10, 0.0, 1.0).unwrap();
        assert!(cfg.delay().is_none());
    }
}
