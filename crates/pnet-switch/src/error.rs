use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("errorHorizon must be greater than zero")]
    ZeroErrorHorizon,
    #[error("delayRate must be within [0, 1], got {0}")]
    DelayRateOutOfRange(f64),
}
