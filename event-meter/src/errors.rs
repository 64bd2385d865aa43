use crate::meter::MeterState;
use thiserror::Error;

/// The result type of the meter operations.
pub type Result<T> = std::result::Result<T, MeterError>;

/// The errors which can occur while creating or controlling a meter.
///
/// Counting operations themselves never fail, these errors only concern the
/// configuration and the lifecycle of the background clock.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MeterError {
    /// The meter configuration contains an invalid value.
    #[error("the meter configuration is invalid, {0}")]
    InvalidConfig(String),
    /// No tokio runtime is available to run the clock on.
    #[error("no runtime is available to run the meter clock")]
    RuntimeUnavailable,
    /// The requested operation is not allowed in the current state of the meter.
    #[error("the meter is in an invalid state ({0}) for this operation")]
    InvalidState(MeterState),
}
