//! Our error types for the Genesys protocol layer.

use thiserror::Error;

use crate::fast_query::FrameError;
use crate::range::RangeViolation;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for Genesys bus communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    /// Wrong value shape, caught before anything is written to the bus.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error(transparent)]
    OutOfRange(#[from] RangeViolation),
    /// The reply broke the imperative/interrogative contract.
    #[error("Protocol mismatch: command {command:?} answered with {response:?}")]
    ProtocolMismatch { command: String, response: String },
    #[error("Device did not answer the fast query")]
    Unresponsive,
    #[error("Serial communication error")]
    SerialError(I),
    #[error("Unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),
    #[error("Response overflowed the line buffer")]
    BufferError,
    #[error("Invalid response received")]
    InvalidResponse,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl<I: embedded_io::Error> Error<I> {
    /// True for errors raised locally before any byte reached the wire.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::OutOfRange(_) | Error::UnsupportedBaudRate(_)
        )
    }
}
