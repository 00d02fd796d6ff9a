//! Errors surfaced when a reconnect does not produce a usable transport.

use std::io;
use std::sync::Arc;

/// The outcome of a failed reconnect, shared by every caller that waited on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconnectError {
    /// [close](crate::ReconnectStream::close) was called; no further dials happen.
    #[error("connection closed manually")]
    ClosedManually,

    /// A new transport was dialed but the connect hook rejected it.
    #[error("connect hook failed: {0}")]
    Handshake(#[source] Arc<io::Error>),

    /// The retries generator ran out before a dial succeeded. Carries the last dial error.
    #[error("no more reconnect retries remaining: {0}")]
    Exhausted(#[source] Arc<io::Error>),

    /// The background reconnect task panicked or was torn down with its runtime.
    #[error("reconnect task ended without an outcome")]
    Aborted,
}

impl ReconnectError {
    /// Looks through an [io::Error] returned by the stream for the reconnect failure it carries.
    pub fn from_io(err: &io::Error) -> Option<&ReconnectError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<ReconnectError>())
    }

    fn kind(&self) -> io::ErrorKind {
        match self {
            ReconnectError::ClosedManually | ReconnectError::Exhausted(_) => {
                io::ErrorKind::NotConnected
            }
            ReconnectError::Handshake(err) => err.kind(),
            ReconnectError::Aborted => io::ErrorKind::Other,
        }
    }
}

impl From<ReconnectError> for io::Error {
    fn from(err: ReconnectError) -> Self {
        io::Error::new(err.kind(), err)
    }
}

/// Returns true if `err` reports that the stream was closed by its owner.
pub fn is_closed_manually(err: &io::Error) -> bool {
    matches!(
        ReconnectError::from_io(err),
        Some(ReconnectError::ClosedManually)
    )
}
