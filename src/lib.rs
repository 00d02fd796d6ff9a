//! Contains the ingredients needed to keep one logical byte-stream connection alive across
//! network failures. A [ReconnectStream] owns a live transport and, when a read or write finds
//! the connection gone, redials the same remote address with exponential backoff, re-runs an
//! optional connect hook (for a handshake or authentication), swaps in the new transport and
//! retries the call that noticed the failure.
//!
//! Concurrent callers that observe the same disconnect share a single reconnect: exactly one dial
//! loop runs and every caller receives its outcome. [ReconnectStream::close] cancels any dial or
//! backoff in progress and makes all later reconnects fail with
//! [ReconnectError::ClosedManually].
//!
//! TCP and Unix sockets are supported out of the box. For anything else, implement the
//! [UnderlyingIo](crate::transport::UnderlyingIo) trait.
//!
//! ## Example
//! ```no_run
//! # async fn run() -> std::io::Result<()> {
//! use futures::FutureExt;
//! use self_healing_stream::{ReconnectOptions, ReconnectStream};
//! use tokio::io::AsyncWriteExt;
//!
//! let options = ReconnectOptions::new()
//!     .with_on_connected(|io| async move { io.write_all(b"0000\n").await }.boxed());
//! let stream = ReconnectStream::dial_with_options("localhost:6606", options).await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = stream.read(&mut buf).await?;
//! stream.write_all(&buf[..n]).await?;
//! stream.close().await?;
//! # Ok(())
//! # }
//! ```

#[doc(inline)]
pub use crate::config::ReconnectOptions;
pub use crate::error::{is_closed_manually, ReconnectError};
pub use crate::stream::ReconnectStream;
pub use crate::transport::{Transport, UnderlyingIo};

pub mod config;
mod error;
mod operation;
pub mod strategies;
mod stream;
pub mod transport;
