//! The boundary between [ReconnectStream](crate::ReconnectStream) and the networking layer:
//! the [UnderlyingIo] trait that dials and classifies errors, plus ready to use
//! connectors for TCP and Unix domain sockets.

#[cfg(test)]
pub(crate) mod mock;
mod tcp;
#[cfg(unix)]
mod unix;

use std::fmt::Debug;
use std::io;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

pub use self::tcp::TcpConnector;
#[cfg(unix)]
pub use self::unix::UnixConnector;

/// A live byte-stream handed to the connect hook.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Trait that should be implemented by a connector so that [ReconnectStream](crate::ReconnectStream)
/// can establish the initial transport and redial it after a disconnect.
pub trait UnderlyingIo: Send + Sync + 'static {
    /// The transport produced by a successful dial.
    type Io: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Where to dial. Redials reuse the address reported by [UnderlyingIo::remote_addr].
    type Addr: Clone + Debug + Send + Sync + 'static;

    /// Dials `addr`. Used for the initial connection as well as every redial.
    /// Dropping the returned future must abort the attempt.
    fn establish(&self, addr: Self::Addr) -> BoxFuture<'static, io::Result<Self::Io>>;

    /// The remote address of a live transport.
    fn remote_addr(&self, io: &Self::Io) -> io::Result<Self::Addr>;

    /// When a transport fails with an [io::Error], it does not necessarily mean the
    /// connection is gone (ex: WouldBlock, TimedOut). Errors for which this returns `true`
    /// trigger a redial; all others are returned to the caller unchanged.
    fn is_disconnect_error(&self, err: &io::Error) -> bool {
        is_permanent(err)
    }
}

/// Sensible default: errors that mean the peer or the socket is gone.
pub fn is_permanent(err: &io::Error) -> bool {
    use io::ErrorKind::*;

    matches!(
        err.kind(),
        ConnectionReset | ConnectionAborted | BrokenPipe | NotConnected | UnexpectedEof | WriteZero
    )
}
