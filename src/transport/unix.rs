use std::io;
use std::path::PathBuf;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::net::UnixStream;

use super::UnderlyingIo;

/// Dials Unix domain sockets by filesystem path.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixConnector;

impl UnderlyingIo for UnixConnector {
    type Io = UnixStream;
    type Addr = PathBuf;

    fn establish(&self, addr: PathBuf) -> BoxFuture<'static, io::Result<UnixStream>> {
        async move { UnixStream::connect(addr).await }.boxed()
    }

    fn remote_addr(&self, io: &UnixStream) -> io::Result<PathBuf> {
        io.peer_addr()?
            .as_pathname()
            .map(PathBuf::from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unnamed unix socket peer"))
    }
}
