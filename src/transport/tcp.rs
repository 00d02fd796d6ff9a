use std::io;
use std::net::SocketAddr;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;
use tokio::net::{lookup_host, TcpStream};

use super::UnderlyingIo;

/// Dials TCP endpoints with tokio's [TcpStream].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `TCP_NODELAY` on every dialed socket.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Resolves `host` and dials each address in turn, returning the first socket
    /// that connects or the last error seen.
    pub async fn dial_host(&self, host: &str) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in lookup_host(host).await? {
            match self.establish(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Dial to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("could not resolve to any address: {}", host),
            )
        }))
    }
}

impl UnderlyingIo for TcpConnector {
    type Io = TcpStream;
    type Addr = SocketAddr;

    fn establish(&self, addr: SocketAddr) -> BoxFuture<'static, io::Result<TcpStream>> {
        let nodelay = self.nodelay;
        async move {
            let stream = TcpStream::connect(addr).await?;
            if nodelay {
                stream.set_nodelay(true)?;
            }
            Ok(stream)
        }
        .boxed()
    }

    fn remote_addr(&self, io: &TcpStream) -> io::Result<SocketAddr> {
        io.peer_addr()
    }
}
