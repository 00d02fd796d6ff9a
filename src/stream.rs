use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectOptions;
use crate::error::{is_closed_manually, ReconnectError};
use crate::operation::{dial_with_backoff, retry_with_backoff, ReconnectOperation};
use crate::transport::{TcpConnector, UnderlyingIo};

/// The ReconnectStream is a wrapper over a transport produced by an [UnderlyingIo] connector.
/// It dials the transport upon initialization and redials it whenever a read or write
/// observes a disconnect, then retries that call once against the new transport.
///
/// Clones share the same logical connection, so reads and writes may run on different tasks.
pub struct ReconnectStream<T: UnderlyingIo> {
    core: Arc<Core<T>>,
}

impl<T: UnderlyingIo> Clone for ReconnectStream<T> {
    fn clone(&self) -> Self {
        ReconnectStream {
            core: self.core.clone(),
        }
    }
}

pub(crate) struct Core<T: UnderlyingIo> {
    pub(crate) connector: Arc<T>,
    pub(crate) options: ReconnectOptions,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: Mutex<State<T>>,
}

/// Guarded by a short-held lock: never held across I/O, a dial, the hook or a backoff sleep.
pub(crate) struct State<T: UnderlyingIo> {
    /// `None` once the stream is closed.
    pub(crate) link: Option<Arc<Link<T::Io>>>,
    pub(crate) addr: T::Addr,
    pub(crate) active: Option<ReconnectOperation>,
}

/// One established transport, split so a pending read does not block writers.
pub(crate) struct Link<Io> {
    reader: tokio::sync::Mutex<ReadHalf<Io>>,
    writer: tokio::sync::Mutex<WriteHalf<Io>>,
    pub(crate) generation: u64,
}

impl<Io> Link<Io>
where
    Io: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    pub(crate) fn new(io: Io, generation: u64) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Link {
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            generation,
        }
    }
}

impl<T: UnderlyingIo> Core<T> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn link(&self) -> io::Result<Arc<Link<T::Io>>> {
        self.lock()
            .link
            .clone()
            .ok_or_else(|| ReconnectError::ClosedManually.into())
    }

    async fn read_on(&self, link: &Link<T::Io>, buf: &mut [u8]) -> io::Result<usize> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconnectError::ClosedManually.into()),
            result = async { link.reader.lock().await.read(buf).await } => result,
        }
    }

    async fn write_on(&self, link: &Link<T::Io>, buf: &[u8]) -> io::Result<usize> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconnectError::ClosedManually.into()),
            result = async { link.writer.lock().await.write(buf).await } => result,
        }
    }

    /// `true` means the transport is gone and the call should be retried after a redial.
    fn needs_reconnect(&self, result: &io::Result<usize>, buf_len: usize) -> bool {
        match result {
            Ok(0) => buf_len > 0,
            Ok(_) => false,
            Err(e) if is_closed_manually(e) => false,
            Err(e) => self.connector.is_disconnect_error(e),
        }
    }
}

// Stops a detached reconnect task once the last handle is gone.
impl<T: UnderlyingIo> Drop for Core<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ReconnectStream<TcpConnector> {
    /// Resolves `host` and dials it over TCP, using the default reconnect options.
    pub async fn dial(host: &str) -> io::Result<Self> {
        Self::dial_with_options(host, ReconnectOptions::new()).await
    }

    /// Resolves `host` and dials each of its addresses in turn. Unless the options say to
    /// keep trying, a failed initial dial fails construction; otherwise the whole host is
    /// redialed with backoff. Redials reuse the peer address of the first socket that connected.
    pub async fn dial_with_options(host: &str, options: ReconnectOptions) -> io::Result<Self> {
        let connector = TcpConnector::new();
        let io = if options.exit_if_first_connect_fails() {
            match connector.dial_host(host).await {
                Ok(io) => io,
                Err(e) => {
                    error!("Initial connection to {} failed due to: {:?}.", host, e);
                    (options.on_connect_fail_callback())();
                    error!("Bailing after initial connection failure.");
                    return Err(e);
                }
            }
        } else {
            retry_with_backoff(host, &options, &CancellationToken::new(), || {
                connector.dial_host(host)
            })
            .await
            .map_err(|e| {
                error!("Never able to establish initial connection to {}.", host);
                e.into_io()
            })?
        };
        let addr = connector.remote_addr(&io)?;
        Self::with_transport(connector, io, addr, options).await
    }
}

impl<T: UnderlyingIo> ReconnectStream<T> {
    /// Connects or creates a handle to the transport dialed by `connector`,
    /// using the default reconnect options.
    pub async fn connect(connector: T, addr: T::Addr) -> io::Result<Self> {
        Self::connect_with_options(connector, addr, ReconnectOptions::new()).await
    }

    pub async fn connect_with_options(
        connector: T,
        addr: T::Addr,
        options: ReconnectOptions,
    ) -> io::Result<Self> {
        let io = if options.exit_if_first_connect_fails() {
            match connector.establish(addr.clone()).await {
                Ok(io) => io,
                Err(e) => {
                    error!("Initial connection failed due to: {:?}.", e);
                    (options.on_connect_fail_callback())();
                    error!("Bailing after initial connection failure.");
                    return Err(e);
                }
            }
        } else {
            dial_with_backoff(&connector, &addr, &options, &CancellationToken::new())
                .await
                .map_err(|e| {
                    error!("Never able to establish initial connection.");
                    e.into_io()
                })?
        };

        let addr = connector.remote_addr(&io).unwrap_or(addr);
        Self::with_transport(connector, io, addr, options).await
    }

    async fn with_transport(
        connector: T,
        mut io: T::Io,
        addr: T::Addr,
        options: ReconnectOptions,
    ) -> io::Result<Self> {
        if let Some(hook) = options.on_connected() {
            if let Err(e) = hook(&mut io).await {
                error!("Connect hook rejected the initial connection: {}", e);
                return Err(e);
            }
        }

        info!("Initial connection to {:?} succeeded.", addr);
        (options.on_connect_callback())();

        Ok(ReconnectStream {
            core: Arc::new(Core {
                connector: Arc::new(connector),
                options,
                cancel: CancellationToken::new(),
                state: Mutex::new(State {
                    link: Some(Arc::new(Link::new(io, 0))),
                    addr,
                    active: None,
                }),
            }),
        })
    }

    /// Reads into `buf` from the live transport.
    ///
    /// End of stream or a disconnect error triggers a redial; once it succeeds the read is
    /// retried exactly once on the new transport. Errors the connector does not classify as
    /// disconnects are returned unchanged.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let link = self.core.link()?;
        let result = self.core.read_on(&link, buf).await;
        if !self.core.needs_reconnect(&result, buf.len()) {
            return result;
        }
        debug!("Read on link #{} failed: {:?}", link.generation, result);

        self.core.reconnect(link.generation).await?;
        let link = self.core.link()?;
        self.core.read_on(&link, buf).await
    }

    /// Writes `buf` to the live transport, with the same reconnect behavior as [read](Self::read).
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let link = self.core.link()?;
        let result = self.core.write_on(&link, buf).await;
        if !self.core.needs_reconnect(&result, buf.len()) {
            return result;
        }
        debug!("Write on link #{} failed: {:?}", link.generation, result);

        self.core.reconnect(link.generation).await?;
        let link = self.core.link()?;
        self.core.write_on(&link, buf).await
    }

    /// Writes the whole buffer, calling [write](Self::write) until it is drained.
    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf).await? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Flushes the live transport. Flush failures are returned without redialing.
    pub async fn flush(&self) -> io::Result<()> {
        let link = self.core.link()?;
        tokio::select! {
            biased;
            _ = self.core.cancel.cancelled() => Err(ReconnectError::ClosedManually.into()),
            result = async { link.writer.lock().await.flush().await } => result,
        }
    }

    /// Stops every in-flight and future reconnect, then shuts down and releases the live
    /// transport. Calls in flight and all later calls fail with [ReconnectError::ClosedManually].
    ///
    /// The transport is dropped once the calls that were using it have returned.
    pub async fn close(&self) -> io::Result<()> {
        if !self.core.cancel.is_cancelled() {
            info!("Closing connection to {:?}", self.remote_addr());
        }
        self.core.cancel.cancel();

        let link = self.core.lock().link.take();
        let link = match link {
            Some(link) => link,
            None => return Ok(()),
        };
        let mut writer = link.writer.lock().await;
        writer.shutdown().await
    }

    /// The address of the live transport's peer, which is also where redials go.
    pub fn remote_addr(&self) -> T::Addr {
        self.core.lock().addr.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.core.cancel.is_cancelled()
    }
}
