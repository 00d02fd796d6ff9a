//! An in-memory connector for tests: every dial pops the next scripted result.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use super::UnderlyingIo;

type Fault = Arc<Mutex<Option<io::ErrorKind>>>;

/// Client side of an in-memory connection. Can be told to fail every call with a given kind.
pub(crate) struct MockIo {
    inner: DuplexStream,
    fault: Fault,
    reads: Arc<AtomicUsize>,
}

/// Server side handed back to the test.
pub(crate) struct Peer {
    pub(crate) io: DuplexStream,
    fault: Fault,
    reads: Arc<AtomicUsize>,
}

impl Peer {
    pub(crate) fn fail_with(&self, kind: io::ErrorKind) {
        *self.fault.lock().unwrap() = Some(kind);
    }

    /// Completed reads on the client side of this connection.
    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MockIo {
    fn fault(&self) -> Option<io::Error> {
        self.fault.lock().unwrap().map(io::Error::from)
    }
}

impl AsyncRead for MockIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(err) = self.fault() {
            return Poll::Ready(Err(err));
        }
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if poll.is_ready() {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
        poll
    }
}

impl AsyncWrite for MockIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(err) = self.fault() {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Dials pop scripted results in order; an empty script refuses the connection.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    script: Arc<Mutex<VecDeque<io::Result<MockIo>>>>,
    dials: Arc<AtomicUsize>,
    dial_delay: Duration,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }

    pub(crate) fn push_ok(&self) -> Peer {
        let (client, server) = duplex(1024);
        let fault = Fault::default();
        let reads = Arc::new(AtomicUsize::new(0));
        self.script.lock().unwrap().push_back(Ok(MockIo {
            inner: client,
            fault: fault.clone(),
            reads: reads.clone(),
        }));
        Peer {
            io: server,
            fault,
            reads,
        }
    }

    pub(crate) fn push_err(&self, kind: io::ErrorKind) {
        self.script.lock().unwrap().push_back(Err(kind.into()));
    }

    pub(crate) fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl UnderlyingIo for MockConnector {
    type Io = MockIo;
    type Addr = String;

    fn establish(&self, _addr: String) -> BoxFuture<'static, io::Result<MockIo>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::ConnectionRefused.into()));
        let delay = self.dial_delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            next
        }
        .boxed()
    }

    fn remote_addr(&self, _io: &MockIo) -> io::Result<String> {
        Ok("mock".to_string())
    }
}
