//! The reconnect operation shared by every caller that observes the same disconnect,
//! and the backoff-governed dial loop that drives it.

use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectOptions;
use crate::error::ReconnectError;
use crate::stream::{Core, Link};
use crate::transport::UnderlyingIo;

pub(crate) type Outcome = Result<(), ReconnectError>;

/// A one-shot barrier for the reconnect currently in progress. The dial loop runs on its
/// own task, so it keeps going when every caller waiting on it has been dropped. Every
/// clone resolves to the same outcome.
#[derive(Clone)]
pub(crate) struct ReconnectOperation {
    done: Shared<BoxFuture<'static, Outcome>>,
}

impl ReconnectOperation {
    fn spawn<F>(run: F) -> Self
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let handle = tokio::spawn(run);
        let done = async move {
            handle.await.unwrap_or_else(|e| {
                error!("Reconnect task failed: {}", e);
                Err(ReconnectError::Aborted)
            })
        };
        ReconnectOperation {
            done: done.boxed().shared(),
        }
    }

    pub(crate) async fn wait(self) -> Outcome {
        self.done.await
    }
}

pub(crate) enum DialError {
    Cancelled,
    Exhausted(io::Error),
}

impl DialError {
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            DialError::Cancelled => ReconnectError::ClosedManually.into(),
            DialError::Exhausted(e) => e,
        }
    }
}

impl From<DialError> for ReconnectError {
    fn from(err: DialError) -> Self {
        match err {
            DialError::Cancelled => ReconnectError::ClosedManually,
            DialError::Exhausted(e) => ReconnectError::Exhausted(Arc::new(e)),
        }
    }
}

/// Dials `addr` until it connects, waiting between failed attempts for as long as the
/// options' retries generator says. Both the dial and the wait abort once `cancel` fires.
pub(crate) async fn dial_with_backoff<T: UnderlyingIo>(
    connector: &T,
    addr: &T::Addr,
    options: &ReconnectOptions,
    cancel: &CancellationToken,
) -> Result<T::Io, DialError> {
    retry_with_backoff(addr, options, cancel, || connector.establish(addr.clone())).await
}

/// The loop behind [dial_with_backoff], for any `dial` that yields a transport.
pub(crate) async fn retry_with_backoff<Io, D, F, Fut>(
    target: &D,
    options: &ReconnectOptions,
    cancel: &CancellationToken,
    mut dial: F,
) -> Result<Io, DialError>
where
    D: Debug + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<Io>>,
{
    let mut retries_remaining = (options.retries_to_attempt_fn())();
    let sleep_provider = options.sleep_provider();
    let mut attempt_num: usize = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DialError::Cancelled);
        }

        attempt_num += 1;
        debug!("Attempting connect #{} to {:?} now.", attempt_num, target);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DialError::Cancelled),
            result = dial() => result,
        };

        let err = match result {
            Ok(io) => return Ok(io),
            Err(e) => e,
        };
        error!("Connection attempt #{} failed: {:?}", attempt_num, err);
        (options.on_connect_fail_callback())();

        let next_duration = match retries_remaining.next() {
            Some(duration) => duration,
            None => {
                error!("No more re-connect retries remaining. Giving up.");
                return Err(DialError::Exhausted(err));
            }
        };

        info!(
            "Will perform connect attempt #{} in {:?}.",
            attempt_num + 1,
            next_duration
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DialError::Cancelled),
            _ = sleep_provider(next_duration) => {}
        }
    }
}

impl<T: UnderlyingIo> Core<T> {
    /// Brings the stream back after a caller saw transport `generation` fail.
    ///
    /// Joins the reconnect already in progress if there is one. If the transport was
    /// replaced since `generation`, returns at once so the caller retries on the new one.
    pub(crate) async fn reconnect(self: &Arc<Self>, generation: u64) -> Outcome {
        if self.cancel.is_cancelled() {
            return Err(ReconnectError::ClosedManually);
        }

        let (operation, started) = {
            let mut state = self.lock();
            let current = match &state.link {
                Some(link) => link.generation,
                None => return Err(ReconnectError::ClosedManually),
            };
            if let Some(operation) = state.active.clone() {
                (operation, false)
            } else if current != generation {
                return Ok(());
            } else {
                let operation = ReconnectOperation::spawn(run_operation(
                    Arc::downgrade(self),
                    self.connector.clone(),
                    state.addr.clone(),
                    self.options.clone(),
                    self.cancel.clone(),
                ));
                state.active = Some(operation.clone());
                (operation, true)
            }
        };

        if started {
            error!("Disconnect occurred");
            (self.options.on_disconnect_callback())();
        } else {
            debug!("Joining reconnect already in progress.");
        }

        operation.wait().await
    }
}

async fn run_operation<T: UnderlyingIo>(
    core: Weak<Core<T>>,
    connector: Arc<T>,
    addr: T::Addr,
    options: ReconnectOptions,
    cancel: CancellationToken,
) -> Outcome {
    let dialed = dial_and_greet(&*connector, &addr, &options, &cancel).await;

    let core = match core.upgrade() {
        Some(core) => core,
        None => return Err(ReconnectError::ClosedManually),
    };

    let hook_result = {
        let mut state = core.lock();
        state.active = None;

        let (io, hook_result) = match dialed {
            Ok(dialed) => dialed,
            Err(e) => return Err(e),
        };
        // close() cancels before it takes the lock, so it either sees this transport or we see the signal
        if cancel.is_cancelled() {
            return Err(ReconnectError::ClosedManually);
        }

        let generation = match &state.link {
            Some(link) => link.generation + 1,
            None => return Err(ReconnectError::ClosedManually),
        };
        if let Ok(new_addr) = connector.remote_addr(&io) {
            state.addr = new_addr;
        }
        state.link = Some(Arc::new(Link::new(io, generation)));
        hook_result
    };

    match hook_result {
        Ok(()) => {
            info!("Connection re-established");
            (options.on_connect_callback())();
            Ok(())
        }
        Err(e) => {
            warn!("Connect hook failed on the new connection: {}", e);
            Err(ReconnectError::Handshake(Arc::new(e)))
        }
    }
}

/// Dials a new transport and runs the connect hook on it. The hook outcome is kept apart
/// from the transport so the transport can be installed even when the hook fails.
async fn dial_and_greet<T: UnderlyingIo>(
    connector: &T,
    addr: &T::Addr,
    options: &ReconnectOptions,
    cancel: &CancellationToken,
) -> Result<(T::Io, io::Result<()>), ReconnectError> {
    let mut io = dial_with_backoff(connector, addr, options, cancel).await?;

    let hook_result = match options.on_connected() {
        Some(hook) => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReconnectError::ClosedManually),
                result = hook(&mut io) => result,
            }
        }
        None => Ok(()),
    };

    Ok((io, hook_result))
}
