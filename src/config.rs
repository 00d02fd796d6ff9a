//! Provides options to configure the behavior of [ReconnectStream](crate::ReconnectStream),
//! specifically related to reconnect behavior.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::strategies::ExpBackoffStrategy;
use crate::transport::Transport;

pub type DurationIterator = Box<dyn Iterator<Item = Duration> + Send + Sync>;

/// Runs on every freshly dialed transport before it is handed to callers.
pub type ConnectHook =
    Arc<dyn for<'a> Fn(&'a mut dyn Transport) -> BoxFuture<'a, io::Result<()>> + Send + Sync>;

type SleepProvider = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// User specified options that control the behavior of the [ReconnectStream](crate::ReconnectStream) upon disconnect.
#[derive(Clone)]
pub struct ReconnectOptions(Box<Inner>);

impl ReconnectOptions {
    pub(crate) fn retries_to_attempt_fn(&self) -> &Arc<dyn Fn() -> DurationIterator + Send + Sync> {
        &self.0.retries_to_attempt_fn
    }
    pub(crate) fn exit_if_first_connect_fails(&self) -> bool {
        self.0.exit_if_first_connect_fails
    }
    pub(crate) fn on_connected(&self) -> Option<&ConnectHook> {
        self.0.on_connected.as_ref()
    }
    pub(crate) fn on_connect_callback(&self) -> &Arc<dyn Fn() + Send + Sync> {
        &self.0.on_connect_callback
    }
    pub(crate) fn on_disconnect_callback(&self) -> &Arc<dyn Fn() + Send + Sync> {
        &self.0.on_disconnect_callback
    }
    pub(crate) fn on_connect_fail_callback(&self) -> &Arc<dyn Fn() + Send + Sync> {
        &self.0.on_connect_fail_callback
    }
    pub(crate) fn sleep_provider(&self) -> SleepProvider {
        self.0.sleep_provider.clone()
    }
}

#[derive(Clone)]
struct Inner {
    retries_to_attempt_fn: Arc<dyn Fn() -> DurationIterator + Send + Sync>,
    exit_if_first_connect_fails: bool,
    on_connected: Option<ConnectHook>,
    on_connect_callback: Arc<dyn Fn() + Send + Sync>,
    on_disconnect_callback: Arc<dyn Fn() + Send + Sync>,
    on_connect_fail_callback: Arc<dyn Fn() + Send + Sync>,
    sleep_provider: SleepProvider,
}

impl ReconnectOptions {
    /// By default, the [ReconnectStream](crate::ReconnectStream) will not try to reconnect if the first connect attempt fails.
    /// By default, the retries iterator doubles the wait between redials, starting at 1 second,
    /// until it eventually perpetually tries to redial every 60 seconds.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::with_sleep_provider(|duration| Box::pin(tokio::time::sleep(duration)))
    }

    /// Same defaults as [ReconnectOptions::new], but waits between redials using `sleep_provider`.
    pub fn with_sleep_provider(
        sleep_provider: impl Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    ) -> Self {
        ReconnectOptions(Box::new(Inner {
            retries_to_attempt_fn: Arc::new(|| Box::new(ExpBackoffStrategy::default().into_iter())),
            exit_if_first_connect_fails: true,
            on_connected: None,
            on_connect_callback: Arc::new(|| {}),
            on_disconnect_callback: Arc::new(|| {}),
            on_connect_fail_callback: Arc::new(|| {}),
            sleep_provider: Arc::new(sleep_provider),
        }))
    }

    /// Represents a function that generates an Iterator
    /// to schedule the wait between reconnection attempts.
    /// This method allows the user to provide any function that returns a value
    /// which is convertible into an iterator, such as an actual iterator or a Vec.
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use self_healing_stream::ReconnectOptions;
    ///
    /// // With the below vector, the stream will redial at most four times,
    /// // waiting 2 seconds after each failed attempt. Once all three waits are used up,
    /// // it will stop attempting.
    /// let options = ReconnectOptions::new().with_retries_generator(|| {
    ///     vec![
    ///         Duration::from_secs(2),
    ///         Duration::from_secs(2),
    ///         Duration::from_secs(2),
    ///     ]
    /// });
    /// ```
    pub fn with_retries_generator<F, I, IN>(mut self, retries_generator: F) -> Self
    where
        F: 'static + Send + Sync + Fn() -> IN,
        I: 'static + Send + Sync + Iterator<Item = Duration>,
        IN: IntoIterator<IntoIter = I, Item = Duration>,
    {
        self.0.retries_to_attempt_fn = Arc::new(move || Box::new(retries_generator().into_iter()));
        self
    }

    /// Exponential backoff without jitter: `min(initial * multiplier^attempt, max)`.
    pub fn with_backoff(self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.with_retries_generator(move || {
            ExpBackoffStrategy::new(initial, multiplier, 0.0).with_max(max)
        })
    }

    /// If this is set to true, if the initial connect method of the [ReconnectStream](crate::ReconnectStream) item fails,
    /// then no further reconnects will be attempted. If false, the initial dial goes through the
    /// same backoff loop as redials, for both `connect_with_options` and `dial_with_options`.
    pub fn with_exit_if_first_connect_fails(mut self, value: bool) -> Self {
        self.0.exit_if_first_connect_fails = value;
        self
    }

    /// Runs `hook` on every new transport, including the first one, before any caller uses it.
    /// A failing hook fails the initial connect; on a redial the error is reported to the
    /// caller that triggered it, while the new transport stays installed.
    ///
    /// ```
    /// use futures::FutureExt;
    /// use self_healing_stream::ReconnectOptions;
    /// use tokio::io::AsyncWriteExt;
    ///
    /// let options = ReconnectOptions::new()
    ///     .with_on_connected(|io| async move { io.write_all(b"0000\n").await }.boxed());
    /// ```
    pub fn with_on_connected<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut dyn Transport) -> BoxFuture<'a, io::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.0.on_connected = Some(Arc::new(hook));
        self
    }

    /// Invoked when the [ReconnectStream](crate::ReconnectStream) establishes a connection
    pub fn with_on_connect_callback(mut self, cb: impl Fn() + 'static + Send + Sync) -> Self {
        self.0.on_connect_callback = Arc::new(cb);
        self
    }

    /// Invoked when the [ReconnectStream](crate::ReconnectStream) loses its active connection
    pub fn with_on_disconnect_callback(mut self, cb: impl Fn() + 'static + Send + Sync) -> Self {
        self.0.on_disconnect_callback = Arc::new(cb);
        self
    }

    /// Invoked when the [ReconnectStream](crate::ReconnectStream) fails a connection attempt
    pub fn with_on_connect_fail_callback(mut self, cb: impl Fn() + 'static + Send + Sync) -> Self {
        self.0.on_connect_fail_callback = Arc::new(cb);
        self
    }
}

impl fmt::Debug for ReconnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectOptions")
            .field("exit_if_first_connect_fails", &self.0.exit_if_first_connect_fails)
            .field("on_connected", &self.0.on_connected.is_some())
            .finish_non_exhaustive()
    }
}
