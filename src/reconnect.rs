//! Fixed-interval reconnection.
//!
//! When a transport drops, the owner of the handler waits a fixed interval and
//! reopens it, repeating until it succeeds. By default there is no limit on
//! the number of attempts; a persistent outage keeps retrying forever unless
//! [`ReconnectPolicy::max_attempts`] is set.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::handler::CulHandler;
use crate::init;
use crate::listener::{Listener, ListenerId};

/// Default wait before each reconnection attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// How reconnection is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before every attempt, including the first.
    pub interval: Duration,
    /// Give up after this many failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Creates the default policy: every 5 seconds, forever.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interval.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Limits the number of attempts.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// Runs `attempt` after every interval until it succeeds.
///
/// Returns the number of attempts made.
pub async fn reconnect<F, Fut>(policy: &ReconnectPolicy, mut attempt: F) -> Result<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempts = 0u32;
    loop {
        tokio::time::sleep(policy.interval).await;
        attempts = attempts.saturating_add(1);

        match attempt().await {
            Ok(()) => return Ok(attempts),
            Err(e) => {
                tracing::warn!("reconnection attempt {} failed: {}", attempts, e);
                if policy.max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(Error::ReconnectExhausted { attempts });
                }
            }
        }
    }
}

/// Closes and reopens `handler`, then replays its mode commands.
pub async fn reopen(handler: &dyn CulHandler) -> Result<()> {
    handler.close().await?;
    handler.open().await?;
    init::send_mode_commands(handler).await
}

struct ErrorSignal {
    notify: Arc<Notify>,
}

impl Listener for ErrorSignal {
    fn data_received(&self, _line: &str) {}

    fn error(&self, _error: &Error) {
        self.notify.notify_one();
    }
}

/// Keeps a handler connected.
///
/// Registers a listener on the handler; every transport error it sees
/// triggers [`reconnect`] with [`reopen`]. While the supervisor runs the
/// handler has a listener and cannot be released, so shut it down first.
pub struct Supervisor {
    handler: Arc<dyn CulHandler>,
    listener: Option<ListenerId>,
    task: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Starts supervising `handler`.
    #[must_use]
    pub fn spawn(handler: Arc<dyn CulHandler>, policy: ReconnectPolicy) -> Self {
        let notify = Arc::new(Notify::new());
        let listener = handler.listeners().register(Arc::new(ErrorSignal {
            notify: Arc::clone(&notify),
        }));

        let supervised = Arc::clone(&handler);
        let task = tokio::spawn(async move {
            let handler: &dyn CulHandler = supervised.as_ref();
            loop {
                notify.notified().await;
                tracing::info!("connection to {} lost, reconnecting", handler.address());

                match reconnect(&policy, move || reopen(handler)).await {
                    Ok(attempts) => {
                        tracing::info!(
                            "reconnected to {} after {} attempts",
                            handler.address(),
                            attempts
                        );
                    }
                    Err(e) => {
                        tracing::error!("giving up on {}: {}", handler.address(), e);
                        return;
                    }
                }
            }
        });

        Self {
            handler,
            listener: Some(listener),
            task: Some(task),
        }
    }

    /// Returns true once the supervisor has given up or was shut down.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stops supervising and unregisters the listener.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(id) = self.listener.take() {
            self.handler.listeners().unregister(id);
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
