//! Recording handler used by the session tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::handler::CulHandler;
use crate::listener::Listeners;
use crate::registry::HandlerFactory;
use crate::types::Mode;

/// Shared record of everything the mock handlers did.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
    built: Arc<AtomicUsize>,
}

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

/// Knobs for the mock factory.
#[derive(Clone, Default)]
pub struct Behavior {
    /// Line dispatched to the listeners when the version query is sent.
    pub version_reply: Option<String>,
    /// Fail `open`.
    pub fail_open: bool,
    /// Fail `send` for this command.
    pub fail_send: Option<String>,
    /// Never complete `send` for this command.
    pub stall_send: Option<String>,
}

pub struct MockHandler {
    address: String,
    mode: Mode,
    listeners: Listeners,
    open: AtomicBool,
    journal: Journal,
    behavior: Behavior,
}

impl MockHandler {
    pub fn new(address: &str, mode: Mode, journal: Journal, behavior: Behavior) -> Self {
        Self {
            address: address.to_owned(),
            mode,
            listeners: Listeners::new(),
            open: AtomicBool::new(false),
            journal,
            behavior,
        }
    }

    pub fn factory(journal: &Journal, behavior: Behavior) -> HandlerFactory {
        let journal = journal.clone();
        Arc::new(move |address: &str, mode: &Mode| {
            journal.built.fetch_add(1, Ordering::SeqCst);
            let handler = Self::new(address, mode.clone(), journal.clone(), behavior.clone());
            Ok(Arc::new(handler) as Arc<dyn CulHandler>)
        })
    }
}

impl CulHandler for MockHandler {
    fn open(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.journal.push("open");
            if self.behavior.fail_open {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such device",
                )));
            }
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.open.swap(false, Ordering::SeqCst) {
                self.journal.push("close");
            }
            Ok(())
        })
    }

    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.open.load(Ordering::SeqCst) {
                return Err(Error::NotConnected);
            }
            if self.behavior.fail_send.as_deref() == Some(command) {
                return Err(Error::communication(format!("write of {command} failed")));
            }
            if self.behavior.stall_send.as_deref() == Some(command) {
                std::future::pending::<()>().await;
            }
            // Yield so concurrent acquirers get a chance to interleave.
            tokio::task::yield_now().await;
            self.journal.push(format!("send:{command}"));
            if let (true, Some(reply)) = (
                command == self.version_query(),
                &self.behavior.version_reply,
            ) {
                self.listeners.dispatch_line(reply);
            }
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn mode(&self) -> &Mode {
        &self.mode
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }
}
