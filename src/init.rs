//! Handshake run on every newly built handler.
//!
//! The sequence is: open the transport, register a version probe, send the
//! version query, then send the mode's setup commands in order. The version
//! reply is picked up asynchronously by the probe; the setup commands do not
//! wait for it.

use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::handler::CulHandler;
use crate::listener::{Listener, ListenerId, WeakListeners};
use crate::types::FirmwareVersion;

/// Cell filled with the firmware version once the device answers.
pub type VersionSlot = Arc<OnceLock<FirmwareVersion>>;

/// Transient listener waiting for the version reply.
///
/// Unregisters itself from the handler after the first reply.
struct VersionProbe {
    listeners: WeakListeners,
    id: OnceLock<ListenerId>,
    version: VersionSlot,
}

impl VersionProbe {
    fn finish(&self) {
        if let (Some(listeners), Some(id)) = (self.listeners.upgrade(), self.id.get()) {
            listeners.unregister(*id);
        }
    }
}

impl Listener for VersionProbe {
    fn data_received(&self, line: &str) {
        let Some(version) = FirmwareVersion::from_line(line) else {
            return;
        };
        tracing::info!("using culfw version {}", version);
        let _ = self.version.set(version);
        self.finish();
    }

    fn error(&self, error: &Error) {
        tracing::debug!("transport error before version reply: {}", error);
    }
}

/// Opens `handler` and runs the handshake.
///
/// Any failure is returned as [`Error::Device`] with the cause attached. A
/// handler that opened but failed the handshake is closed again before
/// returning.
pub async fn initialize(handler: &dyn CulHandler) -> Result<VersionSlot> {
    handler.open().await.map_err(|e| {
        Error::device_caused_by(format!("can't open device {}", handler.address()), e)
    })?;

    match handshake(handler).await {
        Ok(version) => Ok(version),
        Err(e) => {
            if let Err(close_err) = handler.close().await {
                tracing::warn!(
                    "failed to close {} after handshake: {}",
                    handler.address(),
                    close_err
                );
            }
            Err(Error::device_caused_by(
                format!("can't initialise RF mode {}", handler.mode()),
                e,
            ))
        }
    }
}

async fn handshake(handler: &dyn CulHandler) -> Result<VersionSlot> {
    let listeners = handler.listeners();
    let version: VersionSlot = Arc::new(OnceLock::new());
    let probe = Arc::new(VersionProbe {
        listeners: listeners.downgrade(),
        id: OnceLock::new(),
        version: Arc::clone(&version),
    });

    let id = listeners.register(Arc::clone(&probe) as Arc<dyn Listener>);
    let _ = probe.id.set(id);

    let result = async {
        handler.send(handler.version_query()).await?;
        send_mode_commands(handler).await
    }
    .await;

    // The reply may have arrived before the probe knew its own id.
    if result.is_err() || version.get().is_some() {
        listeners.unregister(id);
    }

    result.map(|()| version)
}

/// Sends the handler's mode setup commands in declared order.
pub async fn send_mode_commands(handler: &dyn CulHandler) -> Result<()> {
    for command in handler.mode().commands() {
        tracing::debug!("sending mode command {:?} to {}", command, handler.address());
        handler.send(command).await?;
    }
    Ok(())
}
