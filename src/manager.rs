//! Session manager: the only way to obtain a [`CulHandler`].
//!
//! The manager keeps one handler per device name. Asking twice for the same
//! device in the same mode yields the same handler; asking for it in another
//! mode fails until it has been released. The table lock is held over the
//! whole acquire-or-create sequence, including open and handshake, so
//! concurrent callers never build two handlers for one device.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::handler::CulHandler;
use crate::init::{self, VersionSlot};
use crate::registry::HandlerRegistry;
use crate::types::{DeviceName, FirmwareVersion, Mode};

/// Default bound on the reset command sent during release.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(2);

struct OpenDevice {
    handler: Arc<dyn CulHandler>,
    version: VersionSlot,
}

/// Registry of open devices.
pub struct CulManager {
    factories: Arc<HandlerRegistry>,
    devices: Mutex<HashMap<String, OpenDevice>>,
    reset_timeout: Duration,
}

impl CulManager {
    /// Creates a manager building handlers from `factories`.
    #[must_use]
    pub fn new(factories: Arc<HandlerRegistry>) -> Self {
        Self {
            factories,
            devices: Mutex::new(HashMap::new()),
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }

    /// Sets how long release waits for the reset command before closing anyway.
    #[must_use]
    pub const fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Creates a manager with the built-in `serial` and `network` handlers.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(HandlerRegistry::with_defaults()))
    }

    /// The factory registry, for registering additional device types.
    #[must_use]
    pub fn factories(&self) -> &HandlerRegistry {
        &self.factories
    }

    /// Returns an initialized handler for `device_name` in `mode`.
    ///
    /// If the device is already open in the same mode the existing handler is
    /// returned and no handshake is performed. Callers track their own
    /// references; every caller should [`release`](Self::release) once its
    /// listeners are gone.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDeviceName`] if the name has no `type:` prefix
    /// - [`Error::DeviceConflict`] if the device is open in another mode
    /// - [`Error::UnknownDeviceType`] if no factory handles the type
    /// - [`Error::Device`] if building, opening or the handshake fails
    pub async fn acquire(&self, device_name: &str, mode: &Mode) -> Result<Arc<dyn CulHandler>> {
        let name = DeviceName::parse(device_name)?;
        tracing::debug!("trying to open device {} in mode {}", name, mode);

        let mut devices = self.devices.lock().await;

        if let Some(open) = devices.get(name.as_str()) {
            let current = open.handler.mode();
            if current == mode {
                tracing::debug!("reusing open handler for {}", name);
                return Ok(Arc::clone(&open.handler));
            }
            return Err(Error::DeviceConflict {
                device: name.to_string(),
                mode: current.to_string(),
            });
        }

        let factory = self.factories.lookup(name.device_type()).ok_or_else(|| {
            Error::UnknownDeviceType {
                device_type: name.device_type().to_owned(),
            }
        })?;

        let handler = factory(name.address(), mode).map_err(|e| {
            Error::device_caused_by(format!("can't build handler for {name}"), e)
        })?;

        let version = init::initialize(handler.as_ref()).await?;

        tracing::info!("opened device {} in mode {}", name, mode);
        devices.insert(
            name.as_str().to_owned(),
            OpenDevice {
                handler: Arc::clone(&handler),
                version,
            },
        );

        Ok(handler)
    }

    /// Returns `handler` to the manager.
    ///
    /// The handler is only closed if no listener is registered on it. In
    /// that case it is removed from the table, the reset command is sent on a
    /// best-effort basis, bounded by the reset timeout, and the transport is
    /// closed. Returns true if the
    /// handler was closed by this call.
    ///
    /// The handshake's version probe is a listener too, so a device that has
    /// not answered the version query yet cannot be released.
    pub async fn release(&self, handler: &Arc<dyn CulHandler>) -> bool {
        let mut devices = self.devices.lock().await;

        let Some(name) = devices
            .iter()
            .find(|(_, open)| Arc::ptr_eq(&open.handler, handler))
            .map(|(name, _)| name.clone())
        else {
            tracing::debug!("handler for {} is not open", handler.address());
            return false;
        };

        if handler.has_listeners() {
            tracing::warn!("can't close device {} because it still has listeners", name);
            return false;
        }

        devices.remove(&name);

        let reset = handler.reset_command();
        let timeout = self.reset_timeout;
        let sent = tokio::time::timeout(timeout, handler.send(reset))
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            });
        if let Err(e) = sent {
            tracing::warn!("couldn't reset rf mode of {} to {}: {}", name, reset, e);
        }

        if let Err(e) = handler.close().await {
            tracing::warn!("error while closing {}: {}", name, e);
        }

        tracing::info!("closed device {}", name);
        true
    }

    /// Firmware version reported by an open device, once it has answered.
    pub async fn firmware_version(&self, device_name: &str) -> Option<FirmwareVersion> {
        self.devices
            .lock()
            .await
            .get(device_name)
            .and_then(|open| open.version.get().cloned())
    }

    /// Returns true if `device_name` has an open handler.
    pub async fn is_open(&self, device_name: &str) -> bool {
        self.devices.lock().await.contains_key(device_name)
    }

    /// Names of all open devices, sorted.
    pub async fn open_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CulManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::mock::{Behavior, Journal, MockHandler};
    use crate::listener::{Listener, Listeners};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn manager(behavior: Behavior) -> (CulManager, Journal) {
        init_tracing();
        let journal = Journal::default();
        let registry = HandlerRegistry::new();
        registry.register("serial", MockHandler::factory(&journal, behavior));
        (CulManager::new(Arc::new(registry)), journal)
    }

    fn mode_a() -> Mode {
        Mode::new("a", ["Ar", "Zr"])
    }

    fn mode_b() -> Mode {
        Mode::new("b", ["X21"])
    }

    struct Noop;

    impl Listener for Noop {
        fn data_received(&self, _line: &str) {}
        fn error(&self, _error: &Error) {}
    }

    fn attach(listeners: &Listeners) -> crate::listener::ListenerId {
        listeners.register(Arc::new(Noop))
    }

    #[tokio::test]
    async fn test_acquire_release_scenario() {
        let (manager, journal) = manager(Behavior {
            version_reply: Some("V 1.67 CUL868".into()),
            ..Behavior::default()
        });

        let handler = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();
        assert_eq!(handler.address(), "/dev/ttyX");
        assert_eq!(journal.count("open"), 1);
        assert_eq!(journal.entries(), ["open", "send:V", "send:Ar", "send:Zr"]);
        assert!(manager.is_open("serial:/dev/ttyX").await);
        assert_eq!(
            manager
                .firmware_version("serial:/dev/ttyX")
                .await
                .unwrap()
                .as_str(),
            "1.67 CUL868"
        );

        let conflict = manager.acquire("serial:/dev/ttyX", &mode_b()).await;
        assert!(matches!(conflict, Err(Error::DeviceConflict { .. })));

        let id = attach(handler.listeners());
        handler.listeners().unregister(id);

        assert!(manager.release(&handler).await);
        assert!(!manager.is_open("serial:/dev/ttyX").await);
        assert_eq!(
            journal.entries(),
            ["open", "send:V", "send:Ar", "send:Zr", "send:X00", "close"]
        );
    }

    #[tokio::test]
    async fn test_conflicting_mode() {
        let (manager, journal) = manager(Behavior::default());
        let _handler = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();

        let err = manager
            .acquire("serial:/dev/ttyX", &mode_b())
            .await
            .unwrap_err();
        match err {
            Error::DeviceConflict { device, mode } => {
                assert_eq!(device, "serial:/dev/ttyX");
                assert_eq!(mode, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(journal.built(), 1);
    }

    #[tokio::test]
    async fn test_reacquire_same_mode_reuses_handler() {
        let (manager, journal) = manager(Behavior::default());
        let first = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();
        let second = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(journal.built(), 1);
        assert_eq!(journal.count("send:V"), 1);
    }

    #[tokio::test]
    async fn test_release_with_listeners_is_noop() {
        let (manager, journal) = manager(Behavior::default());
        let handler = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();
        // Without a version reply the probe is still registered.
        assert!(handler.has_listeners());
        handler.listeners().dispatch_line("V 1.67");

        let id = attach(handler.listeners());
        assert!(!manager.release(&handler).await);
        assert!(handler.is_open());
        assert!(manager.is_open("serial:/dev/ttyX").await);
        assert_eq!(journal.count("send:X00"), 0);

        handler.listeners().unregister(id);
        assert!(manager.release(&handler).await);
    }

    #[tokio::test]
    async fn test_repeated_release_closes_once() {
        let (manager, journal) = manager(Behavior {
            version_reply: Some("V 1.67".into()),
            ..Behavior::default()
        });
        let handler = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();

        assert!(manager.release(&handler).await);
        assert!(!manager.release(&handler).await);
        assert!(!manager.release(&handler).await);

        assert_eq!(journal.count("send:X00"), 1);
        assert_eq!(journal.count("close"), 1);
    }

    #[tokio::test]
    async fn test_reset_failure_still_closes() {
        let (manager, journal) = manager(Behavior {
            version_reply: Some("V 1.67".into()),
            fail_send: Some("X00".into()),
            ..Behavior::default()
        });
        let handler = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();

        assert!(manager.release(&handler).await);
        assert_eq!(journal.count("close"), 1);
        assert!(!handler.is_open());
        assert!(manager.open_devices().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_reset_does_not_block_release() {
        let (manager, journal) = manager(Behavior {
            version_reply: Some("V 1.67".into()),
            stall_send: Some("X00".into()),
            ..Behavior::default()
        });
        let manager = manager.reset_timeout(Duration::from_secs(1));
        let handler = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();

        let start = tokio::time::Instant::now();
        assert!(manager.release(&handler).await);
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        assert_eq!(journal.count("send:X00"), 0);
        assert_eq!(journal.count("close"), 1);
        assert!(manager.open_devices().await.is_empty());

        let handler = manager.acquire("serial:/dev/ttyX", &mode_b()).await.unwrap();
        assert_eq!(handler.mode(), &mode_b());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_release_races_acquire_in_other_mode() {
        for _ in 0..20 {
            let (manager, journal) = manager(Behavior {
                version_reply: Some("V 1.67".into()),
                ..Behavior::default()
            });
            let manager = Arc::new(manager);
            let handler = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();

            let release = {
                let manager = Arc::clone(&manager);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { manager.release(&handler).await })
            };
            let acquire = {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.acquire("serial:/dev/ttyX", &mode_b()).await })
            };

            assert!(release.await.unwrap());
            match acquire.await.unwrap() {
                Err(Error::DeviceConflict { .. }) => {
                    assert_eq!(journal.built(), 1);
                }
                Ok(fresh) => {
                    assert!(!Arc::ptr_eq(&fresh, &handler));
                    assert_eq!(fresh.mode(), &mode_b());
                    assert_eq!(journal.built(), 2);

                    let entries = journal.entries();
                    let position = |entry: &str| entries.iter().position(|e| e == entry).unwrap();
                    let second_open = entries.iter().rposition(|e| e == "open").unwrap();
                    assert!(position("send:X00") < second_open);
                    assert!(position("close") < second_open);
                    assert!(manager.is_open("serial:/dev/ttyX").await);
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
            assert_eq!(journal.count("close"), 1);
        }
    }

    #[tokio::test]
    async fn test_release_then_acquire_other_mode() {
        let (manager, journal) = manager(Behavior {
            version_reply: Some("V 1.67".into()),
            ..Behavior::default()
        });
        let handler = manager.acquire("serial:/dev/ttyX", &mode_a()).await.unwrap();
        assert!(manager.release(&handler).await);

        let handler = manager.acquire("serial:/dev/ttyX", &mode_b()).await.unwrap();
        assert_eq!(handler.mode(), &mode_b());
        assert_eq!(journal.built(), 2);
    }

    #[tokio::test]
    async fn test_unknown_device_type() {
        let (manager, journal) = manager(Behavior::default());
        let err = manager.acquire("foo:ttyUSB0", &mode_a()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownDeviceType { ref device_type } if device_type == "foo"));
        assert!(journal.entries().is_empty());
        assert_eq!(journal.built(), 0);
        assert!(manager.open_devices().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_device_name() {
        let (manager, journal) = manager(Behavior::default());
        let err = manager.acquire("ttyUSB0", &mode_a()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDeviceName { .. }));
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_failed_handshake_is_not_registered() {
        let (manager, journal) = manager(Behavior {
            fail_send: Some("Zr".into()),
            ..Behavior::default()
        });
        let err = manager
            .acquire("serial:/dev/ttyX", &mode_a())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Device { .. }));
        assert!(!manager.is_open("serial:/dev/ttyX").await);
        assert_eq!(journal.count("close"), 1);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_registered() {
        let (manager, _journal) = manager(Behavior {
            fail_open: true,
            ..Behavior::default()
        });
        let err = manager
            .acquire("serial:/dev/ttyX", &mode_a())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Device { .. }));
        assert!(manager.open_devices().await.is_empty());
    }

    #[tokio::test]
    async fn test_factory_error_is_device_error() {
        init_tracing();
        let registry = HandlerRegistry::new();
        registry.register(
            "broken",
            Arc::new(|_: &str, _: &Mode| -> Result<Arc<dyn CulHandler>> {
                Err(Error::device("bad arguments"))
            }),
        );
        let manager = CulManager::new(Arc::new(registry));

        let err = manager.acquire("broken:x", &mode_a()).await.unwrap_err();
        assert!(matches!(err, Error::Device { source: Some(_), .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_builds_once() {
        let (manager, journal) = manager(Behavior::default());
        let manager = Arc::new(manager);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.acquire("serial:/dev/ttyX", &mode_a()).await })
            })
            .collect();

        let mut handlers = Vec::new();
        for task in tasks {
            handlers.push(task.await.unwrap().unwrap());
        }

        assert_eq!(journal.built(), 1);
        assert_eq!(journal.count("open"), 1);
        assert!(handlers.iter().all(|h| Arc::ptr_eq(h, &handlers[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_conflicting_modes() {
        let (manager, journal) = manager(Behavior::default());
        let manager = Arc::new(manager);

        let a = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.acquire("serial:/dev/ttyX", &mode_a()).await })
        };
        let b = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.acquire("serial:/dev/ttyX", &mode_b()).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(Error::DeviceConflict { .. })))
            .count();
        assert_eq!((ok, conflicts), (1, 1));
        assert_eq!(journal.built(), 1);
    }

    #[tokio::test]
    async fn test_devices_are_independent() {
        let (manager, journal) = manager(Behavior::default());
        let a = manager.acquire("serial:/dev/ttyA", &mode_a()).await.unwrap();
        let b = manager.acquire("serial:/dev/ttyB", &mode_b()).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(journal.built(), 2);
        assert_eq!(
            manager.open_devices().await,
            ["serial:/dev/ttyA", "serial:/dev/ttyB"]
        );
    }
}
