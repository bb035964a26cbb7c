//! Connectivity monitoring
//!
//! A single writer (the monitor) publishes the current reachability and
//! interface type on a watch channel; any number of readers observe it.
//! The polling task holds only the sender and stops once every reader
//! has gone away.

use crate::network_monitor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Kind of link carrying traffic
///
/// Variants are ordered by preference when several are up at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Wifi,
    Cellular,
    Wired,
    #[default]
    Unknown,
}

impl InterfaceType {
    /// Most preferred type among those reported: wifi > cellular > wired > unknown
    pub fn preferred<I: IntoIterator<Item = InterfaceType>>(types: I) -> InterfaceType {
        types.into_iter().min().unwrap_or(InterfaceType::Unknown)
    }

    pub fn label(self) -> &'static str {
        match self {
            InterfaceType::Wifi => "Wi-Fi",
            InterfaceType::Cellular => "Cellular",
            InterfaceType::Wired => "Ethernet",
            InterfaceType::Unknown => "Unknown",
        }
    }

    /// Provider label used when no carrier or SSID could be read
    pub fn fallback_provider(self) -> &'static str {
        match self {
            InterfaceType::Wifi => "Wi-Fi Network",
            InterfaceType::Cellular => "Cellular Network",
            InterfaceType::Wired => "Ethernet",
            InterfaceType::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub connected: bool,
    pub interface: InterfaceType,
}

impl ConnectivityState {
    pub fn online(interface: InterfaceType) -> Self {
        Self {
            connected: true,
            interface,
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }
}

/// Raw reading of the system's network links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub connected: bool,
    /// Every interface type currently up
    pub interfaces: Vec<InterfaceType>,
}

impl LinkSnapshot {
    pub fn state(&self) -> ConnectivityState {
        if !self.connected {
            return ConnectivityState::offline();
        }
        ConnectivityState::online(InterfaceType::preferred(self.interfaces.iter().copied()))
    }
}

/// Something that can read the current link state
pub trait LinkProbe: Send + Sync {
    fn snapshot(&self) -> LinkSnapshot;
}

/// Reads interfaces from sysfs and checks for a default route
pub struct SystemProbe {
    sysfs_root: PathBuf,
    require_default_route: bool,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/net"),
            require_default_route: true,
        }
    }

    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            sysfs_root: root.as_ref().to_path_buf(),
            require_default_route: false,
        }
    }

    fn classify(dir: &Path, name: &str) -> Option<InterfaceType> {
        if name == "lo" {
            return None;
        }

        let operstate = fs::read_to_string(dir.join("operstate")).unwrap_or_default();
        if operstate.trim() != "up" {
            return None;
        }

        if name.starts_with("ww") || name.starts_with("rmnet") {
            return Some(InterfaceType::Cellular);
        }

        // Virtual links (bridges, veth, docker) have no backing device
        if !dir.join("device").exists() {
            return None;
        }

        if dir.join("wireless").exists() || dir.join("phy80211").exists() {
            return Some(InterfaceType::Wifi);
        }

        let link_type = fs::read_to_string(dir.join("type")).unwrap_or_default();
        match link_type.trim() {
            "1" => Some(InterfaceType::Wired),
            _ => Some(InterfaceType::Unknown),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkProbe for SystemProbe {
    fn snapshot(&self) -> LinkSnapshot {
        let entries = match fs::read_dir(&self.sysfs_root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot read {:?}: {}", self.sysfs_root, e);
                return LinkSnapshot::default();
            }
        };

        let mut interfaces = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(kind) = Self::classify(&entry.path(), &name) {
                debug!("Interface {} is up ({:?})", name, kind);
                interfaces.push(kind);
            }
        }

        let mut connected = !interfaces.is_empty();
        if connected && self.require_default_route {
            connected = network_monitor::detect_default_route().is_ok();
        }

        LinkSnapshot {
            connected,
            interfaces,
        }
    }
}

/// Read side of the connectivity state
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    rx: watch::Receiver<ConnectivityState>,
}

impl ConnectivityHandle {
    pub fn current(&self) -> ConnectivityState {
        *self.rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.rx.borrow().connected
    }

    /// Receiver that is notified on every change
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.rx.clone()
    }
}

/// Wait until `rx` reports no connectivity
///
/// Pends forever if the monitor goes away while still connected.
pub async fn wait_for_disconnect(mut rx: watch::Receiver<ConnectivityState>) {
    loop {
        if !rx.borrow_and_update().connected {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Single writer of the connectivity state
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn handle(&self) -> ConnectivityHandle {
        ConnectivityHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish `state`; readers are only woken when it differs
    pub fn publish(&self, state: ConnectivityState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                info!(
                    "Connectivity changed: connected={} interface={}",
                    state.connected,
                    state.interface.label()
                );
                *current = state;
                true
            }
        })
    }

    /// Take a first reading, then keep polling `probe` in the background
    ///
    /// The returned task ends when every handle has been dropped.
    pub async fn spawn_polling(
        probe: Arc<dyn LinkProbe>,
        interval: Duration,
    ) -> (ConnectivityHandle, JoinHandle<()>) {
        let first = read_probe(probe.clone()).await;
        let monitor = ConnectivityMonitor::new(first.state());
        let handle = monitor.handle();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = monitor.tx.closed() => {
                        debug!("All connectivity readers gone, stopping monitor");
                        break;
                    }
                    _ = ticker.tick() => {
                        let snapshot = read_probe(probe.clone()).await;
                        monitor.publish(snapshot.state());
                    }
                }
            }
        });

        (handle, task)
    }
}

async fn read_probe(probe: Arc<dyn LinkProbe>) -> LinkSnapshot {
    tokio::task::spawn_blocking(move || probe.snapshot())
        .await
        .unwrap_or_default()
}
