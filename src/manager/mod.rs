//! # Connection Manager
//!
//! Tracks discovered printers, their connection state, and routes
//! print/disconnect calls to the correct transport (USB vs BLE) with that
//! transport's chunk-size and pacing policy.
//!
//! ## State Machine
//!
//! ```text
//! Discovered ──connect()──► Connecting ──ok──► Connected
//!     ▲                         │                  │
//!     │                       error            disconnect()
//!  (rescan)                     ▼                  ▼
//!     └──────────────────── Disconnected ◄─────────┘
//! ```
//!
//! `Failed` is terminal and reserved for a Connected printer that vanishes
//! from a rescan — its transport identity is gone, so reconnecting is
//! impossible. Ordinary connect/write errors leave the printer
//! Disconnected and retryable.
//!
//! ## Ownership
//!
//! The manager is an explicitly constructed object; callers hold a
//! reference and inject the transports (real USB/BLE or fakes in tests).
//! There is no process-wide singleton.
//!
//! ## Observables
//!
//! The device list and the Bluetooth radio state are exposed as
//! `tokio::sync::watch` channels: latest-value-wins, and every emission is
//! an immutable snapshot clone.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, mpsc, watch};

use crate::chunk;
use crate::error::CandelaError;
use crate::printer::CapabilityProfile;
use crate::transport::{ConnectionType, DiscoveredPrinter, ScanOptions, Transport};

/// Connection lifecycle state of one printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Found by a scan, never connected
    Discovered,
    /// Transport connect in flight
    Connecting,
    /// Ready to accept print data
    Connected,
    /// Previously connected or a failed connect attempt; retryable
    Disconnected,
    /// Vanished from a rescan while connected; identity gone, terminal
    Failed,
}

/// A printer in the registry. Snapshots of this struct are what the device
/// list observable emits; treat them as immutable copies.
#[derive(Debug, Clone, Serialize)]
pub struct Printer {
    /// Transport-stable identity (USB bus address, BLE peripheral id)
    pub address: String,
    /// Advertised or descriptor name, when known
    pub name: Option<String>,
    pub connection_type: ConnectionType,
    pub state: ConnectionState,
    /// Capability profile used for jobs targeting this printer
    #[serde(skip)]
    pub profile: Arc<CapabilityProfile>,
}

/// # Connection Manager
///
/// One instance owns the printer registry, the scan lifecycle and the
/// per-printer write serialization. Cheap to share behind an `Arc`.
pub struct ConnectionManager {
    transports: HashMap<ConnectionType, Arc<dyn Transport>>,
    printers: StdMutex<HashMap<String, Printer>>,
    devices_tx: watch::Sender<Vec<Printer>>,
    radio_tx: watch::Sender<bool>,
    /// Serializes scans; `stop` ends the active one early.
    scan_guard: Mutex<()>,
    scan_stop: Notify,
    /// One writer per printer: print_data is not safe to run concurrently
    /// against the same device.
    write_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    default_profile: Arc<CapabilityProfile>,
}

impl ConnectionManager {
    /// Build a manager over the given transports (at most one per
    /// connection type; later entries win).
    pub fn new(transports: impl IntoIterator<Item = Arc<dyn Transport>>) -> Self {
        let transports: HashMap<_, _> = transports
            .into_iter()
            .map(|t| (t.connection_type(), t))
            .collect();
        let (devices_tx, _) = watch::channel(Vec::new());
        let (radio_tx, _) = watch::channel(false);
        Self {
            transports,
            printers: StdMutex::new(HashMap::new()),
            devices_tx,
            radio_tx,
            scan_guard: Mutex::new(()),
            scan_stop: Notify::new(),
            write_locks: StdMutex::new(HashMap::new()),
            default_profile: CapabilityProfile::by_paper(crate::printer::PaperWidth::Mm80),
        }
    }

    /// Use a different default capability profile for newly discovered
    /// printers.
    pub fn with_default_profile(mut self, profile: Arc<CapabilityProfile>) -> Self {
        self.default_profile = profile;
        self
    }

    /// Subscribe to device list snapshots.
    pub fn printers(&self) -> watch::Receiver<Vec<Printer>> {
        self.devices_tx.subscribe()
    }

    /// Whether a transport is registered for this connection type.
    pub fn has_transport(&self, kind: ConnectionType) -> bool {
        self.transports.contains_key(&kind)
    }

    /// Current snapshot of one printer.
    pub fn printer(&self, address: &str) -> Option<Printer> {
        self.printers.lock().unwrap().get(address).cloned()
    }

    /// Override the capability profile of a known printer.
    pub fn set_printer_profile(&self, address: &str, profile: Arc<CapabilityProfile>) {
        let mut printers = self.printers.lock().unwrap();
        if let Some(printer) = printers.get_mut(address) {
            printer.profile = profile;
        }
        drop(printers);
        self.publish();
    }

    fn transport_for(&self, kind: ConnectionType) -> Result<&Arc<dyn Transport>, CandelaError> {
        self.transports
            .get(&kind)
            .ok_or_else(|| CandelaError::Transport(format!("No {} transport registered", kind)))
    }

    /// Publish the current registry as a sorted snapshot.
    fn publish(&self) {
        let mut snapshot: Vec<Printer> =
            self.printers.lock().unwrap().values().cloned().collect();
        snapshot.sort_by(|a, b| a.address.cmp(&b.address));
        self.devices_tx.send_replace(snapshot);
    }

    fn set_state(&self, address: &str, state: ConnectionState) {
        {
            let mut printers = self.printers.lock().unwrap();
            if let Some(printer) = printers.get_mut(address) {
                printer.state = state;
            }
        }
        self.publish();
    }

    /// Merge a discovery report into the registry. New addresses enter as
    /// Discovered; known ones only refresh their name.
    fn upsert(&self, found: DiscoveredPrinter) {
        {
            let mut printers = self.printers.lock().unwrap();
            match printers.get_mut(&found.address) {
                Some(existing) => {
                    if found.name.is_some() {
                        existing.name = found.name;
                    }
                }
                None => {
                    debug!("Discovered {} printer {}", found.connection_type, found.address);
                    printers.insert(
                        found.address.clone(),
                        Printer {
                            address: found.address,
                            name: found.name,
                            connection_type: found.connection_type,
                            state: ConnectionState::Discovered,
                            profile: self.default_profile.clone(),
                        },
                    );
                }
            }
        }
        self.publish();
    }

    /// Drop printers of the scanned connection types that the rescan did
    /// not see. A Connected printer that vanished is kept but marked
    /// Failed — its transport identity is gone.
    fn prune(&self, seen: &HashSet<String>, scanned: &[ConnectionType]) {
        {
            let mut printers = self.printers.lock().unwrap();
            printers.retain(|address, printer| {
                if !scanned.contains(&printer.connection_type) || seen.contains(address) {
                    return true;
                }
                if printer.state == ConnectionState::Connected {
                    warn!("Connected printer {} vanished from rescan", address);
                    printer.state = ConnectionState::Failed;
                    return true;
                }
                false
            });
        }
        self.publish();
    }

    /// Run a time-bounded discovery scan across the requested connection
    /// types, emitting incremental updates to the device list observable.
    ///
    /// Returns the device list snapshot at scan end. [`Self::stop_scan`]
    /// ends the scan early. Printers of the scanned types that no longer
    /// respond are discarded (or marked Failed when they were Connected).
    pub async fn get_printers(
        &self,
        refresh_duration: Duration,
        connection_types: &[ConnectionType],
        android_uses_fine_location: bool,
    ) -> Result<Vec<Printer>, CandelaError> {
        let _guard = self.scan_guard.lock().await;

        let options = ScanOptions {
            duration: refresh_duration,
            android_uses_fine_location,
        };

        // Refresh the radio observable at scan start
        if let Some(ble) = self.transports.get(&ConnectionType::Ble) {
            self.radio_tx.send_replace(ble.radio_on().await);
        }

        let (tx, mut rx) = mpsc::channel::<DiscoveredPrinter>(16);
        let mut tasks = Vec::new();
        for kind in connection_types {
            let transport = self.transport_for(*kind)?.clone();
            let tx = tx.clone();
            let options = options.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = transport.scan(&options, &tx).await {
                    warn!("{} scan failed: {}", transport.connection_type(), e);
                }
            }));
        }
        drop(tx);

        // Registered once so a stop arriving mid-update is not missed
        let stopped = self.scan_stop.notified();
        tokio::pin!(stopped);

        let mut seen = HashSet::new();
        loop {
            tokio::select! {
                _ = &mut stopped => {
                    debug!("Scan stopped early");
                    break;
                }
                found = rx.recv() => match found {
                    Some(found) => {
                        seen.insert(found.address.clone());
                        self.upsert(found);
                    }
                    None => break, // all transports finished
                },
            }
        }

        // Dropping the receiver tells still-running transports to wind down
        drop(rx);
        for task in tasks {
            task.await.ok();
        }

        self.prune(&seen, connection_types);
        Ok(self.devices_tx.borrow().clone())
    }

    /// End the active scan early. Cancels only discovery — in-flight
    /// prints are unaffected. No-op when no scan is running.
    pub fn stop_scan(&self) {
        self.scan_stop.notify_waiters();
    }

    /// Connect to a printer.
    ///
    /// Returns `Ok(true)` on success (idempotent when already Connected —
    /// no duplicate Connecting transition), `Ok(false)` when the transport
    /// refused the connection; the printer is then left Disconnected and
    /// the caller may retry.
    pub async fn connect(&self, address: &str) -> Result<bool, CandelaError> {
        let printer = self
            .printer(address)
            .ok_or_else(|| CandelaError::Transport(format!("Unknown printer {}", address)))?;

        match printer.state {
            ConnectionState::Connected => return Ok(true),
            ConnectionState::Failed => {
                return Err(CandelaError::Transport(format!(
                    "Printer {} is gone; rescan to rediscover it",
                    address
                )));
            }
            _ => {}
        }

        let transport = self.transport_for(printer.connection_type)?.clone();
        self.set_state(address, ConnectionState::Connecting);

        match transport.connect(address).await {
            Ok(()) => {
                self.set_state(address, ConnectionState::Connected);
                Ok(true)
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", address, e);
                self.set_state(address, ConnectionState::Disconnected);
                Ok(false)
            }
        }
    }

    /// Disconnect a printer. Idempotent: already-disconnected and unknown
    /// printers are a no-op.
    pub async fn disconnect(&self, address: &str) -> Result<(), CandelaError> {
        let Some(printer) = self.printer(address) else {
            return Ok(());
        };
        let transport = self.transport_for(printer.connection_type)?.clone();
        transport.disconnect(address).await?;
        self.set_state(address, ConnectionState::Disconnected);
        Ok(())
    }

    /// Write a command stream to a Connected printer.
    ///
    /// The payload is split by the transmission-chunking rule when
    /// `long_data` is set or it exceeds the chunk size (the transport
    /// default when `chunk_size` is `None`). Chunks are written strictly in
    /// order, awaiting each transport write before issuing the next —
    /// printers process serially and lack flow control beyond one packet.
    ///
    /// Concurrent calls against one printer are serialized on a
    /// per-printer lock.
    ///
    /// ## Errors
    ///
    /// [`CandelaError::NotConnected`] when the printer is not Connected;
    /// no transport write is issued. [`CandelaError::Transport`] when a
    /// chunk write fails; the remaining chunks are not sent.
    pub async fn print_data(
        &self,
        address: &str,
        bytes: &[u8],
        long_data: bool,
        chunk_size: Option<usize>,
    ) -> Result<(), CandelaError> {
        let write_lock = self.write_lock_for(address);
        let _serialized = write_lock.lock().await;

        // State check happens under the write lock so a disconnect racing
        // an earlier job is observed.
        let printer = self
            .printer(address)
            .filter(|p| p.state == ConnectionState::Connected)
            .ok_or_else(|| CandelaError::NotConnected(address.to_string()))?;

        let transport = self.transport_for(printer.connection_type)?.clone();
        let chunk_size = chunk_size.unwrap_or_else(|| transport.default_chunk_size());
        let delay = transport.chunk_delay();

        if !long_data && bytes.len() <= chunk_size {
            return transport.write(address, bytes).await;
        }

        debug!(
            "Writing {} bytes to {} in {} chunk(s)",
            bytes.len(),
            address,
            bytes.len().div_ceil(chunk_size)
        );
        let mut first = true;
        for piece in chunk::split_stream(bytes, chunk_size) {
            if !first && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            first = false;
            transport.write(address, piece).await?;
        }
        Ok(())
    }

    /// Whether the printer's transport can take a whole image as one
    /// raster block (large native receive buffer). Unknown printers report
    /// false.
    pub fn supports_large_single_block(&self, address: &str) -> bool {
        self.printer(address)
            .and_then(|p| self.transports.get(&p.connection_type))
            .map(|t| t.supports_large_single_block())
            .unwrap_or(false)
    }

    /// Whether the Bluetooth radio is currently usable. Also refreshes the
    /// radio observable.
    pub async fn is_ble_turned_on(&self) -> bool {
        let on = match self.transports.get(&ConnectionType::Ble) {
            Some(ble) => ble.radio_on().await,
            None => false,
        };
        self.radio_tx.send_replace(on);
        on
    }

    /// Subscribe to Bluetooth radio state (latest value wins).
    pub fn ble_state(&self) -> watch::Receiver<bool> {
        self.radio_tx.subscribe()
    }

    /// Request the platform Bluetooth radio be enabled. Fire-and-forget:
    /// there is no synchronous confirmation.
    pub fn turn_on_bluetooth(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Some(ble) = manager.transports.get(&ConnectionType::Ble) {
                if let Err(e) = ble.request_radio_on().await {
                    warn!("Radio enable request failed: {}", e);
                }
            }
        });
    }

    fn write_lock_for(&self, address: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Transport fake: scripted scan results, optional connect refusal,
    /// recorded writes.
    struct FakeTransport {
        kind: ConnectionType,
        devices: StdMutex<Vec<DiscoveredPrinter>>,
        refuse_connect: AtomicBool,
        writes: StdMutex<Vec<Vec<u8>>>,
        chunk_size: usize,
    }

    impl FakeTransport {
        fn new(kind: ConnectionType, addresses: &[&str]) -> Arc<Self> {
            let devices = addresses
                .iter()
                .map(|a| DiscoveredPrinter {
                    address: a.to_string(),
                    name: Some(format!("fake {}", a)),
                    connection_type: kind,
                })
                .collect();
            Arc::new(Self {
                kind,
                devices: StdMutex::new(devices),
                refuse_connect: AtomicBool::new(false),
                writes: StdMutex::new(Vec::new()),
                chunk_size: 16,
            })
        }

        fn set_world(&self, addresses: &[&str]) {
            *self.devices.lock().unwrap() = addresses
                .iter()
                .map(|a| DiscoveredPrinter {
                    address: a.to_string(),
                    name: None,
                    connection_type: self.kind,
                })
                .collect();
        }

        fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn connection_type(&self) -> ConnectionType {
            self.kind
        }

        fn default_chunk_size(&self) -> usize {
            self.chunk_size
        }

        async fn scan(
            &self,
            _options: &ScanOptions,
            found: &mpsc::Sender<DiscoveredPrinter>,
        ) -> Result<(), CandelaError> {
            let devices = self.devices.lock().unwrap().clone();
            for device in devices {
                if found.send(device).await.is_err() {
                    break;
                }
            }
            Ok(())
        }

        async fn connect(&self, address: &str) -> Result<(), CandelaError> {
            if self.refuse_connect.load(Ordering::SeqCst) {
                return Err(CandelaError::Transport(format!("{} refused", address)));
            }
            Ok(())
        }

        async fn disconnect(&self, _address: &str) -> Result<(), CandelaError> {
            Ok(())
        }

        async fn write(&self, _address: &str, bytes: &[u8]) -> Result<(), CandelaError> {
            self.writes.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    async fn scanned_manager(fake: Arc<FakeTransport>) -> ConnectionManager {
        let manager = ConnectionManager::new([fake.clone() as Arc<dyn Transport>]);
        manager
            .get_printers(Duration::from_millis(10), &[fake.kind], false)
            .await
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn scan_populates_registry_as_discovered() {
        let fake = FakeTransport::new(ConnectionType::Usb, &["usb:001-002"]);
        let manager = scanned_manager(fake).await;

        let printer = manager.printer("usb:001-002").unwrap();
        assert_eq!(printer.state, ConnectionState::Discovered);
        assert_eq!(printer.connection_type, ConnectionType::Usb);
    }

    #[tokio::test]
    async fn connect_transitions_to_connected() {
        let fake = FakeTransport::new(ConnectionType::Ble, &["aa:bb"]);
        let manager = scanned_manager(fake).await;

        assert!(manager.connect("aa:bb").await.unwrap());
        assert_eq!(
            manager.printer("aa:bb").unwrap().state,
            ConnectionState::Connected
        );
    }

    #[tokio::test]
    async fn connect_is_idempotent_when_connected() {
        let fake = FakeTransport::new(ConnectionType::Ble, &["aa:bb"]);
        let manager = scanned_manager(fake.clone()).await;

        assert!(manager.connect("aa:bb").await.unwrap());
        // Second connect: still true, no Connecting round-trip observable
        let mut rx = manager.printers();
        rx.mark_unchanged();
        assert!(manager.connect("aa:bb").await.unwrap());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn failed_connect_leaves_printer_disconnected() {
        let fake = FakeTransport::new(ConnectionType::Ble, &["aa:bb"]);
        let manager = scanned_manager(fake.clone()).await;

        fake.refuse_connect.store(true, Ordering::SeqCst);
        assert!(!manager.connect("aa:bb").await.unwrap());
        assert_eq!(
            manager.printer("aa:bb").unwrap().state,
            ConnectionState::Disconnected
        );

        // Retryable: a later attempt succeeds
        fake.refuse_connect.store(false, Ordering::SeqCst);
        assert!(manager.connect("aa:bb").await.unwrap());
    }

    #[tokio::test]
    async fn print_data_requires_connected() {
        let fake = FakeTransport::new(ConnectionType::Usb, &["usb:001-002"]);
        let manager = scanned_manager(fake.clone()).await;

        let err = manager
            .print_data("usb:001-002", b"data", false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CandelaError::NotConnected(_)));
        // No transport write was issued
        assert!(fake.writes().is_empty());
    }

    #[tokio::test]
    async fn print_data_chunks_in_order() {
        let fake = FakeTransport::new(ConnectionType::Usb, &["usb:001-002"]);
        let manager = scanned_manager(fake.clone()).await;
        manager.connect("usb:001-002").await.unwrap();

        let payload: Vec<u8> = (0..40).collect();
        manager
            .print_data("usb:001-002", &payload, true, Some(16))
            .await
            .unwrap();

        let writes = fake.writes();
        assert_eq!(writes.len(), 3); // ceil(40/16)
        assert!(writes.iter().all(|w| w.len() <= 16));
        assert_eq!(writes.concat(), payload);
    }

    #[tokio::test]
    async fn small_payload_is_a_single_write() {
        let fake = FakeTransport::new(ConnectionType::Usb, &["usb:001-002"]);
        let manager = scanned_manager(fake.clone()).await;
        manager.connect("usb:001-002").await.unwrap();

        manager
            .print_data("usb:001-002", b"short", false, None)
            .await
            .unwrap();
        assert_eq!(fake.writes().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let fake = FakeTransport::new(ConnectionType::Ble, &["aa:bb"]);
        let manager = scanned_manager(fake).await;

        manager.connect("aa:bb").await.unwrap();
        manager.disconnect("aa:bb").await.unwrap();
        manager.disconnect("aa:bb").await.unwrap();
        manager.disconnect("not-a-printer").await.unwrap();
        assert_eq!(
            manager.printer("aa:bb").unwrap().state,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn rescan_discards_vanished_printers() {
        let fake = FakeTransport::new(ConnectionType::Ble, &["aa:bb", "cc:dd"]);
        let manager = ConnectionManager::new([fake.clone() as Arc<dyn Transport>]);
        manager
            .get_printers(Duration::from_millis(10), &[ConnectionType::Ble], false)
            .await
            .unwrap();
        manager.connect("aa:bb").await.unwrap();

        // Both devices disappear. The connected one is kept but marked
        // Failed (identity gone); the merely-discovered one is dropped.
        fake.set_world(&[]);
        let printers = manager
            .get_printers(Duration::from_millis(10), &[ConnectionType::Ble], false)
            .await
            .unwrap();

        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].address, "aa:bb");
        assert_eq!(printers[0].state, ConnectionState::Failed);
        assert!(manager.printer("cc:dd").is_none());

        // A Failed printer cannot be reconnected
        assert!(manager.connect("aa:bb").await.is_err());
    }

    #[tokio::test]
    async fn device_list_observable_emits_snapshots() {
        let fake = FakeTransport::new(ConnectionType::Usb, &["usb:001-002"]);
        let manager = ConnectionManager::new([fake as Arc<dyn Transport>]);
        let mut rx = manager.printers();
        assert!(rx.borrow().is_empty());

        manager
            .get_printers(Duration::from_millis(10), &[ConnectionType::Usb], false)
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn print_data_on_unknown_printer_is_not_connected() {
        let fake = FakeTransport::new(ConnectionType::Usb, &[]);
        let manager = ConnectionManager::new([fake as Arc<dyn Transport>]);
        let err = manager
            .print_data("nowhere", b"x", false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CandelaError::NotConnected(_)));
    }
}
