//! Glue between the radio stack, the device registry and the sender.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::ble::{LinkEvent, PeerTransport};
use crate::error::{RoutingError, StoreError};
use crate::models::{ConnHandle, DeviceId, PeerAddress, MAX_DEVICES};
use crate::protocol;
use crate::registry::{DataOutcome, DeviceRecord, DeviceRegistry};
use crate::sender::PeerLink;
use crate::storage::SettingsStore;

/// Registry plus the transport and settings store it talks to.
///
/// Transport events arrive on the radio task while sends come from the
/// application task; the registry lock is never held across a notify.
pub struct DeviceLink<T, S> {
    registry: Mutex<DeviceRegistry>,
    transport: T,
    store: Mutex<S>,
    started: Instant,
}

impl<T: PeerTransport, S: SettingsStore> DeviceLink<T, S> {
    pub fn new(transport: T, store: S) -> Self {
        Self {
            registry: Mutex::new(DeviceRegistry::new()),
            transport,
            store: Mutex::new(store),
            started: Instant::now(),
        }
    }

    fn registry(&self) -> MutexGuard<'_, DeviceRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Load the persisted device database as disconnected history.
    pub fn restore(&self) -> Result<(), StoreError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        self.registry().restore(&*store)
    }

    pub fn handle(&self, event: LinkEvent) {
        match event {
            LinkEvent::Connected { conn, address } => {
                self.on_connect(conn, address);
            }
            LinkEvent::Disconnected { conn } => {
                self.on_disconnect(conn);
            }
            LinkEvent::Data { conn, payload } => {
                self.on_data(conn, &payload);
            }
        }
    }

    pub fn on_connect(&self, conn: ConnHandle, address: PeerAddress) -> Option<DeviceId> {
        let now = self.now_ms();
        self.registry().on_connect(conn, address, now)
    }

    pub fn on_disconnect(&self, conn: ConnHandle) -> Option<DeviceId> {
        self.registry().on_disconnect(conn)
    }

    /// Record inbound data. An identification is acknowledged on the same
    /// connection and the device database is persisted.
    pub fn on_data(&self, conn: ConnHandle, payload: &[u8]) -> DataOutcome {
        let now = self.now_ms();
        let outcome = self.registry().on_data(conn, payload, now);

        if let DataOutcome::Identified {
            device_id,
            device_type,
        } = outcome
        {
            match protocol::encode_identify_ack(device_id, device_type) {
                Ok(ack) => {
                    if let Err(e) = self.transport.notify(conn, &ack) {
                        warn!(%device_id, error = %e, "Failed to send identify ack");
                    }
                }
                Err(e) => error!(%device_id, error = %e, "Failed to encode identify ack"),
            }
            if let Err(e) = self.persist() {
                warn!(error = %e, "Failed to save device database");
            }
        }

        outcome
    }

    fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.registry().clone();
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot.save(&mut *store)
    }

    pub fn device(&self, id: DeviceId) -> DeviceRecord {
        self.registry().get(id).clone()
    }

    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.registry().records().to_vec()
    }

    pub fn connected_count(&self) -> usize {
        self.registry().connected_count()
    }

    /// Run `f` with the settings store locked.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *store)
    }
}

impl<T: PeerTransport, S: SettingsStore> PeerLink for DeviceLink<T, S> {
    fn send_to(&self, device_id: DeviceId, payload: &[u8]) -> Result<(), RoutingError> {
        let conn = {
            let registry = self.registry();
            let record = registry.get(device_id);
            match (record.connected, record.conn) {
                (true, Some(conn)) => conn,
                _ => {
                    warn!(%device_id, "Device not connected");
                    return Err(RoutingError::TargetNotFound(device_id.get()));
                }
            }
        };

        self.transport.notify(conn, payload)?;
        Ok(())
    }

    fn broadcast(&self, payload: &[u8]) -> Result<usize, RoutingError> {
        let targets: [Option<(DeviceId, ConnHandle)>; MAX_DEVICES] =
            self.registry().connected_handles();

        let mut delivered = 0;
        let mut attempted = 0;
        let mut last_error = None;
        for (device_id, conn) in targets.into_iter().flatten() {
            attempted += 1;
            match self.transport.notify(conn, payload) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(%device_id, error = %e, "Broadcast to device failed");
                    last_error = Some(e);
                }
            }
        }

        if attempted == 0 {
            return Err(RoutingError::NoPeers);
        }
        match (delivered, last_error) {
            (0, Some(e)) => Err(e.into()),
            _ => {
                info!(delivered, attempted, "Broadcast complete");
                Ok(delivered)
            }
        }
    }

    fn is_any_connected(&self) -> bool {
        self.registry().is_any_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble_mock::MockTransport;
    use crate::error::TransportError;
    use crate::models::DeviceType;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    const IDENTIFY_BLITZ: &[u8] = br#"{"command":"identify","device_type":"blitz","device_name":"Blitz-01"}"#;

    fn link() -> DeviceLink<Arc<MockTransport>, MemoryStore> {
        DeviceLink::new(Arc::new(MockTransport::new()), MemoryStore::new())
    }

    fn addr(last: u8) -> PeerAddress {
        PeerAddress([0xC0, 0xFF, 0xEE, 0x00, 0x00, last])
    }

    fn id(raw: u8) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    #[test]
    fn test_identify_acks_and_persists() {
        let link = link();
        link.handle(LinkEvent::Connected {
            conn: ConnHandle(5),
            address: addr(1),
        });
        link.handle(LinkEvent::Data {
            conn: ConnHandle(5),
            payload: IDENTIFY_BLITZ.to_vec(),
        });

        assert_eq!(
            link.transport().sent_to(ConnHandle(5)),
            vec![r#"{"status":"identified","assigned_id":0,"message":"Device registered as BLITZ"}"#.to_string()]
        );
        assert_eq!(link.device(id(0)).device_type, DeviceType::Blitz);

        link.with_store(|store| {
            assert_eq!(store.get_u8("dev0_type").unwrap(), Some(1));
            assert_eq!(store.get_str("dev0_name").unwrap().as_deref(), Some("Blitz-01"));
            assert_eq!(store.get_str("dev0_mac").unwrap().as_deref(), Some("C0:FF:EE:00:00:01"));
            assert_eq!(store.commits(), 1);
        });
    }

    #[test]
    fn test_plain_data_is_not_acknowledged() {
        let link = link();
        link.on_connect(ConnHandle(5), addr(1));
        let outcome = link.on_data(ConnHandle(5), b"{\"cmd\":\"ping\"}");
        assert_eq!(outcome, DataOutcome::Activity { device_id: id(0) });
        assert!(link.transport().sent().is_empty());
        link.with_store(|store| assert_eq!(store.commits(), 0));
    }

    #[test]
    fn test_send_to_connected_and_free_slot() {
        let link = link();
        link.on_connect(ConnHandle(5), addr(1));

        link.send_to(id(0), b"hello").unwrap();
        assert_eq!(link.transport().sent_to(ConnHandle(5)), vec!["hello".to_string()]);

        assert!(matches!(
            link.send_to(id(1), b"hello"),
            Err(RoutingError::TargetNotFound(1))
        ));

        link.on_disconnect(ConnHandle(5));
        assert!(matches!(
            link.send_to(id(0), b"again"),
            Err(RoutingError::TargetNotFound(0))
        ));
    }

    #[test]
    fn test_send_transport_failure_propagates() {
        let link = link();
        link.on_connect(ConnHandle(5), addr(1));
        link.transport().fail_connection(ConnHandle(5));
        assert!(matches!(
            link.send_to(id(0), b"x"),
            Err(RoutingError::Transport(TransportError::Disconnected(5)))
        ));
    }

    #[test]
    fn test_broadcast() {
        let link = link();
        assert!(matches!(link.broadcast(b"x"), Err(RoutingError::NoPeers)));
        assert!(link.transport().sent().is_empty());

        link.on_connect(ConnHandle(1), addr(1));
        link.on_connect(ConnHandle(2), addr(2));
        assert_eq!(link.broadcast(b"all").unwrap(), 2);
        assert_eq!(link.transport().sent().len(), 2);
    }

    #[test]
    fn test_broadcast_partial_and_total_failure() {
        let link = link();
        link.on_connect(ConnHandle(1), addr(1));
        link.on_connect(ConnHandle(2), addr(2));

        link.transport().fail_connection(ConnHandle(1));
        assert_eq!(link.broadcast(b"x").unwrap(), 1);

        link.transport().fail_connection(ConnHandle(2));
        assert!(matches!(
            link.broadcast(b"x"),
            Err(RoutingError::Transport(_))
        ));
    }

    #[test]
    fn test_fourth_connection_is_ignored() {
        let link = link();
        for i in 0..3 {
            assert!(link.on_connect(ConnHandle(i), addr(i as u8)).is_some());
        }
        assert_eq!(link.on_connect(ConnHandle(9), addr(9)), None);
        assert_eq!(link.connected_count(), 3);

        // Data from the unmapped connection is dropped
        assert_eq!(
            link.on_data(ConnHandle(9), IDENTIFY_BLITZ),
            DataOutcome::UnknownConnection
        );
        assert!(link.transport().sent().is_empty());
    }

    #[test]
    fn test_restore_history() {
        let mut store = MemoryStore::new();
        store.set_u8("dev1_type", DeviceType::Pc.nibble()).unwrap();
        store.set_str("dev1_name", "Ufficio").unwrap();

        let link = DeviceLink::new(Arc::new(MockTransport::new()), store);
        link.restore().unwrap();

        let record = link.device(id(1));
        assert_eq!(record.device_type, DeviceType::Pc);
        assert_eq!(record.name, "Ufficio");
        assert!(!record.connected);
        assert!(!link.is_any_connected());
    }
}
