//! Fixed table of paired peers.
//!
//! Each slot moves through `free -> connected (unidentified) -> identified
//! -> free`. A slot keeps its name, address and type after disconnect so the
//! device database can be persisted and shown as history.

use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::handshake::{self, Inbound};
use crate::models::{ConnHandle, DeviceId, DeviceType, PeerAddress, MAX_DEVICES};
use crate::storage::SettingsStore;

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub conn: Option<ConnHandle>,
    /// Formatted as `XX:XX:XX:XX:XX:XX`.
    pub address: String,
    pub name: String,
    pub device_type: DeviceType,
    pub version: Option<String>,
    pub connected: bool,
    /// Milliseconds since link start.
    pub last_activity_ms: u64,
}

impl DeviceRecord {
    fn empty(device_id: DeviceId) -> Self {
        Self {
            device_id,
            conn: None,
            address: String::new(),
            name: String::new(),
            device_type: DeviceType::None,
            version: None,
            connected: false,
            last_activity_ms: 0,
        }
    }
}

/// What a received payload did to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum DataOutcome {
    /// The peer identified itself; an acknowledgement is due.
    Identified {
        device_id: DeviceId,
        device_type: DeviceType,
    },
    /// Ordinary data; only the activity time changed.
    Activity { device_id: DeviceId },
    /// No connected slot has this handle.
    UnknownConnection,
}

fn type_key(id: DeviceId) -> String {
    format!("dev{}_type", id)
}

fn name_key(id: DeviceId) -> String {
    format!("dev{}_name", id)
}

fn mac_key(id: DeviceId) -> String {
    format!("dev{}_mac", id)
}

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    slots: [DeviceRecord; MAX_DEVICES],
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|i| DeviceRecord::empty(DeviceId::slot(i))),
        }
    }

    /// Allocate the first free slot for a new connection.
    ///
    /// Returns `None` when every slot is taken; the connection is ignored.
    pub fn on_connect(
        &mut self,
        conn: ConnHandle,
        address: PeerAddress,
        now_ms: u64,
    ) -> Option<DeviceId> {
        if let Some(existing) = self.by_conn(conn) {
            debug!(%conn, device_id = %existing.device_id, "Duplicate connect for mapped handle");
            return Some(existing.device_id);
        }

        let Some(slot) = self.slots.iter_mut().find(|s| !s.connected) else {
            warn!(%conn, "Maximum devices reached, ignoring connection");
            return None;
        };

        slot.conn = Some(conn);
        slot.connected = true;
        slot.device_type = DeviceType::None;
        slot.version = None;
        slot.address = address.to_string();
        slot.name = format!("Device-{}", slot.device_id);
        slot.last_activity_ms = now_ms;

        info!(%conn, device_id = %slot.device_id, address = %slot.address, "Device connected");
        Some(slot.device_id)
    }

    /// Release the slot mapped to `conn`, keeping its historical fields.
    pub fn on_disconnect(&mut self, conn: ConnHandle) -> Option<DeviceId> {
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.connected && s.conn == Some(conn))
        else {
            warn!(%conn, "Disconnect for unknown connection");
            return None;
        };

        slot.connected = false;
        slot.conn = None;
        let device_id = slot.device_id;
        info!(%conn, %device_id, remaining = self.connected_count(), "Device disconnected");
        Some(device_id)
    }

    pub fn on_data(&mut self, conn: ConnHandle, payload: &[u8], now_ms: u64) -> DataOutcome {
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.connected && s.conn == Some(conn))
        else {
            warn!(%conn, "Data from unknown connection");
            return DataOutcome::UnknownConnection;
        };

        slot.last_activity_ms = now_ms;

        match handshake::parse(payload) {
            Inbound::Identify(identification) => {
                slot.device_type = identification.device_type;
                if let Some(name) = identification.name {
                    slot.name = name;
                }
                slot.version = identification.version;
                info!(
                    device_id = %slot.device_id,
                    device_type = %slot.device_type,
                    name = %slot.name,
                    "Device identified"
                );
                DataOutcome::Identified {
                    device_id: slot.device_id,
                    device_type: slot.device_type,
                }
            }
            Inbound::Other => {
                debug!(device_id = %slot.device_id, len = payload.len(), "Data received");
                DataOutcome::Activity {
                    device_id: slot.device_id,
                }
            }
        }
    }

    pub fn get(&self, id: DeviceId) -> &DeviceRecord {
        &self.slots[id.index()]
    }

    pub fn by_conn(&self, conn: ConnHandle) -> Option<&DeviceRecord> {
        self.slots
            .iter()
            .find(|s| s.connected && s.conn == Some(conn))
    }

    /// First connected device of the given type.
    pub fn find_by_type(&self, device_type: DeviceType) -> Option<&DeviceRecord> {
        self.slots
            .iter()
            .find(|s| s.connected && s.device_type == device_type)
    }

    pub fn is_any_connected(&self) -> bool {
        self.slots.iter().any(|s| s.connected)
    }

    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|s| s.connected).count()
    }

    /// Connection handles of every connected slot.
    pub fn connected_handles(&self) -> [Option<(DeviceId, ConnHandle)>; MAX_DEVICES] {
        let mut handles = [None; MAX_DEVICES];
        for (target, slot) in handles.iter_mut().zip(&self.slots) {
            if slot.connected {
                *target = slot.conn.map(|conn| (slot.device_id, conn));
            }
        }
        handles
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.slots
    }

    /// Persist type, name and address of every slot.
    pub fn save<S: SettingsStore + ?Sized>(&self, store: &mut S) -> Result<(), StoreError> {
        for slot in &self.slots {
            store.set_u8(&type_key(slot.device_id), slot.device_type.nibble())?;
            store.set_str(&name_key(slot.device_id), &slot.name)?;
            store.set_str(&mac_key(slot.device_id), &slot.address)?;
        }
        store.commit()?;
        info!("Device database saved");
        Ok(())
    }

    /// Load the persisted device database as disconnected history.
    pub fn restore<S: SettingsStore + ?Sized>(&mut self, store: &S) -> Result<(), StoreError> {
        for slot in self.slots.iter_mut().filter(|s| !s.connected) {
            if let Some(raw) = store.get_u8(&type_key(slot.device_id))? {
                slot.device_type = DeviceType::from_nibble(raw).unwrap_or_else(|| {
                    warn!(device_id = %slot.device_id, raw, "Unknown stored device type");
                    DeviceType::None
                });
            }
            if let Some(name) = store.get_str(&name_key(slot.device_id))? {
                slot.name = name;
            }
            if let Some(address) = store.get_str(&mac_key(slot.device_id))? {
                slot.address = address;
            }
        }
        info!("Device database loaded");
        Ok(())
    }
}
