//! Mode-to-peer routing table.
//!
//! Each operating mode has one entry naming the peer that receives its
//! measurements. Entries persist as a single byte, device type in the low
//! nibble and device id in the high nibble, plus a separate broadcast flag
//! under the route key with a `_bc` suffix.

use tracing::{info, warn};

use crate::error::{RoutingError, StoreError};
use crate::models::{DeviceId, DeviceType, MeasureMode, SawMode};
use crate::storage::SettingsStore;

/// Settings key of the saw operating mode byte.
pub const SAW_MODE_KEY: &str = "blitz_mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    pub target_type: DeviceType,
    pub target_id: DeviceId,
    pub broadcast: bool,
}

impl RoutingEntry {
    pub fn unicast(target_type: DeviceType, target_id: DeviceId) -> Self {
        Self {
            target_type,
            target_id,
            broadcast: false,
        }
    }

    /// Target byte: type in the low nibble, id in the high nibble.
    ///
    /// The broadcast flag is not part of the byte.
    pub fn pack(self) -> u8 {
        (self.target_id.get() << 4) | (self.target_type.nibble() & 0x0F)
    }

    /// Decode a target byte into a unicast entry. `None` when either nibble
    /// is out of range.
    pub fn unpack(byte: u8) -> Option<Self> {
        let target_type = DeviceType::from_nibble(byte & 0x0F)?;
        let target_id = DeviceId::new(byte >> 4)?;
        Some(Self::unicast(target_type, target_id))
    }
}

/// Persisted form of the table.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct PackedRouting {
    pub routes: Vec<u8>,
    pub broadcast: Vec<bool>,
    pub saw_mode: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    entries: [RoutingEntry; MeasureMode::COUNT],
    saw_mode: SawMode,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::defaults()
    }
}

impl RoutingTable {
    /// Factory routing: vetri goes to the smartphone, everything else to the saw.
    pub fn defaults() -> Self {
        let first = DeviceId::slot(0);
        let entries = MeasureMode::ALL.map(|mode| match mode {
            MeasureMode::Vetri => RoutingEntry::unicast(DeviceType::Smartphone, first),
            MeasureMode::Fermavetro
            | MeasureMode::Astine
            | MeasureMode::Calibro
            | MeasureMode::RilieviSpeciali => RoutingEntry::unicast(DeviceType::Blitz, first),
        });
        Self {
            entries,
            saw_mode: SawMode::default(),
        }
    }

    pub fn get(&self, mode: MeasureMode) -> RoutingEntry {
        self.entries[mode.index()]
    }

    /// Entry for a raw mode index coming from outside the crate.
    pub fn get_by_index(&self, mode: u8) -> Result<RoutingEntry, RoutingError> {
        Ok(self.get(MeasureMode::try_from(mode)?))
    }

    pub fn set(
        &mut self,
        mode: MeasureMode,
        target_type: DeviceType,
        target_id: u8,
    ) -> Result<(), RoutingError> {
        let id = DeviceId::new(target_id).ok_or(RoutingError::InvalidDevice(target_id))?;
        let entry = &mut self.entries[mode.index()];
        entry.target_type = target_type;
        entry.target_id = id;
        info!(%mode, %target_type, target_id, broadcast = entry.broadcast, "Routing updated");
        Ok(())
    }

    pub fn set_broadcast(&mut self, mode: MeasureMode, broadcast: bool) {
        let entry = &mut self.entries[mode.index()];
        entry.broadcast = broadcast;
        info!(%mode, broadcast, "Routing broadcast updated");
    }

    pub fn saw_mode(&self) -> SawMode {
        self.saw_mode
    }

    pub fn set_saw_mode(&mut self, saw_mode: SawMode) {
        self.saw_mode = saw_mode;
        info!(mode = saw_mode.wire_name(), "Saw mode updated");
    }

    pub fn pack(&self) -> PackedRouting {
        PackedRouting {
            routes: self.entries.iter().map(|e| e.pack()).collect(),
            broadcast: self.entries.iter().map(|e| e.broadcast).collect(),
            saw_mode: self.saw_mode.to_byte(),
        }
    }

    /// Rebuild a table from its packed form.
    ///
    /// Missing or undecodable bytes keep the factory entry for that mode.
    pub fn unpack(packed: &PackedRouting) -> Self {
        let mut table = Self::defaults();
        for (mode, byte) in MeasureMode::ALL.into_iter().zip(&packed.routes) {
            match RoutingEntry::unpack(*byte) {
                Some(entry) => table.entries[mode.index()] = entry,
                None => warn!(%mode, byte, "Invalid routing byte, using default"),
            }
        }
        for (entry, broadcast) in table.entries.iter_mut().zip(&packed.broadcast) {
            entry.broadcast = *broadcast;
        }
        table.saw_mode = SawMode::from_byte(packed.saw_mode);
        table
    }

    pub fn save<S: SettingsStore + ?Sized>(&self, store: &mut S) -> Result<(), StoreError> {
        for mode in MeasureMode::ALL {
            let entry = self.get(mode);
            store.set_u8(mode.storage_key(), entry.pack())?;
            store.set_u8(&broadcast_key(mode), u8::from(entry.broadcast))?;
        }
        store.set_u8(SAW_MODE_KEY, self.saw_mode.to_byte())?;
        store.commit()?;
        info!("Routing configuration saved");
        Ok(())
    }

    /// Load the persisted table. Keys never written fall back to defaults.
    pub fn load<S: SettingsStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        let mut table = Self::defaults();
        for mode in MeasureMode::ALL {
            if let Some(byte) = store.get_u8(mode.storage_key())? {
                match RoutingEntry::unpack(byte) {
                    Some(entry) => table.entries[mode.index()] = entry,
                    None => warn!(%mode, byte, "Invalid stored routing byte, using default"),
                }
            }
            if let Some(flag) = store.get_u8(&broadcast_key(mode))? {
                table.entries[mode.index()].broadcast = flag != 0;
            }
        }
        if let Some(byte) = store.get_u8(SAW_MODE_KEY)? {
            table.saw_mode = SawMode::from_byte(byte);
        }
        info!("Routing configuration loaded");
        Ok(table)
    }
}

/// Settings key of a mode's broadcast flag.
fn broadcast_key(mode: MeasureMode) -> String {
    format!("{}_bc", mode.storage_key())
}
