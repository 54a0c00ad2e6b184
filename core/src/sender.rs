//! Delivers measurements to the peer each mode is routed to.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::RoutingError;
use crate::measurement::MeasurementResult;
use crate::models::{DeviceId, MeasureMode};
use crate::probe::Probe;
use crate::protocol;
use crate::routing::{RoutingEntry, RoutingTable};

/// What the sender needs from the radio side.
pub trait PeerLink {
    /// Deliver to one slot; `TargetNotFound` when it is not connected.
    fn send_to(&self, device_id: DeviceId, payload: &[u8]) -> Result<(), RoutingError>;

    /// Deliver to every connected slot and return how many accepted it.
    /// `NoPeers` when nothing is connected.
    fn broadcast(&self, payload: &[u8]) -> Result<usize, RoutingError>;

    fn is_any_connected(&self) -> bool;
}

impl<L: PeerLink + ?Sized> PeerLink for Arc<L> {
    fn send_to(&self, device_id: DeviceId, payload: &[u8]) -> Result<(), RoutingError> {
        (**self).send_to(device_id, payload)
    }

    fn broadcast(&self, payload: &[u8]) -> Result<usize, RoutingError> {
        (**self).broadcast(payload)
    }

    fn is_any_connected(&self) -> bool {
        (**self).is_any_connected()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Unicast(DeviceId),
    Broadcast { recipients: usize },
}

pub struct MeasurementSender<L> {
    link: L,
    routing: Arc<RwLock<RoutingTable>>,
}

impl<L: PeerLink> MeasurementSender<L> {
    pub fn new(link: L, routing: Arc<RwLock<RoutingTable>>) -> Self {
        Self { link, routing }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn routing(&self) -> &Arc<RwLock<RoutingTable>> {
        &self.routing
    }

    /// Serialize `result` and deliver it as the mode's routing entry says.
    pub fn send(
        &self,
        mode: MeasureMode,
        result: &MeasurementResult,
        left: Option<&Probe>,
        right: Option<&Probe>,
    ) -> Result<Delivery, RoutingError> {
        self.send_at(mode, result, left, right, Utc::now().timestamp())
    }

    /// Same as [`send`](Self::send) with an explicit Unix timestamp.
    pub fn send_at(
        &self,
        mode: MeasureMode,
        result: &MeasurementResult,
        left: Option<&Probe>,
        right: Option<&Probe>,
        timestamp: i64,
    ) -> Result<Delivery, RoutingError> {
        let (entry, saw_mode) = {
            let table = self.routing.read().unwrap_or_else(PoisonError::into_inner);
            (table.get(mode), table.saw_mode())
        };

        let payload =
            protocol::encode_measurement(mode, result, left, right, saw_mode, timestamp)?;
        debug!(%mode, len = payload.len(), net_mm = result.net_mm, "Measurement serialized");
        self.deliver(mode, entry, &payload)
    }

    /// Deliver an already serialized payload as `mode`'s routing entry says.
    pub fn route(&self, mode: MeasureMode, payload: &[u8]) -> Result<Delivery, RoutingError> {
        let entry = self
            .routing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mode);
        self.deliver(mode, entry, payload)
    }

    fn deliver(
        &self,
        mode: MeasureMode,
        entry: RoutingEntry,
        payload: &[u8],
    ) -> Result<Delivery, RoutingError> {
        if entry.broadcast {
            if !self.link.is_any_connected() {
                warn!(%mode, "No devices connected for broadcast");
                return Err(RoutingError::NoPeers);
            }
            let recipients = self.link.broadcast(payload)?;
            info!(%mode, recipients, "Measurement broadcast");
            return Ok(Delivery::Broadcast { recipients });
        }

        self.link.send_to(entry.target_id, payload)?;
        info!(
            %mode,
            device_id = %entry.target_id,
            device_type = %entry.target_type,
            "Measurement sent"
        );
        Ok(Delivery::Unicast(entry.target_id))
    }

    /// Deliver a pre-built payload to one slot, bypassing the routing table.
    pub fn send_to_device(&self, device_id: DeviceId, payload: &[u8]) -> Result<(), RoutingError> {
        self.link.send_to(device_id, payload)
    }

    pub fn broadcast(&self, payload: &[u8]) -> Result<usize, RoutingError> {
        self.link.broadcast(payload)
    }
}
