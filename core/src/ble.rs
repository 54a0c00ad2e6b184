use std::sync::Arc;

use crate::error::TransportError;
use crate::models::{ConnHandle, PeerAddress};

/// Radio link to connected peers. Only notification is needed: every
/// outbound message is pushed on the measurement characteristic.
pub trait PeerTransport {
    fn notify(&self, conn: ConnHandle, payload: &[u8]) -> Result<(), TransportError>;
}

impl<T: PeerTransport + ?Sized> PeerTransport for Arc<T> {
    fn notify(&self, conn: ConnHandle, payload: &[u8]) -> Result<(), TransportError> {
        (**self).notify(conn, payload)
    }
}

/// Connection events raised by the radio stack.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    Connected {
        conn: ConnHandle,
        address: PeerAddress,
    },
    Disconnected {
        conn: ConnHandle,
    },
    Data {
        conn: ConnHandle,
        payload: Vec<u8>,
    },
}
