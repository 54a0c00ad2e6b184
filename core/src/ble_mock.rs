use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::ble::PeerTransport;
use crate::error::TransportError;
use crate::models::ConnHandle;

/// Transport double that records every notification.
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<(ConnHandle, Vec<u8>)>>,
    failing: Mutex<HashSet<ConnHandle>>,
    mtu: Option<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject payloads longer than `mtu` bytes.
    pub fn with_mtu(mtu: usize) -> Self {
        Self {
            mtu: Some(mtu),
            ..Self::default()
        }
    }

    /// Make notifications to `conn` fail from now on.
    pub fn fail_connection(&self, conn: ConnHandle) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conn);
    }

    pub fn sent(&self) -> Vec<(ConnHandle, Vec<u8>)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads sent to `conn`, decoded as UTF-8.
    pub fn sent_to(&self, conn: ConnHandle) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, payload)| String::from_utf8_lossy(&payload).into_owned())
            .collect()
    }

    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl PeerTransport for MockTransport {
    fn notify(&self, conn: ConnHandle, payload: &[u8]) -> Result<(), TransportError> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&conn);
        if failing {
            return Err(TransportError::Disconnected(conn.0));
        }
        if let Some(mtu) = self.mtu.filter(|mtu| payload.len() > *mtu) {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                mtu,
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((conn, payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_notifications() {
        let transport = MockTransport::new();
        transport.notify(ConnHandle(1), b"hello").unwrap();
        transport.notify(ConnHandle(2), b"world").unwrap();

        assert_eq!(transport.sent().len(), 2);
        assert_eq!(transport.sent_to(ConnHandle(2)), vec!["world".to_string()]);

        transport.clear();
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_mock_failing_connection() {
        let transport = MockTransport::new();
        transport.fail_connection(ConnHandle(7));
        assert_eq!(
            transport.notify(ConnHandle(7), b"x"),
            Err(TransportError::Disconnected(7))
        );
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_mock_mtu() {
        let transport = MockTransport::with_mtu(4);
        transport.notify(ConnHandle(1), b"abcd").unwrap();
        assert_eq!(
            transport.notify(ConnHandle(1), b"abcde"),
            Err(TransportError::PayloadTooLarge { size: 5, mtu: 4 })
        );
        assert_eq!(transport.sent().len(), 1);
    }
}
