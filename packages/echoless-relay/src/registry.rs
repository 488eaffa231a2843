//! Connection registry.
//!
//! Process-local map from connection id to the channel that feeds its
//! WebSocket, plus the room the connection joined. The room binding is a
//! cache of what the presence store already knows, kept here so the leave
//! path can find the room without a store round-trip.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::{RelayError, RelayResult};
use crate::protocol::ServerMessage;

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

struct ConnectionEntry {
    sender: ClientSender,
    /// Set once, on the first successful join.
    room_id: Option<String>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection.
    pub fn register(&self, connection_id: &str, sender: ClientSender) {
        tracing::debug!(conn = connection_id, "Connection registered");
        self.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                sender,
                room_id: None,
            },
        );
    }

    /// Drop a connection and return the room it had joined, if any.
    pub fn unregister(&self, connection_id: &str) -> Option<String> {
        self.connections
            .remove(connection_id)
            .and_then(|(_, entry)| entry.room_id)
    }

    /// Record the room a connection joined. A connection binds at most once.
    pub fn bind_room(&self, connection_id: &str, room_id: &str) -> RelayResult<()> {
        let mut entry = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| RelayError::TargetUnreachable(connection_id.to_string()))?;
        if entry.room_id.is_some() {
            return Err(RelayError::AlreadyMember);
        }
        entry.room_id = Some(room_id.to_string());
        Ok(())
    }

    pub fn room_of(&self, connection_id: &str) -> Option<String> {
        self.connections
            .get(connection_id)
            .and_then(|entry| entry.room_id.clone())
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Queue a message for one connection. Returns false if the connection is
    /// gone; nothing is retried.
    pub fn send_to(&self, connection_id: &str, message: ServerMessage) -> bool {
        if let Some(entry) = self.connections.get(connection_id) {
            entry.sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Send the same message to several connections. Returns how many were
    /// delivered.
    pub fn send_to_many<'a, I>(&self, connection_ids: I, message: &ServerMessage) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        connection_ids
            .into_iter()
            .filter(|id| self.send_to(id, message.clone()))
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.register("a", tx);
        assert!(registry.is_connected("a"));
        assert_eq!(registry.connection_count(), 1);

        assert_eq!(registry.unregister("a"), None);
        assert!(!registry.is_connected("a"));
        assert_eq!(registry.unregister("a"), None);
    }

    #[test]
    fn test_bind_room_is_one_shot() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("a", tx);

        registry.bind_room("a", "r1").unwrap();
        assert_eq!(registry.bind_room("a", "r2"), Err(RelayError::AlreadyMember));
        assert_eq!(registry.room_of("a").as_deref(), Some("r1"));
        assert_eq!(registry.unregister("a").as_deref(), Some("r1"));
    }

    #[test]
    fn test_bind_unknown_connection_fails() {
        let registry = ConnectionRegistry::new();
        assert!(matches!(
            registry.bind_room("ghost", "r1"),
            Err(RelayError::TargetUnreachable(_))
        ));
    }

    #[test]
    fn test_send_to_connected_and_missing() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("a", tx);

        assert!(registry.send_to("a", ServerMessage::Pong));
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Pong);

        assert!(!registry.send_to("nobody", ServerMessage::Pong));
    }

    #[test]
    fn test_send_to_closed_receiver_reports_failure() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("a", tx);
        drop(rx);

        assert!(!registry.send_to("a", ServerMessage::Pong));
    }

    #[test]
    fn test_send_to_many_counts_deliveries() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register("a", tx_a);
        registry.register("b", tx_b);

        let delivered = registry.send_to_many(["a", "b", "gone"], &ServerMessage::Pong);
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Pong);
        assert_eq!(rx_b.try_recv().unwrap(), ServerMessage::Pong);
    }
}
