//! Server state management.
//!
//! `RelayState` is cloned into every handler. It bundles the connection
//! registry (who is connected and how to reach them), the presence store
//! (who is in which room), and the ICE provider.

use std::sync::Arc;

use crate::ice::{IceConfig, IceProvider};
use crate::presence::{MemoryPresenceStore, PresenceStore, DEFAULT_ROOM_TTL_SECS};
use crate::registry::ConnectionRegistry;

/// Default port, matching what the web client expects.
const DEFAULT_PORT: u16 = 3001;

/// Default interval between expired-room sweeps (5 minutes).
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    /// Origin allowed by CORS (`*` for any).
    pub frontend_url: String,
    /// Liveness TTL for room records, refreshed on every membership change.
    pub room_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub ice: IceConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frontend_url: "http://localhost:3000".to_string(),
            room_ttl_secs: DEFAULT_ROOM_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            ice: IceConfig::default(),
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Connection ID → outbound channel and joined room.
    pub registry: ConnectionRegistry,

    /// Room membership and member profiles.
    pub presence: Arc<dyn PresenceStore>,

    /// STUN/TURN descriptors for joining clients.
    pub ice: IceProvider,

    /// Server configuration.
    pub config: Arc<RelayConfig>,
}

impl RelayState {
    /// Create a new relay state with the in-process presence store.
    pub fn new(config: RelayConfig) -> Self {
        let presence = Arc::new(MemoryPresenceStore::new(config.room_ttl_secs));
        let ice = IceProvider::new(&config.ice);
        Self::with_parts(config, presence, ice)
    }

    /// Create a relay state from explicit components.
    pub fn with_parts(
        config: RelayConfig,
        presence: Arc<dyn PresenceStore>,
        ice: IceProvider,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            presence,
            ice,
            config: Arc::new(config),
        }
    }

    /// Get the number of currently connected clients.
    pub fn online_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Remove rooms whose TTL lapsed. Called periodically by the sweep task.
    ///
    /// A lapsed room with a connected member is kept and refreshed, so the
    /// only rooms removed are orphans left by lost disconnects. No registry
    /// entry can point at a swept room.
    pub async fn sweep_expired_rooms(&self) -> usize {
        let registry = &self.registry;
        let is_live = |connection_id: &str| registry.is_connected(connection_id);

        match self.presence.sweep_expired(&is_live).await {
            Ok(removed) => {
                if !removed.is_empty() {
                    tracing::info!(count = removed.len(), "Swept expired rooms");
                }
                removed.len()
            }
            Err(e) => {
                tracing::error!(error = %e, "Expired room sweep failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::protocol::{Participant, ServerMessage};
    use crate::rooms;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.frontend_url, "http://localhost:3000");
        assert_eq!(config.room_ttl_secs, 24 * 3600);
        assert_eq!(config.sweep_interval_secs, 300);
        assert!(!config.ice.twilio_enabled());
    }

    #[tokio::test]
    async fn test_state_creation() {
        let state = RelayState::new(RelayConfig::default());
        assert_eq!(state.online_count(), 0);
        assert_eq!(state.presence.room_count().await.unwrap(), 0);
        assert!(!state.ice.has_upstream());
    }

    #[tokio::test]
    async fn test_sweep_expired_rooms() {
        let state = RelayState::new(RelayConfig {
            room_ttl_secs: -1, // Expire immediately
            ..RelayConfig::default()
        });
        state
            .presence
            .add_member(
                "r1",
                Participant {
                    id: "a".to_string(),
                    nickname: "ana".to_string(),
                    is_muted: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(state.sweep_expired_rooms().await, 1);
        assert_eq!(state.sweep_expired_rooms().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_spares_rooms_with_connected_members() {
        let state = RelayState::new(RelayConfig {
            room_ttl_secs: -1,
            ..RelayConfig::default()
        });
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.registry.register("a", tx_a);
        state.registry.register("b", tx_b);
        rooms::join(&state, "a", "R1", "ana").await.unwrap();
        rooms::join(&state, "b", "R1", "bo").await.unwrap();
        while rx_b.try_recv().is_ok() {}

        assert_eq!(state.sweep_expired_rooms().await, 0);
        assert_eq!(state.presence.member_count("R1").await.unwrap(), 2);

        // Both members keep working after the sweep.
        rooms::update_state(&state, "a", true).await.unwrap();
        rooms::send_chat(&state, "a", "still here".to_string(), 1).await.unwrap();
        assert_eq!(
            rooms::leave(&state, "a").await.unwrap(),
            rooms::LeaveOutcome::Left {
                room_id: "R1".to_string(),
                remaining: 1,
            }
        );
        let mut seen = Vec::new();
        while let Ok(msg) = rx_b.try_recv() {
            seen.push(msg);
        }
        assert!(seen.contains(&ServerMessage::MemberLeft { id: "a".to_string() }));
    }

    #[tokio::test]
    async fn test_sweep_reclaims_room_after_lost_disconnect() {
        let state = RelayState::new(RelayConfig {
            room_ttl_secs: -1,
            ..RelayConfig::default()
        });
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        state.registry.register("a", tx_a);
        rooms::join(&state, "a", "R1", "ana").await.unwrap();

        // The socket is gone but the store never heard about it.
        state.registry.unregister("a");

        assert_eq!(state.sweep_expired_rooms().await, 1);
        assert_eq!(state.presence.room_count().await.unwrap(), 0);
        assert_eq!(state.presence.participant_count().await.unwrap(), 0);
    }
}
