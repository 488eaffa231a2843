//! Room lifecycle.
//!
//! Join, leave, mute-state and chat protocols. Each connection moves through
//! `Connected → InRoom → Left`; the presence store decides when a room stops
//! existing, and nothing here ever destroys a room directly. A room goes away
//! only because its last member left.

use uuid::Uuid;

use crate::error::{RelayError, RelayResult};
use crate::presence::ProfileUpdate;
use crate::protocol::{ChatMessage, Participant, ServerMessage};
use crate::state::RelayState;

/// What happened to a connection's room when it left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection never joined a room.
    NotJoined,
    /// The room lives on with `remaining` members.
    Left { room_id: String, remaining: usize },
    /// The connection was the last member; the room is gone.
    RoomDestroyed { room_id: String },
}

/// Join a room.
///
/// The joiner gets one `room_joined` frame carrying everyone already present
/// and the ICE servers; every other member gets `member_joined`.
pub async fn join(
    state: &RelayState,
    connection_id: &str,
    room_id: &str,
    nickname: &str,
) -> RelayResult<()> {
    let room_id = room_id.trim();
    let nickname = nickname.trim();
    if room_id.is_empty() {
        return Err(RelayError::InvalidJoin("roomId is required".to_string()));
    }
    if nickname.is_empty() {
        return Err(RelayError::InvalidJoin("nickname is required".to_string()));
    }
    if state.registry.room_of(connection_id).is_some() {
        return Err(RelayError::AlreadyMember);
    }

    let profile = Participant {
        id: connection_id.to_string(),
        nickname: nickname.to_string(),
        is_muted: false,
    };
    let created = state.presence.add_member(room_id, profile.clone()).await?;

    let members = match state.presence.list_members(room_id, Some(connection_id)).await {
        Ok(members) => members,
        Err(e) => {
            rollback_join(state, room_id, connection_id).await;
            return Err(e);
        }
    };
    if let Err(e) = state.registry.bind_room(connection_id, room_id) {
        rollback_join(state, room_id, connection_id).await;
        return Err(e);
    }

    let ice_servers = state.ice.ice_servers().await;

    state.registry.send_to(
        connection_id,
        ServerMessage::RoomJoined {
            members: members.clone(),
            ice_servers,
        },
    );
    state.registry.send_to_many(
        members.iter().map(|m| m.id.as_str()),
        &ServerMessage::MemberJoined { member: profile },
    );

    tracing::info!(
        conn = connection_id,
        room_id = room_id,
        created = created,
        members = members.len() + 1,
        "Participant joined room"
    );
    Ok(())
}

/// Undo a half-finished join so the room count stays exact.
async fn rollback_join(state: &RelayState, room_id: &str, connection_id: &str) {
    match state.presence.remove_member(room_id, connection_id).await {
        Ok(0) => {
            if let Err(e) = state.presence.destroy_room_if_empty(room_id).await {
                tracing::error!(conn = connection_id, room_id = room_id, error = %e, "Join rollback failed");
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(conn = connection_id, room_id = room_id, error = %e, "Join rollback failed");
        }
    }
}

/// Run the leave protocol for a disconnected connection.
///
/// The registry entry is purged first, whatever the store does afterwards,
/// so a connection can never stay half-joined.
pub async fn leave(state: &RelayState, connection_id: &str) -> RelayResult<LeaveOutcome> {
    let Some(room_id) = state.registry.unregister(connection_id) else {
        return Ok(LeaveOutcome::NotJoined);
    };

    let remaining = state.presence.remove_member(&room_id, connection_id).await?;

    if remaining > 0 {
        let others = state.presence.list_members(&room_id, None).await?;
        state.registry.send_to_many(
            others.iter().map(|m| m.id.as_str()),
            &ServerMessage::MemberLeft {
                id: connection_id.to_string(),
            },
        );
        tracing::info!(
            conn = connection_id,
            room_id = room_id.as_str(),
            remaining = remaining,
            "Participant left room"
        );
        return Ok(LeaveOutcome::Left { room_id, remaining });
    }

    if state.presence.destroy_room_if_empty(&room_id).await? {
        tracing::info!(room_id = room_id.as_str(), "Room destroyed - last participant left");
        Ok(LeaveOutcome::RoomDestroyed { room_id })
    } else {
        // Someone joined between our removal and the destroy check.
        tracing::debug!(room_id = room_id.as_str(), "Room repopulated before destroy");
        Ok(LeaveOutcome::Left {
            room_id,
            remaining: 0,
        })
    }
}

/// Update mute state and tell the rest of the room.
pub async fn update_state(
    state: &RelayState,
    connection_id: &str,
    is_muted: bool,
) -> RelayResult<()> {
    let room_id = state
        .presence
        .update_profile(connection_id, ProfileUpdate::Muted(is_muted))
        .await?;

    let others = state
        .presence
        .list_members(&room_id, Some(connection_id))
        .await?;
    state.registry.send_to_many(
        others.iter().map(|m| m.id.as_str()),
        &ServerMessage::StateChanged {
            id: connection_id.to_string(),
            is_muted,
        },
    );

    tracing::debug!(conn = connection_id, is_muted = is_muted, "Participant state changed");
    Ok(())
}

/// Broadcast a chat message to the sender's room, sender included.
pub async fn send_chat(
    state: &RelayState,
    connection_id: &str,
    body: String,
    timestamp: i64,
) -> RelayResult<ChatMessage> {
    let (room_id, sender) = state
        .presence
        .lookup_member(connection_id)
        .await?
        .ok_or(RelayError::NotAMember)?;

    let message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        sender_id: sender.id,
        sender_nickname: sender.nickname,
        body,
        timestamp,
    };

    let members = state.presence.list_members(&room_id, None).await?;
    let delivered = state.registry.send_to_many(
        members.iter().map(|m| m.id.as_str()),
        &ServerMessage::ChatBroadcast(message.clone()),
    );

    tracing::debug!(
        conn = connection_id,
        room_id = room_id.as_str(),
        delivered = delivered,
        "Chat message broadcast"
    );
    Ok(message)
}
