//! Signal relay.
//!
//! Stateless forwarding of WebRTC signaling payloads between connections.
//! Delivery is at-most-once: a payload for a connection that is gone is
//! dropped, never queued or retried. Payloads are forwarded as-is.
//!
//! Target ids are not checked against the sender's room. Clients get the ids
//! of their room's members at join time and are expected to use those.

use serde_json::Value;

use crate::error::{RelayError, RelayResult};
use crate::protocol::ServerMessage;
use crate::registry::ConnectionRegistry;

/// Forward an offer (or candidate) to `target_id`.
///
/// `caller_id` is passed through so the target knows whom to answer.
pub fn relay_signal(
    registry: &ConnectionRegistry,
    origin_id: &str,
    target_id: &str,
    caller_id: &str,
    payload: Value,
) -> RelayResult<()> {
    tracing::debug!(from = origin_id, to = target_id, "Forwarding signal");

    let delivered = registry.send_to(
        target_id,
        ServerMessage::SignalReceived {
            caller_id: caller_id.to_string(),
            payload,
        },
    );
    if delivered {
        Ok(())
    } else {
        Err(RelayError::TargetUnreachable(target_id.to_string()))
    }
}

/// Return an answer to the connection that sent the original signal.
pub fn relay_return_signal(
    registry: &ConnectionRegistry,
    origin_id: &str,
    caller_id: &str,
    payload: Value,
) -> RelayResult<()> {
    tracing::debug!(from = origin_id, to = caller_id, "Returning signal");

    let delivered = registry.send_to(
        caller_id,
        ServerMessage::SignalReturned {
            id: origin_id.to_string(),
            payload,
        },
    );
    if delivered {
        Ok(())
    } else {
        Err(RelayError::TargetUnreachable(caller_id.to_string()))
    }
}
