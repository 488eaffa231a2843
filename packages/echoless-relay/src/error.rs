//! Relay error types.
//!
//! ```text
//! RelayError
//!  ├── InvalidJoin          - join without a room id or nickname
//!  ├── AlreadyMember        - second join on the same connection
//!  ├── NotAMember           - state/chat mutation before joining
//!  ├── TargetUnreachable    - signal target is not connected (never surfaced)
//!  └── UpstreamUnavailable  - presence store or ICE source failure
//! ```
//!
//! Only join failures are reported back to the client. Everything else is
//! best-effort and gets logged instead.

use thiserror::Error;

/// Result type alias for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Join request missing a room id or nickname
    #[error("Invalid join request: {0}")]
    InvalidJoin(String),

    /// The connection already occupies a room
    #[error("Connection has already joined a room.")]
    AlreadyMember,

    /// The connection has not joined a room yet
    #[error("Connection is not in a room.")]
    NotAMember,

    /// No live connection with this id
    #[error("Target connection is not reachable: {0}")]
    TargetUnreachable(String),

    /// Backing store or upstream service failed
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl RelayError {
    /// Stable wire code used in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidJoin(_) => "invalid_join",
            RelayError::AlreadyMember => "already_member",
            RelayError::NotAMember => "not_a_member",
            RelayError::TargetUnreachable(_) => "target_unreachable",
            RelayError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            RelayError::InvalidJoin("x".to_string()),
            RelayError::AlreadyMember,
            RelayError::NotAMember,
            RelayError::TargetUnreachable("x".to_string()),
            RelayError::UpstreamUnavailable("x".to_string()),
        ];
        let mut codes: Vec<_> = errors.iter().map(RelayError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = RelayError::InvalidJoin("nickname is required".to_string());
        assert_eq!(err.to_string(), "Invalid join request: nickname is required");
    }
}
