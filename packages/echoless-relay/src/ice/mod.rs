//! ICE configuration module.
//!
//! Supplies the STUN/TURN server list handed to every joining client.
//! TURN credentials come from Twilio's Network Traversal Service when it is
//! configured; otherwise, or whenever that call fails, clients get a static
//! list of public STUN servers.

pub mod config;
pub mod provider;

pub use config::IceConfig;
pub use provider::IceProvider;
