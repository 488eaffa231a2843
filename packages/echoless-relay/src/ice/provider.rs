//! ICE server provider.
//!
//! `IceProvider::ice_servers` never fails: upstream errors are logged and
//! replaced by the STUN fallback so a TURN outage cannot block a join.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::config::IceConfig;
use crate::error::{RelayError, RelayResult};
use crate::protocol::{IceServer, IceUrls};

/// Public STUN servers used when no TURN source is available.
pub const FALLBACK_STUN_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

pub fn fallback_ice_servers() -> Vec<IceServer> {
    FALLBACK_STUN_SERVERS
        .iter()
        .map(|urls| IceServer::stun(urls))
        .collect()
}

/// An upstream that hands out ICE server descriptors (usually with
/// short-lived TURN credentials).
#[async_trait]
pub trait IceServerSource: Send + Sync {
    async fn fetch(&self) -> RelayResult<Vec<IceServer>>;
}

// ── Twilio ───────────────────────────────────────────────────────────────────

/// Fetches TURN credentials from Twilio's Tokens endpoint.
///
/// POST {base}/2010-04-01/Accounts/{sid}/Tokens.json (HTTP basic auth)
pub struct TwilioTokenSource {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TwilioToken {
    #[serde(default)]
    ice_servers: Vec<TwilioIceServer>,
}

#[derive(Debug, Deserialize)]
struct TwilioIceServer {
    urls: Option<IceUrls>,
    /// Older responses only carry the singular form.
    url: Option<String>,
    username: Option<String>,
    credential: Option<String>,
}

impl TwilioTokenSource {
    pub fn new(
        account_sid: &str,
        auth_token: &str,
        base_url: &str,
        timeout: Duration,
    ) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::UpstreamUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tokens_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Tokens.json",
            self.base_url, self.account_sid
        )
    }
}

#[async_trait]
impl IceServerSource for TwilioTokenSource {
    async fn fetch(&self) -> RelayResult<Vec<IceServer>> {
        let upstream = |e: reqwest::Error| RelayError::UpstreamUnavailable(e.to_string());

        let token: TwilioToken = self
            .client
            .post(self.tokens_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?
            .json()
            .await
            .map_err(upstream)?;

        let servers: Vec<IceServer> = token
            .ice_servers
            .into_iter()
            .filter_map(|server| {
                Some(IceServer {
                    urls: server.urls.or(server.url.map(IceUrls::One))?,
                    username: server.username,
                    credential: server.credential,
                })
            })
            .collect();

        if servers.is_empty() {
            return Err(RelayError::UpstreamUnavailable(
                "Twilio returned no ICE servers".to_string(),
            ));
        }
        Ok(servers)
    }
}

// ── Provider ─────────────────────────────────────────────────────────────────

/// Hands out the ICE configuration for each join.
#[derive(Clone, Default)]
pub struct IceProvider {
    source: Option<Arc<dyn IceServerSource>>,
}

impl IceProvider {
    /// Build from configuration. Uses Twilio when both credentials are set.
    pub fn new(config: &IceConfig) -> Self {
        let (Some(sid), Some(token)) = (&config.twilio_account_sid, &config.twilio_auth_token)
        else {
            tracing::info!("TURN credentials not provided, using basic STUN servers only");
            return Self::fallback_only();
        };
        if !config.twilio_enabled() {
            tracing::info!("TURN credentials empty, using basic STUN servers only");
            return Self::fallback_only();
        }

        match TwilioTokenSource::new(
            sid,
            token,
            config.twilio_base_url(),
            Duration::from_secs(config.timeout_secs),
        ) {
            Ok(source) => {
                tracing::info!("Twilio initialized for TURN servers");
                Self::with_source(Arc::new(source))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to initialize Twilio client");
                Self::fallback_only()
            }
        }
    }

    pub fn fallback_only() -> Self {
        Self { source: None }
    }

    pub fn with_source(source: Arc<dyn IceServerSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Whether an upstream TURN source is configured.
    pub fn has_upstream(&self) -> bool {
        self.source.is_some()
    }

    /// The ICE servers to hand to a joining client.
    pub async fn ice_servers(&self) -> Vec<IceServer> {
        let Some(source) = &self.source else {
            return fallback_ice_servers();
        };

        match source.fetch().await {
            Ok(servers) => servers,
            Err(e) => {
                tracing::warn!(error = %e, "Error getting TURN servers, falling back to STUN");
                fallback_ice_servers()
            }
        }
    }
}
