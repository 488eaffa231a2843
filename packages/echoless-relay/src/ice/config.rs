//! ICE provider configuration.

/// Default timeout for the upstream credential request.
const DEFAULT_ICE_TIMEOUT_SECS: u64 = 5;

/// Configuration for the ICE server provider.
#[derive(Debug, Clone)]
pub struct IceConfig {
    /// Twilio account SID.
    pub twilio_account_sid: Option<String>,
    /// Twilio auth token.
    pub twilio_auth_token: Option<String>,
    /// Upper bound on a single credential fetch.
    pub timeout_secs: u64,
}

impl IceConfig {
    /// Check if TURN credentials are configured (both SID and token present).
    pub fn twilio_enabled(&self) -> bool {
        matches!(
            (&self.twilio_account_sid, &self.twilio_auth_token),
            (Some(sid), Some(token)) if !sid.is_empty() && !token.is_empty()
        )
    }

    /// Twilio REST API base URL.
    pub fn twilio_base_url(&self) -> &'static str {
        "https://api.twilio.com"
    }
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            twilio_account_sid: None,
            twilio_auth_token: None,
            timeout_secs: DEFAULT_ICE_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twilio_requires_both_credentials() {
        let mut config = IceConfig::default();
        assert!(!config.twilio_enabled());

        config.twilio_account_sid = Some("AC123".to_string());
        assert!(!config.twilio_enabled());

        config.twilio_auth_token = Some(String::new());
        assert!(!config.twilio_enabled());

        config.twilio_auth_token = Some("secret".to_string());
        assert!(config.twilio_enabled());
    }
}
