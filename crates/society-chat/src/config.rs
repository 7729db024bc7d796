use std::time::Duration;

use society_types::models::Role;
use tracing::warn;

/// Client settings for a discussion session.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the complaints REST API
    pub api_url: String,
    /// WebSocket URL of the realtime gateway
    pub gateway_url: String,
    /// Name announced with our typing-start signal
    pub display_name: String,
    /// Our role, used to tint our optimistic messages
    pub role: Role,
    /// Idle time after the last keystroke before typing-stop is emitted
    pub typing_idle: Duration,
    /// Remote typers not refreshed within this window are dropped. `None` keeps them until stopped.
    pub remote_typing_expiry: Option<Duration>,
    /// Consecutive failed connection attempts allowed after the first one
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".into(),
            gateway_url: "ws://127.0.0.1:3000/gateway".into(),
            display_name: "You".into(),
            role: Role::Tenant,
            typing_idle: Duration::from_millis(1200),
            remote_typing_expiry: Some(Duration::from_secs(6)),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(5),
        }
    }
}

impl ChatConfig {
    /// Reads `SOCIETY_*` variables, falling back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SOCIETY_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = std::env::var("SOCIETY_GATEWAY_URL") {
            config.gateway_url = url;
        }
        if let Ok(name) = std::env::var("SOCIETY_DISPLAY_NAME") {
            config.display_name = name;
        }
        if let Ok(role) = std::env::var("SOCIETY_ROLE") {
            match role.parse() {
                Ok(role) => config.role = role,
                Err(e) => warn!("Ignoring SOCIETY_ROLE: {}", e),
            }
        }

        config
    }

    /// Backoff before reconnect attempt `attempt` (1-based): doubles from
    /// `reconnect_delay`, capped at `reconnect_delay_max`.
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.reconnect_delay
            .saturating_mul(1u32 << shift)
            .min(self.reconnect_delay_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let config = ChatConfig::default();
        assert_eq!(config.reconnect_backoff(1), Duration::from_secs(1));
        assert_eq!(config.reconnect_backoff(2), Duration::from_secs(2));
        assert_eq!(config.reconnect_backoff(3), Duration::from_secs(4));
        assert_eq!(config.reconnect_backoff(4), Duration::from_secs(5));
        assert_eq!(config.reconnect_backoff(40), Duration::from_secs(5));
    }
}
