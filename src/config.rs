// Gateway configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    // Per-provider budget for one search fan-out
    pub search_timeout_ms: u64,
    // Budget for pricing, seatmap and order calls routed to a single provider
    pub follow_up_timeout_ms: u64,
    // How long an offer remembers which provider produced it
    pub offer_route_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            search_timeout_ms: 60_000,
            follow_up_timeout_ms: 60_000,
            offer_route_ttl_seconds: 1_800,
            cleanup_interval_seconds: 60,
        }
    }
}

impl GatewayConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("search_timeout_ms", self.search_timeout_ms),
            ("follow_up_timeout_ms", self.follow_up_timeout_ms),
            ("offer_route_ttl_seconds", self.offer_route_ttl_seconds),
            ("cleanup_interval_seconds", self.cleanup_interval_seconds),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn follow_up_timeout(&self) -> Duration {
        Duration::from_millis(self.follow_up_timeout_ms)
    }

    pub fn offer_route_ttl(&self) -> Duration {
        Duration::from_secs(self.offer_route_ttl_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}
