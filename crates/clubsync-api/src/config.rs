use std::collections::HashMap;
use std::env;
use std::fmt;

use clubsync_core::config::{required_trimmed, value_or_default, ConfigError};
use clubsync_core::SyncSettings;

/// Shortest admin token accepted at start-up
const MIN_ADMIN_TOKEN_LEN: usize = 16;

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub admin_token: String,
    pub sync: SyncSettings,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("admin_token", &"[REDACTED]")
            .field("sync", &self.sync)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "CLUBSYNC_API_BIND_ADDR", "127.0.0.1:8080");

        let admin_token = required_trimmed(&lookup, "CLUBSYNC_ADMIN_TOKEN")?;
        if admin_token.len() < MIN_ADMIN_TOKEN_LEN {
            return Err(ConfigError::Invalid(format!(
                "CLUBSYNC_ADMIN_TOKEN must be at least {MIN_ADMIN_TOKEN_LEN} characters"
            )));
        }

        let sync = SyncSettings::from_lookup(&lookup)?;

        Ok(Self {
            bind_addr,
            admin_token,
            sync,
        })
    }
}
