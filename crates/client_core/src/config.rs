use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::domain::{address, Address, ChainId};
use thiserror::Error;
use tracing::warn;

pub const SETTINGS_FILE: &str = "fundme.toml";
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("0x24DD76c70ead13ef9c3482A1920c96f2242dad33");

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub contract_address: Address,
    pub chain_id: ChainId,
    pub confirmations: u64,
    pub notification_ttl_secs: u64,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS,
            chain_id: ChainId::SEPOLIA,
            confirmations: 1,
            notification_ttl_secs: 5,
            event_capacity: 256,
        }
    }
}

impl Settings {
    pub fn notification_ttl(&self) -> Duration {
        Duration::from_secs(self.notification_ttl_secs)
    }

    fn validated(mut self) -> Self {
        if self.confirmations == 0 {
            warn!("config: confirmations must be at least 1; using 1");
            self.confirmations = 1;
        }
        if self.event_capacity == 0 {
            warn!("config: event_capacity must be positive; using default");
            self.event_capacity = Settings::default().event_capacity;
        }
        self
    }
}

pub fn parse_settings(raw: &str) -> Result<Settings, SettingsError> {
    Ok(toml::from_str::<Settings>(raw)?.validated())
}

/// Reads `fundme.toml` from the working directory, then `APP__*` environment overrides.
pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => parse_settings(&raw).unwrap_or_else(|err| {
            warn!(path = %path.display(), "config: ignoring settings file: {err}");
            Settings::default()
        }),
        Err(_) => Settings::default(),
    };

    if let Some(v) = env("APP__CONTRACT_ADDRESS") {
        if let Err(err) = apply_override(&mut settings.contract_address, "contract_address", &v) {
            warn!("config: {err}");
        }
    }
    if let Some(v) = env("APP__CHAIN_ID") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => settings.chain_id = ChainId(parsed),
            Err(_) => match ChainId::from_hex(&v) {
                Some(parsed) => settings.chain_id = parsed,
                None => warn!("config: {}", invalid("chain_id", &v)),
            },
        }
    }
    if let Some(v) = env("APP__CONFIRMATIONS") {
        if let Err(err) = apply_override(&mut settings.confirmations, "confirmations", &v) {
            warn!("config: {err}");
        }
    }
    if let Some(v) = env("APP__NOTIFICATION_TTL_SECS") {
        if let Err(err) = apply_override(
            &mut settings.notification_ttl_secs,
            "notification_ttl_secs",
            &v,
        ) {
            warn!("config: {err}");
        }
    }
    if let Some(v) = env("APP__EVENT_CAPACITY") {
        if let Err(err) = apply_override(&mut settings.event_capacity, "event_capacity", &v) {
            warn!("config: {err}");
        }
    }

    settings.validated()
}

fn apply_override<T: std::str::FromStr>(
    slot: &mut T,
    key: &'static str,
    raw: &str,
) -> Result<(), SettingsError> {
    *slot = raw.trim().parse().map_err(|_| invalid(key, raw))?;
    Ok(())
}

fn invalid(key: &'static str, value: &str) -> SettingsError {
    SettingsError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
