use std::{fs, path::Path, time::Duration};

use client_core::{DiscoverySettings, SessionSettings};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "desktop.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub service_url: String,
    pub discovery_interval_ms: u64,
    pub discovery_max_attempts: u32,
    pub score_throttle_ms: u64,
    pub log_verbose: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: "http://127.0.0.1:5000".into(),
            discovery_interval_ms: 1000,
            discovery_max_attempts: 3,
            score_throttle_ms: 1000,
            log_verbose: 1,
        }
    }
}

/// Command-line overrides; `None` leaves the lower layers in charge.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub service_url: Option<String>,
    pub discovery_interval_ms: Option<u64>,
    pub discovery_max_attempts: Option<u32>,
    pub score_throttle_ms: Option<u64>,
    pub log_verbose: Option<u8>,
}

impl Settings {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            discovery: DiscoverySettings {
                interval: Duration::from_millis(self.discovery_interval_ms),
                max_attempts: self.discovery_max_attempts,
            },
            score_throttle: Duration::from_millis(self.score_throttle_ms),
        }
    }

    /// Applies keys from a `desktop.toml` body. Unknown keys and values of
    /// the wrong shape are skipped.
    pub fn apply_file(&mut self, raw: &str) {
        let table = match toml::from_str::<toml::Table>(raw) {
            Ok(table) => table,
            Err(err) => {
                warn!(error = %err, "config: ignoring unreadable settings file");
                return;
            }
        };
        if let Some(v) = table.get("service_url").and_then(|v| v.as_str()) {
            self.set_service_url(v);
        }
        if let Some(v) = table.get("discovery_interval_ms").and_then(|v| v.as_integer()) {
            self.set_discovery_interval(v.to_string().as_str());
        }
        if let Some(v) = table.get("discovery_max_attempts").and_then(|v| v.as_integer()) {
            self.set_discovery_attempts(v.to_string().as_str());
        }
        if let Some(v) = table.get("score_throttle_ms").and_then(|v| v.as_integer()) {
            self.set_score_throttle(v.to_string().as_str());
        }
        if let Some(v) = table.get("log_verbose").and_then(|v| v.as_integer()) {
            self.set_log_verbose(v.to_string().as_str());
        }
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("APP__SERVICE_URL") {
            self.set_service_url(&v);
        }
        if let Some(v) = lookup("APP__DISCOVERY_INTERVAL_MS") {
            self.set_discovery_interval(&v);
        }
        if let Some(v) = lookup("APP__DISCOVERY_MAX_ATTEMPTS") {
            self.set_discovery_attempts(&v);
        }
        if let Some(v) = lookup("APP__SCORE_THROTTLE_MS") {
            self.set_score_throttle(&v);
        }
        if let Some(v) = lookup("LOG_VERBOSE") {
            self.set_log_verbose(&v);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(v) = &overrides.service_url {
            self.set_service_url(v);
        }
        if let Some(v) = overrides.discovery_interval_ms.filter(|v| *v > 0) {
            self.discovery_interval_ms = v;
        }
        if let Some(v) = overrides.discovery_max_attempts.filter(|v| *v > 0) {
            self.discovery_max_attempts = v;
        }
        if let Some(v) = overrides.score_throttle_ms {
            self.score_throttle_ms = v;
        }
        if let Some(v) = overrides.log_verbose {
            self.log_verbose = v;
        }
    }

    fn set_service_url(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        self.service_url = raw.to_string();
    }

    fn set_discovery_interval(&mut self, raw: &str) {
        match raw.trim().parse::<u64>() {
            Ok(v) if v > 0 => self.discovery_interval_ms = v,
            _ => warn!(value = raw, "config: ignoring discovery interval"),
        }
    }

    fn set_discovery_attempts(&mut self, raw: &str) {
        match raw.trim().parse::<u32>() {
            Ok(v) if v > 0 => self.discovery_max_attempts = v,
            _ => warn!(value = raw, "config: ignoring discovery attempt limit"),
        }
    }

    fn set_score_throttle(&mut self, raw: &str) {
        match raw.trim().parse::<u64>() {
            Ok(v) => self.score_throttle_ms = v,
            Err(_) => warn!(value = raw, "config: ignoring score throttle"),
        }
    }

    fn set_log_verbose(&mut self, raw: &str) {
        // Anything unreadable falls back to info level.
        self.log_verbose = raw.trim().parse::<u8>().unwrap_or(1);
    }
}

/// Defaults, then the settings file, then the environment, then flags.
pub fn load_settings(path: &Path, overrides: &Overrides) -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        settings.apply_file(&raw);
    }
    settings.apply_env(|key| std::env::var(key).ok());
    settings.apply_overrides(overrides);
    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
