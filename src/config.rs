//! Layered configuration for the sidecar.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - TOML configuration file (`provwatch.toml` by default)
//! - environment variables prefixed `PROVWATCH_`
//!
//! Environment variables use double underscores to separate nested levels:
//! - `PROVWATCH_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `PROVWATCH_GATEWAY__BASE_URL=http://grafana:3000` sets `gateway.base_url`
//!
//! Settings are built once in main and passed down by reference; no
//! component reads process-wide state directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "provwatch.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Directory watched recursively for provisioning changes.
    #[serde(default = "default_watch_root")]
    pub root: PathBuf,

    /// Quiescence window for the per-category debounce.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GatewayConfig {
    /// Base URL of the control-plane API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout. Timeout policy lives at the gateway, not the core.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Admin user for account creation and elevation.
    #[serde(default = "default_admin_login")]
    pub admin_login: String,

    #[serde(default = "default_admin_password")]
    pub admin_password: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdentityConfig {
    /// Path of the cached credential file.
    #[serde(default = "default_identity_file")]
    pub file: PathBuf,

    /// Prefix for the derived service-account name.
    #[serde(default = "default_identity_name")]
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level: error, warn, info, debug, trace.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `dispatch = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_watch_root() -> PathBuf {
    PathBuf::from("/etc/grafana/provisioning")
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_admin_login() -> String {
    "admin".to_string()
}
fn default_admin_password() -> String {
    "admin".to_string()
}
fn default_identity_file() -> PathBuf {
    PathBuf::from("provwatch-identity.json")
}
fn default_identity_name() -> String {
    "provwatch".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_watch_root(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            admin_login: default_admin_login(),
            admin_password: default_admin_password(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            file: default_identity_file(),
            name: default_identity_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load(config_file: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let path = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name (debounce_ms, base_url).
            .merge(
                Env::prefixed("PROVWATCH_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }

    /// Write a default configuration file.
    pub fn init_config_file(path: &Path, force: bool) -> anyhow::Result<()> {
        if !force && path.exists() {
            anyhow::bail!(
                "configuration file {} already exists (use --force to overwrite)",
                path.display()
            );
        }

        let toml_string = toml::to_string_pretty(&Settings::default())?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.watch.debounce_ms, 500);
        assert_eq!(settings.gateway.base_url, "http://localhost:3000");
        assert_eq!(settings.logging.default, "info");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provwatch.toml");
        std::fs::write(
            &path,
            r#"
            [watch]
            root = "/srv/provisioning"
            debounce_ms = 250

            [gateway]
            base_url = "http://grafana:3000"
            "#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.watch.root, PathBuf::from("/srv/provisioning"));
        assert_eq!(settings.watch.debounce_ms, 250);
        assert_eq!(settings.gateway.base_url, "http://grafana:3000");
        // Untouched sections keep their defaults.
        assert_eq!(settings.identity.name, "provwatch");
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provwatch.toml");

        Settings::init_config_file(&path, false).unwrap();
        assert!(Settings::init_config_file(&path, false).is_err());
        assert!(Settings::init_config_file(&path, true).is_ok());
    }
}
