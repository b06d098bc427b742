//! Settings loading: a base file, an environment override file, then
//! environment variables prefixed `MCLOUD_`, layered with the `config`
//! crate the way `tasker-shared` layers `TaskerConfig`.

use serde::{Deserialize, Serialize};

use crate::error::{McloudError, McloudResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Port the transport listens on.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Filesystem root for volumes and btrfs snapshots.
    #[serde(default = "default_home_dir")]
    pub home_dir: String,

    /// Whether `home_dir` lives on a btrfs filesystem (enables
    /// snapshot-based backups instead of pause/unpause).
    #[serde(default)]
    pub btrfs: bool,

    /// Suffix appended to service names to form their resolvable hostname.
    #[serde(default = "default_dns_search_suffix")]
    pub dns_search_suffix: String,

    /// Graceful shutdown budget.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_bind_port() -> u16 {
    7080
}

fn default_home_dir() -> String {
    "/root/.mcloud".to_string()
}

fn default_dns_search_suffix() -> String {
    "mcloud.local".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_port: default_bind_port(),
            home_dir: default_home_dir(),
            btrfs: false,
            dns_search_suffix: default_dns_search_suffix(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Settings {
    /// Load settings from `config/mcloud.toml` (if present) and
    /// `MCLOUD_*` environment variables, falling back to defaults.
    pub fn load() -> McloudResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/mcloud").required(false))
            .add_source(config::Environment::with_prefix("MCLOUD").separator("__"));

        let built = builder
            .build()
            .map_err(|e| McloudError::ConfigParseError(e.to_string()))?;

        match built.try_deserialize::<Settings>() {
            Ok(settings) => Ok(settings),
            Err(config::ConfigError::NotFound(_)) => Ok(Settings::default()),
            Err(e) => Err(McloudError::ConfigParseError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = Settings::default();
        assert_eq!(settings.bind_port, 7080);
        assert!(!settings.btrfs);
        assert_eq!(settings.shutdown_timeout_ms, 30_000);
    }

    #[test]
    fn load_without_config_file_falls_back_to_defaults() {
        // No config/mcloud.toml in the crate's test working directory and
        // no MCLOUD_* vars set: load() should not error.
        let settings = Settings::load().expect("settings load should fall back to defaults");
        assert_eq!(settings.dns_search_suffix, "mcloud.local");
    }
}
