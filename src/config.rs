//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$REPLYSCAN_CONFIG` (environment variable)
//! 2. `~/.config/replyscan/config.toml` (Linux/macOS)
//!    `%APPDATA%\replyscan\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Retry policy for store calls.
    pub gateway: GatewayConfig,
    /// Folder scan budgets and snapshot sizes.
    pub scan: ScanConfig,
    /// Conversation lookups and pending-reply scans.
    pub conversation: ConversationConfig,
    /// Numbered listing cache.
    pub cache: CacheConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Retry policy for store calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Extra attempts after a transient failure.
    pub retries: u32,
    /// Pause between attempts, in milliseconds.
    pub delay_ms: u64,
}

/// Folder scan budgets and snapshot sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Records a multi-folder listing aims for, split across folders.
    pub total_budget: usize,
    /// Floor of the per-folder share of `total_budget`.
    pub min_per_folder: usize,
    /// Hard ceiling of records taken from one folder.
    pub max_per_folder: usize,
    /// Largest accepted `days` window for listings.
    pub max_days: u32,
    /// Characters kept in a body preview.
    pub preview_chars: usize,
    /// Attachment names sampled per record.
    pub attachment_sample: usize,
}

/// Conversation lookups and pending-reply scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Related messages inspected per reply check.
    pub sample_limit: usize,
    /// Largest accepted conversation lookback, in days.
    pub max_lookback_days: u32,
    /// Candidates processed per requested result before the scan gives up.
    pub pending_scan_multiplier: usize,
    /// Largest accepted `max_results` for a pending-reply scan.
    pub max_pending_results: usize,
    /// Lines in a conversation outline.
    pub outline_items: usize,
}

/// Numbered listing cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries kept before least-recently-used eviction.
    pub max_entries: usize,
    /// Seconds an entry stays valid (0 disables expiry).
    pub ttl_secs: u64,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            delay_ms: 400,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            total_budget: 150,
            min_per_folder: 5,
            max_per_folder: 400,
            max_days: 30,
            preview_chars: 220,
            attachment_sample: 5,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            sample_limit: 15,
            max_lookback_days: 180,
            pending_scan_multiplier: 4,
            max_pending_results: 200,
            outline_items: 4,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl_secs: 1800,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location and return where it went.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    write_config(config, &path)?;
    Ok(path)
}

/// Write configuration as TOML to `path`, creating parent directories.
pub fn write_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("REPLYSCAN_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("replyscan").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("replyscan")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.gateway.retries, 1);
        assert_eq!(cfg.gateway.delay_ms, 400);
        assert_eq!(cfg.scan.total_budget, 150);
        assert_eq!(cfg.scan.max_per_folder, 400);
        assert_eq!(cfg.conversation.sample_limit, 15);
        assert_eq!(cfg.cache.max_entries, 500);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.scan.preview_chars, cfg.scan.preview_chars);
        assert_eq!(
            parsed.conversation.max_lookback_days,
            cfg.conversation.max_lookback_days
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[gateway]
retries = 3

[scan]
total_budget = 300
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.gateway.retries, 3);
        assert_eq!(cfg.scan.total_budget, 300);
        // Other fields use defaults
        assert_eq!(cfg.gateway.delay_ms, 400);
        assert_eq!(cfg.scan.min_per_folder, 5);
        assert_eq!(cfg.cache.ttl_secs, 1800);
    }

    #[test]
    fn test_cache_dir_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/replyscan-test"));
        assert_eq!(cache_dir(&cfg), PathBuf::from("/tmp/replyscan-test"));
    }

    #[test]
    fn test_write_config_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.gateway.retries = 4;
        cfg.cache.ttl_secs = 0;

        write_config(&cfg, &path).expect("write");

        let text = std::fs::read_to_string(&path).expect("read back");
        assert!(text.contains("[gateway]"));
        let parsed: Config = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.gateway.retries, 4);
        assert_eq!(parsed.cache.ttl_secs, 0);
        assert_eq!(parsed.scan.total_budget, cfg.scan.total_budget);
    }
}
