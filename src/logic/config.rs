//! Daemon Configuration
//!
//! Loaded from a JSON file; every field has a safe default and a missing or
//! malformed file degrades to the defaults with a logged warning. Nonsense
//! values (zero intervals, out-of-range flag threshold) are clamped back to
//! their defaults during validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logic::detectors::IdsVariant;

// ============================================================================
// DEFAULTS
// ============================================================================

const DEFAULT_DETECTOR_INTERVAL_SECS: u64 = 900;
const DEFAULT_CORRELATION_INTERVAL_SECS: u64 = 3600;
const DEFAULT_DETECTOR_TIMEOUT_SECS: u64 = 120;

/// Majority-of-three corroboration: an IP flagged by at least this many
/// sources is classified `attack`.
const DEFAULT_ATTACK_FLAG_THRESHOLD: u32 = 2;

fn default_db_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logshield")
        .join("db")
}

fn default_detector_interval() -> u64 {
    DEFAULT_DETECTOR_INTERVAL_SECS
}

fn default_correlation_interval() -> u64 {
    DEFAULT_CORRELATION_INTERVAL_SECS
}

fn default_detector_timeout() -> u64 {
    DEFAULT_DETECTOR_TIMEOUT_SECS
}

fn default_attack_flag_threshold() -> u32 {
    DEFAULT_ATTACK_FLAG_THRESHOLD
}

// ============================================================================
// PER-SOURCE CONFIG
// ============================================================================

/// Auth log source: where to read it and when this source alone considers
/// an IP's count an attack. Each source gets its own config type so a
/// partially specified block fills in with that source's defaults, never
/// another source's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSourceConfig {
    pub log_path: PathBuf,
    pub threshold: u64,
}

impl Default for AuthSourceConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/auth.log"),
            threshold: 5,
        }
    }
}

/// UFW firewall log source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UfwSourceConfig {
    pub log_path: PathBuf,
    pub threshold: u64,
}

impl Default for UfwSourceConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/ufw.log"),
            threshold: 10,
        }
    }
}

/// IDS/IPS source with its format variant selector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdsSourceConfig {
    pub log_path: PathBuf,
    pub threshold: u64,
    pub variant: IdsVariant,
}

impl Default for IdsSourceConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/snort/alert"),
            threshold: 5,
            variant: IdsVariant::Snort,
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for all SQLite databases
    pub db_root: PathBuf,
    /// Directory for the JSONL audit trail; `None` picks the default
    /// data-local directory
    pub audit_dir: Option<PathBuf>,
    /// Short cadence: detector round interval
    pub detector_interval_secs: u64,
    /// Long cadence: correlation + response interval
    pub correlation_interval_secs: u64,
    /// Per-detector-task timeout within one round
    pub detector_timeout_secs: u64,
    /// Sources flagging an IP for an `attack` verdict (1..=3)
    pub attack_flag_threshold: u32,
    pub auth: AuthSourceConfig,
    pub ids_ips: IdsSourceConfig,
    pub ufw: UfwSourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_root: default_db_root(),
            audit_dir: None,
            detector_interval_secs: default_detector_interval(),
            correlation_interval_secs: default_correlation_interval(),
            detector_timeout_secs: default_detector_timeout(),
            attack_flag_threshold: default_attack_flag_threshold(),
            auth: AuthSourceConfig::default(),
            ids_ips: IdsSourceConfig::default(),
            ufw: UfwSourceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Any read or parse failure
    /// degrades to full defaults; out-of-range values are clamped.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Config>(&raw) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!(
                        "Malformed config {}: {} - using defaults",
                        path.display(),
                        e
                    );
                    Config::default()
                }
            },
            Err(e) => {
                log::warn!(
                    "Config {} not readable: {} - using defaults",
                    path.display(),
                    e
                );
                Config::default()
            }
        };
        config.validate();
        config
    }

    /// Clamp nonsense values back to their defaults.
    pub fn validate(&mut self) {
        if self.detector_interval_secs == 0 {
            log::warn!("detector_interval_secs = 0, falling back to default");
            self.detector_interval_secs = default_detector_interval();
        }
        if self.correlation_interval_secs == 0 {
            log::warn!("correlation_interval_secs = 0, falling back to default");
            self.correlation_interval_secs = default_correlation_interval();
        }
        if self.detector_timeout_secs == 0 {
            log::warn!("detector_timeout_secs = 0, falling back to default");
            self.detector_timeout_secs = default_detector_timeout();
        }
        if !(1..=3).contains(&self.attack_flag_threshold) {
            log::warn!(
                "attack_flag_threshold {} outside 1..=3, falling back to {}",
                self.attack_flag_threshold,
                default_attack_flag_threshold()
            );
            self.attack_flag_threshold = default_attack_flag_threshold();
        }
    }

    // Database paths. One file per logical owner.

    pub fn auth_db_path(&self) -> PathBuf {
        self.db_root.join("auth.db")
    }

    pub fn ids_db_path(&self) -> PathBuf {
        self.db_root.join("ids_ips.db")
    }

    pub fn ufw_db_path(&self) -> PathBuf {
        self.db_root.join("ufw.db")
    }

    pub fn summary_db_path(&self) -> PathBuf {
        self.db_root.join("threats.db")
    }

    pub fn ledger_db_path(&self) -> PathBuf {
        self.db_root.join("defense.db")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.detector_interval_secs, 900);
        assert_eq!(config.correlation_interval_secs, 3600);
        assert_eq!(config.attack_flag_threshold, 2);
        assert_eq!(config.ids_ips.variant, IdsVariant::Snort);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/no/such/config.json"));
        assert_eq!(config.detector_interval_secs, 900);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(&path);
        assert_eq!(config.attack_flag_threshold, 2);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "detector_interval_secs": 60,
                "ids_ips": { "log_path": "/var/log/suricata/eve.json", "variant": "suricata" }
            }"#,
        )
        .unwrap();

        let config = Config::load(&path);
        assert_eq!(config.detector_interval_secs, 60);
        assert_eq!(config.correlation_interval_secs, 3600);
        assert_eq!(config.ids_ips.variant, IdsVariant::Suricata);
        // Per-source default threshold survives a partial source block
        assert_eq!(config.ids_ips.threshold, 5);
    }

    #[test]
    fn test_partial_source_block_keeps_that_sources_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "ufw": { "threshold": 20 } }"#).unwrap();

        let config = Config::load(&path);
        assert_eq!(config.ufw.threshold, 20);
        // The unspecified path fills in from the UFW defaults, not auth's
        assert_eq!(config.ufw.log_path, PathBuf::from("/var/log/ufw.log"));
        assert_eq!(config.auth.log_path, PathBuf::from("/var/log/auth.log"));
    }

    #[test]
    fn test_validate_clamps_out_of_range() {
        let mut config = Config::default();
        config.detector_interval_secs = 0;
        config.attack_flag_threshold = 7;
        config.validate();
        assert_eq!(config.detector_interval_secs, 900);
        assert_eq!(config.attack_flag_threshold, 2);
    }

    #[test]
    fn test_db_paths_share_root() {
        let mut config = Config::default();
        config.db_root = PathBuf::from("/tmp/ls-test");
        assert_eq!(config.auth_db_path(), PathBuf::from("/tmp/ls-test/auth.db"));
        assert_eq!(
            config.summary_db_path(),
            PathBuf::from("/tmp/ls-test/threats.db")
        );
        assert_eq!(
            config.ledger_db_path(),
            PathBuf::from("/tmp/ls-test/defense.db")
        );
    }
}
