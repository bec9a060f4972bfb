//! Source Detectors
//!
//! One detector per monitored subsystem (auth log, IDS/IPS, UFW firewall).
//! Each detector re-reads its entire log file every cycle and normalizes it
//! into per-source-IP alert counts, persisted into its own alert table.
//! Detectors have no cross-source knowledge; correlation happens later.

pub mod auth;
pub mod ids_ips;
pub mod ufw;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::logic::store::{self, AlertRecord, AlertStatus, StoreError};

pub use auth::AuthDetector;
pub use ids_ips::{IdsIpsDetector, IdsVariant};
pub use ufw::UfwDetector;

/// Sentinel for metadata a log line did not carry
pub const UNKNOWN: &str = "Unknown";

// ============================================================================
// SOURCE KINDS
// ============================================================================

/// The monitored subsystems. Closed set: the threat summary carries one
/// flag column per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Auth,
    IdsIps,
    Ufw,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Auth => "auth",
            SourceKind::IdsIps => "ids_ips",
            SourceKind::Ufw => "ufw",
        }
    }
}

// ============================================================================
// OBSERVATIONS
// ============================================================================

/// What one scan learned about one source IP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Full-file recount of matching lines, not a running total
    pub count: u64,
    pub classification: String,
    pub protocol: String,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum DetectorError {
    /// Reading the log file failed mid-scan. A missing file is not an
    /// error; it yields an empty scan.
    Io(std::io::Error),
    /// Persisting the scan into the detector's alert table failed.
    Store(StoreError),
}

impl std::fmt::Display for DetectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorError::Io(e) => write!(f, "log read error: {}", e),
            DetectorError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for DetectorError {}

impl From<std::io::Error> for DetectorError {
    fn from(e: std::io::Error) -> Self {
        DetectorError::Io(e)
    }
}

impl From<StoreError> for DetectorError {
    fn from(e: StoreError) -> Self {
        DetectorError::Store(e)
    }
}

// ============================================================================
// DETECTOR TRAIT
// ============================================================================

/// Capability interface shared by all source detectors: scan the log,
/// yield normalized per-IP observations. The scheduler holds a homogeneous
/// collection of these.
pub trait Detector: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn log_path(&self) -> &Path;

    /// Per-source attack threshold: `count > threshold` marks the row
    /// `attack`, otherwise `normal`.
    fn threshold(&self) -> u64;

    /// The detector's own database. No other component writes it.
    fn db_path(&self) -> &Path;

    /// Full-file scan. Missing log file yields an empty map, never an error.
    fn scan(&self) -> Result<BTreeMap<String, Observation>, DetectorError>;
}

/// Open the log for a full-file scan. `Ok(None)` when the file is absent.
pub(crate) fn open_log(path: &Path) -> std::io::Result<Option<BufReader<File>>> {
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(BufReader::new(File::open(path)?)))
}

/// Run one detector cycle: scan, derive per-row status from the threshold,
/// and upsert every observed IP into the detector's alert table. Returns
/// the number of distinct source IPs stored.
pub fn run(detector: &dyn Detector) -> Result<usize, DetectorError> {
    let observations = detector.scan()?;

    // The table exists after every run, even an empty one, so downstream
    // readers can tell a quiet source from an unreadable one.
    let conn = store::open_db(detector.db_path())?;
    store::init_alert_table(&conn)?;

    if observations.is_empty() {
        log::info!(
            "{} detector: no alerts found in {}",
            detector.kind().as_str(),
            detector.log_path().display()
        );
        return Ok(0);
    }

    for (ip, obs) in &observations {
        let status = if obs.count > detector.threshold() {
            AlertStatus::Attack
        } else {
            AlertStatus::Normal
        };
        store::upsert_alert(
            &conn,
            &AlertRecord {
                ip: ip.clone(),
                count: obs.count,
                classification: obs.classification.clone(),
                protocol: obs.protocol.clone(),
                status,
            },
        )?;
    }

    log::info!(
        "{} detector: stored {} source IP(s)",
        detector.kind().as_str(),
        observations.len()
    );
    Ok(observations.len())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_run_derives_status_from_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("auth.log");
        let db_path = temp_dir.path().join("auth.db");

        let mut file = std::fs::File::create(&log_path).unwrap();
        for _ in 0..4 {
            writeln!(
                file,
                "Jan 10 12:00:01 host sshd[1]: Failed password for root from 10.0.0.1 port 22 ssh2"
            )
            .unwrap();
        }
        writeln!(
            file,
            "Jan 10 12:00:05 host sshd[1]: Failed password for admin from 10.0.0.2 port 22 ssh2"
        )
        .unwrap();

        let detector = AuthDetector::new(log_path, db_path.clone(), 3);
        let stored = run(&detector).unwrap();
        assert_eq!(stored, 2);

        let conn = store::open_db(&db_path).unwrap();
        let records = store::read_alerts(&conn).unwrap();
        assert_eq!(records[0].ip, "10.0.0.1");
        assert_eq!(records[0].status, AlertStatus::Attack);
        assert_eq!(records[1].ip, "10.0.0.2");
        assert_eq!(records[1].status, AlertStatus::Normal);
    }

    #[test]
    fn test_run_missing_log_creates_an_empty_table() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("auth.db");

        let detector = AuthDetector::new(
            temp_dir.path().join("no-such.log"),
            db_path.clone(),
            3,
        );
        let stored = run(&detector).unwrap();
        assert_eq!(stored, 0);
        // The table is created even without alerts
        assert!(store::alert_ips(&db_path).unwrap().is_empty());
    }

    #[test]
    fn test_rescan_replaces_counts() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("auth.log");
        let db_path = temp_dir.path().join("auth.db");

        std::fs::write(
            &log_path,
            "Jan 10 host sshd: Failed password for root from 10.0.0.1 port 22 ssh2\n",
        )
        .unwrap();
        let detector = AuthDetector::new(log_path.clone(), db_path.clone(), 5);
        run(&detector).unwrap();

        // Second cycle sees a longer file; the count is the new full recount
        let mut file = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
        for _ in 0..2 {
            writeln!(
                file,
                "Jan 10 host sshd: Failed password for root from 10.0.0.1 port 22 ssh2"
            )
            .unwrap();
        }
        run(&detector).unwrap();

        let conn = store::open_db(&db_path).unwrap();
        let records = store::read_alerts(&conn).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].count, 3);
    }
}
