//! Defense Responder
//!
//! Diffs the threat summary's `attack` IPs against the block ledger and
//! installs a `ufw deny` rule for each new attacker, recording every outcome.
//! Once an IP is recorded `blocked` it is never re-submitted; a
//! `block_failed` entry is retried on the next cycle. One IP failing never
//! aborts the remaining candidates.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;

use chrono::Utc;

use crate::logic::config::Config;
use crate::logic::store::{self, BlockStatus, StoreError};
use crate::logic::telemetry::{self, SecurityEvent};

// ============================================================================
// BLOCK ACTION
// ============================================================================

/// Block action failure
#[derive(Debug, Clone)]
pub enum BlockError {
    /// The firewall command ran and reported failure
    CommandFailed { exit_code: i32, stderr: String },
    /// The firewall command could not be spawned at all
    Spawn(String),
}

impl std::fmt::Display for BlockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockError::CommandFailed { exit_code, stderr } => {
                write!(f, "command failed ({}): {}", exit_code, stderr)
            }
            BlockError::Spawn(e) => write!(f, "command spawn error: {}", e),
        }
    }
}

impl std::error::Error for BlockError {}

/// The privileged external block operation. Behind a trait so the responder
/// can be exercised without touching the host firewall.
pub trait BlockAction: Send + Sync {
    fn block(&self, ip: &str) -> Result<(), BlockError>;
}

/// Production block action: `ufw deny from <ip>`. Issuing the same rule
/// twice is safe at the UFW layer.
pub struct UfwBlock;

impl BlockAction for UfwBlock {
    fn block(&self, ip: &str) -> Result<(), BlockError> {
        let output = Command::new("ufw")
            .args(["deny", "from", ip])
            .output()
            .map_err(|e| BlockError::Spawn(e.to_string()))?;

        if output.status.success() {
            log::info!("UFW rule added: deny from {}", ip);
            Ok(())
        } else {
            Err(BlockError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

// ============================================================================
// RESPONDER
// ============================================================================

/// What one responder cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefenseReport {
    pub candidates: usize,
    pub blocked: usize,
    pub failed: usize,
}

pub struct Responder {
    summary_db: PathBuf,
    ledger_db: PathBuf,
    action: Box<dyn BlockAction>,
}

impl Responder {
    pub fn new(summary_db: PathBuf, ledger_db: PathBuf, action: Box<dyn BlockAction>) -> Self {
        Self {
            summary_db,
            ledger_db,
            action,
        }
    }

    pub fn from_config(config: &Config, action: Box<dyn BlockAction>) -> Self {
        Self::new(config.summary_db_path(), config.ledger_db_path(), action)
    }

    /// IPs classified `attack` in the threat summary. An unreadable summary
    /// (no correlation cycle has run yet) degrades to the empty set.
    fn attack_ips(&self) -> BTreeSet<String> {
        let result = store::open_db(&self.summary_db)
            .and_then(|conn| store::attack_ips(&conn));
        match result {
            Ok(ips) => ips,
            Err(e) => {
                log::error!("Threat summary unreadable ({}), nothing to defend", e);
                BTreeSet::new()
            }
        }
    }

    /// Run one responder cycle.
    pub fn defend(&self) -> Result<DefenseReport, StoreError> {
        let attack_ips = self.attack_ips();

        let conn = store::open_db(&self.ledger_db)?;
        store::init_ledger_table(&conn)?;
        let blocked_ips = store::blocked_ips(&conn)?;

        let candidates: Vec<&String> = attack_ips.difference(&blocked_ips).collect();
        if candidates.is_empty() {
            log::info!("No new IPs to block");
            return Ok(DefenseReport::default());
        }

        let mut report = DefenseReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        for ip in candidates {
            let (status, event) = match self.action.block(ip) {
                Ok(()) => {
                    log::info!("IP {} blocked and recorded", ip);
                    report.blocked += 1;
                    (BlockStatus::Blocked, SecurityEvent::ip_blocked(ip))
                }
                Err(e) => {
                    log::error!("Failed to block IP {}: {}", ip, e);
                    report.failed += 1;
                    (BlockStatus::BlockFailed, SecurityEvent::block_failed(ip, &e))
                }
            };

            // A ledger write failure aborts only this row, not the cycle
            if let Err(e) =
                store::record_block(&conn, ip, &Utc::now().to_rfc3339(), status)
            {
                log::error!("Failed to record block outcome for {}: {}", ip, e);
            }
            telemetry::record(event);
        }

        log::info!(
            "Defense cycle complete: {} candidate(s), {} blocked, {} failed",
            report.candidates,
            report.blocked,
            report.failed
        );
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::store::{Classification, SummaryRow};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Scripted block action: fails for IPs in the deny-list, records
    /// every invocation.
    struct ScriptedBlock {
        calls: Arc<Mutex<Vec<String>>>,
        fail_for: Vec<String>,
    }

    impl BlockAction for ScriptedBlock {
        fn block(&self, ip: &str) -> Result<(), BlockError> {
            self.calls.lock().push(ip.to_string());
            if self.fail_for.iter().any(|f| f == ip) {
                Err(BlockError::CommandFailed {
                    exit_code: 1,
                    stderr: "ERROR: Operation not permitted".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn seed_summary(db_path: &std::path::Path, rows: &[(&str, Classification)]) {
        let conn = store::open_db(db_path).unwrap();
        store::init_summary_table(&conn).unwrap();
        for (ip, classification) in rows {
            store::upsert_summary(
                &conn,
                &SummaryRow {
                    ip: ip.to_string(),
                    auth_flag: true,
                    ids_flag: true,
                    ufw_flag: false,
                    classification: *classification,
                },
            )
            .unwrap();
        }
    }

    fn responder(
        temp_dir: &TempDir,
        fail_for: &[&str],
    ) -> (Responder, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let action = ScriptedBlock {
            calls: Arc::clone(&calls),
            fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
        };
        let responder = Responder::new(
            temp_dir.path().join("threats.db"),
            temp_dir.path().join("defense.db"),
            Box::new(action),
        );
        (responder, calls)
    }

    #[test]
    fn test_blocks_new_attack_ips_once() {
        let temp_dir = TempDir::new().unwrap();
        seed_summary(
            &temp_dir.path().join("threats.db"),
            &[
                ("10.0.0.5", Classification::Attack),
                ("10.0.0.6", Classification::Suspicious),
            ],
        );
        let (responder, calls) = responder(&temp_dir, &[]);

        let report = responder.defend().unwrap();
        assert_eq!(report, DefenseReport { candidates: 1, blocked: 1, failed: 0 });
        assert_eq!(*calls.lock(), vec!["10.0.0.5"]);

        // Second cycle: the IP is in the ledger, no further invocation
        let report = responder.defend().unwrap();
        assert_eq!(report, DefenseReport::default());
        assert_eq!(calls.lock().len(), 1);

        let conn = store::open_db(&temp_dir.path().join("defense.db")).unwrap();
        let ledger = store::read_ledger(&conn).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].status, BlockStatus::Blocked);
    }

    #[test]
    fn test_failure_recorded_and_retried() {
        // Block action fails for 10.0.0.9
        let temp_dir = TempDir::new().unwrap();
        seed_summary(
            &temp_dir.path().join("threats.db"),
            &[("10.0.0.9", Classification::Attack)],
        );
        let (responder, calls) = responder(&temp_dir, &["10.0.0.9"]);

        let report = responder.defend().unwrap();
        assert_eq!(report, DefenseReport { candidates: 1, blocked: 0, failed: 1 });

        let conn = store::open_db(&temp_dir.path().join("defense.db")).unwrap();
        let ledger = store::read_ledger(&conn).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].ip, "10.0.0.9");
        assert_eq!(ledger[0].status, BlockStatus::BlockFailed);
        drop(conn);

        // A failed attempt is retried the next cycle
        let report = responder.defend().unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(calls.lock().len(), 2);
    }

    #[test]
    fn test_one_failure_does_not_abort_the_rest() {
        let temp_dir = TempDir::new().unwrap();
        seed_summary(
            &temp_dir.path().join("threats.db"),
            &[
                ("10.0.0.1", Classification::Attack),
                ("10.0.0.2", Classification::Attack),
                ("10.0.0.3", Classification::Attack),
            ],
        );
        let (responder, calls) = responder(&temp_dir, &["10.0.0.2"]);

        let report = responder.defend().unwrap();
        assert_eq!(report, DefenseReport { candidates: 3, blocked: 2, failed: 1 });
        assert_eq!(calls.lock().len(), 3);
    }

    #[test]
    fn test_empty_candidate_set_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        seed_summary(
            &temp_dir.path().join("threats.db"),
            &[("10.0.0.6", Classification::Suspicious)],
        );
        let (responder, calls) = responder(&temp_dir, &[]);

        let report = responder.defend().unwrap();
        assert_eq!(report, DefenseReport::default());
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_missing_summary_degrades_to_noop() {
        let temp_dir = TempDir::new().unwrap();
        let (responder, calls) = responder(&temp_dir, &[]);

        let report = responder.defend().unwrap();
        assert_eq!(report, DefenseReport::default());
        assert!(calls.lock().is_empty());
    }
}
