//! Threat Correlator
//!
//! Folds the three per-source alert tables into the unified threat summary.
//! Membership in a source's alert table counts as "flagged by that source"
//! regardless of that source's own per-IP status; an IP flagged by at least
//! `attack_flag_threshold` sources is classified `attack`, otherwise
//! `suspicious`. A source whose table cannot be read degrades to the empty
//! set and the cycle continues with the remaining sources.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::logic::config::Config;
use crate::logic::detectors::SourceKind;
use crate::logic::store::{self, Classification, StoreError, SummaryRow};

/// What one correlation cycle computed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationReport {
    pub total: usize,
    pub attacks: usize,
    pub suspicious: usize,
    /// Sources whose alert tables could not be read this cycle
    pub degraded_sources: Vec<SourceKind>,
}

pub struct Analyzer {
    auth_db: PathBuf,
    ids_db: PathBuf,
    ufw_db: PathBuf,
    summary_db: PathBuf,
    attack_flag_threshold: u32,
}

impl Analyzer {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auth_db: config.auth_db_path(),
            ids_db: config.ids_db_path(),
            ufw_db: config.ufw_db_path(),
            summary_db: config.summary_db_path(),
            attack_flag_threshold: config.attack_flag_threshold,
        }
    }

    /// Read one source's IP presence set, degrading to empty on failure.
    fn fetch_ips(
        &self,
        kind: SourceKind,
        db_path: &PathBuf,
        degraded: &mut Vec<SourceKind>,
    ) -> BTreeSet<String> {
        match store::alert_ips(db_path) {
            Ok(ips) => ips,
            Err(e) => {
                log::error!(
                    "{} alert table unreadable ({}), correlating without it",
                    kind.as_str(),
                    e
                );
                degraded.push(kind);
                BTreeSet::new()
            }
        }
    }

    /// Run one correlation cycle: rebuild every row of the threat summary
    /// from the current per-source IP sets. Re-running with unchanged
    /// tables produces an identical summary.
    pub fn analyze(&self) -> Result<CorrelationReport, StoreError> {
        let mut degraded = Vec::new();
        let auth_ips = self.fetch_ips(SourceKind::Auth, &self.auth_db, &mut degraded);
        let ids_ips = self.fetch_ips(SourceKind::IdsIps, &self.ids_db, &mut degraded);
        let ufw_ips = self.fetch_ips(SourceKind::Ufw, &self.ufw_db, &mut degraded);

        let all_ips: BTreeSet<&String> =
            auth_ips.iter().chain(ids_ips.iter()).chain(ufw_ips.iter()).collect();

        let conn = store::open_db(&self.summary_db)?;
        store::init_summary_table(&conn)?;

        let mut attacks = 0usize;
        let mut suspicious = 0usize;

        for ip in &all_ips {
            let row = SummaryRow {
                ip: (*ip).clone(),
                auth_flag: auth_ips.contains(*ip),
                ids_flag: ids_ips.contains(*ip),
                ufw_flag: ufw_ips.contains(*ip),
                classification: Classification::Suspicious,
            };
            let classification = if row.flag_count() >= self.attack_flag_threshold {
                Classification::Attack
            } else {
                Classification::Suspicious
            };
            match classification {
                Classification::Attack => attacks += 1,
                Classification::Suspicious => suspicious += 1,
            }
            store::upsert_summary(
                &conn,
                &SummaryRow {
                    classification,
                    ..row
                },
            )?;
        }

        let report = CorrelationReport {
            total: all_ips.len(),
            attacks,
            suspicious,
            degraded_sources: degraded,
        };
        log::info!(
            "Threat summary updated: {} IP(s), {} attack, {} suspicious",
            report.total,
            report.attacks,
            report.suspicious
        );
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
