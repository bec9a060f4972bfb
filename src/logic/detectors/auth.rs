//! Authentication Log Detector
//!
//! Counts failed SSH logins per source IP from the system auth log
//! (`/var/log/auth.log` on Debian-family hosts). A line contributes when it
//! contains "Failed password for" and carries a `from <addr>` capture;
//! both IPv4 and IPv6 sources are accepted.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{open_log, Detector, DetectorError, Observation, SourceKind};

static FROM_ADDR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"from ([\d\.]+|[a-fA-F0-9:]+)").unwrap());

pub struct AuthDetector {
    log_path: PathBuf,
    db_path: PathBuf,
    threshold: u64,
}

impl AuthDetector {
    pub fn new(log_path: PathBuf, db_path: PathBuf, threshold: u64) -> Self {
        Self {
            log_path,
            db_path,
            threshold,
        }
    }
}

impl Detector for AuthDetector {
    fn kind(&self) -> SourceKind {
        SourceKind::Auth
    }

    fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn threshold(&self) -> u64 {
        self.threshold
    }

    fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn scan(&self) -> Result<BTreeMap<String, Observation>, DetectorError> {
        let mut observations: BTreeMap<String, Observation> = BTreeMap::new();

        let Some(reader) = open_log(&self.log_path)? else {
            return Ok(observations);
        };

        for line in reader.lines() {
            let line = line?;
            if !line.contains("Failed password for") {
                continue;
            }
            if let Some(caps) = FROM_ADDR_RE.captures(&line) {
                let ip = caps[1].to_string();
                observations
                    .entry(ip)
                    .or_insert_with(|| Observation {
                        count: 0,
                        classification: "Failed Password".to_string(),
                        protocol: "ssh".to_string(),
                    })
                    .count += 1;
            }
        }

        Ok(observations)
    }
}
