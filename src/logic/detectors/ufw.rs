//! UFW Firewall Log Detector
//!
//! Counts kernel-logged UFW block events per source IP. Only `SRC=` is
//! required; `PROTO=` is recorded when present. UFW emits no classification,
//! so the `Unknown` sentinel is stored.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{open_log, Detector, DetectorError, Observation, SourceKind, UNKNOWN};

static SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SRC=(\d{1,3}(?:\.\d{1,3}){3})").unwrap());
static PROTO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"PROTO=(\w+)").unwrap());

pub struct UfwDetector {
    log_path: PathBuf,
    db_path: PathBuf,
    threshold: u64,
}

impl UfwDetector {
    pub fn new(log_path: PathBuf, db_path: PathBuf, threshold: u64) -> Self {
        Self {
            log_path,
            db_path,
            threshold,
        }
    }
}

impl Detector for UfwDetector {
    fn kind(&self) -> SourceKind {
        SourceKind::Ufw
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
            let Some(src) = SRC_RE.captures(&line) else {
                continue;
            };
            let protocol = PROTO_RE
                .captures(&line)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| UNKNOWN.to_string());
            let ip = src[1].to_string();

            observations
                .entry(ip)
                .or_insert_with(|| Observation {
                    count: 0,
                    classification: UNKNOWN.to_string(),
                    protocol,
                })
                .count += 1;
        }

        Ok(observations)
    }
}
