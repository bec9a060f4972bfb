//! IDS/IPS Alert Detector
//!
//! Two format variants behind one detector, selected by configuration:
//!
//! - **Snort** fast-alert text. A line counts only when classification,
//!   protocol and source IP all match; partially-matched lines are dropped.
//! - **Suricata**. Each line is first tried as EVE JSON (needs an `alert`
//!   object and `src_ip`); lines that are not JSON fall back to text parsing,
//!   which needs only a `[A.B.C.D]` source and uses the `Unknown` sentinel
//!   for the rest.
//!
//! Within one scan the first-seen classification/protocol wins for an IP.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{open_log, Detector, DetectorError, Observation, SourceKind, UNKNOWN};

static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[Classification: (.*?)\]").unwrap());
static PROTO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());
static SNORT_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{.*?\}\s+(\d{1,3}(?:\.\d{1,3}){3}):\d+\s+->").unwrap());
static SURICATA_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,3}(?:\.\d{1,3}){3})\]").unwrap());

/// IDS/IPS log format variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdsVariant {
    Snort,
    Suricata,
}

impl Default for IdsVariant {
    fn default() -> Self {
        IdsVariant::Snort
    }
}

/// Subset of a Suricata EVE record this detector cares about
#[derive(Debug, Deserialize)]
struct EveRecord {
    alert: Option<EveAlert>,
    src_ip: Option<String>,
    proto: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EveAlert {
    category: Option<String>,
}

pub struct IdsIpsDetector {
    log_path: PathBuf,
    db_path: PathBuf,
    threshold: u64,
    variant: IdsVariant,
}

impl IdsIpsDetector {
    pub fn new(
        log_path: PathBuf,
        db_path: PathBuf,
        threshold: u64,
        variant: IdsVariant,
    ) -> Self {
        Self {
            log_path,
            db_path,
            threshold,
            variant,
        }
    }

    fn parse_snort_line(line: &str, observations: &mut BTreeMap<String, Observation>) {
        let class_match = CLASS_RE.captures(line);
        let proto_match = PROTO_RE.captures(line);
        let src_match = SNORT_SRC_RE.captures(line);

        // All three or nothing: a partial fast-alert line is dropped
        let (Some(class), Some(proto), Some(src)) = (class_match, proto_match, src_match)
        else {
            return;
        };

        let classification = class[1].trim().to_string();
        let protocol = proto[1].trim().to_string();
        let ip = src[1].to_string();

        observations
            .entry(ip)
            .or_insert_with(|| Observation {
                count: 0,
                classification,
                protocol,
            })
            .count += 1;
    }

    fn parse_suricata_line(line: &str, observations: &mut BTreeMap<String, Observation>) {
        match serde_json::from_str::<EveRecord>(line.trim()) {
            Ok(record) => {
                // EVE record without an alert block or source is not an
                // alert for us; it is skipped, not counted.
                let (Some(alert), Some(ip)) = (record.alert, record.src_ip) else {
                    return;
                };
                let classification =
                    alert.category.unwrap_or_else(|| UNKNOWN.to_string());
                let protocol = record.proto.unwrap_or_else(|| UNKNOWN.to_string());
                observations
                    .entry(ip)
                    .or_insert_with(|| Observation {
                        count: 0,
                        classification,
                        protocol,
                    })
                    .count += 1;
            }
            Err(_) => {
                // Text fallback: only the source IP is required
                let Some(src) = SURICATA_SRC_RE.captures(line) else {
                    return;
                };
                let classification = CLASS_RE
                    .captures(line)
                    .map(|c| c[1].trim().to_string())
                    .unwrap_or_else(|| UNKNOWN.to_string());
                let protocol = PROTO_RE
                    .captures(line)
                    .map(|c| c[1].trim().to_string())
                    .unwrap_or_else(|| UNKNOWN.to_string());
                let ip = src[1].to_string();
                observations
                    .entry(ip)
                    .or_insert_with(|| Observation {
                        count: 0,
                        classification,
                        protocol,
                    })
                    .count += 1;
            }
        }
    }
}

impl Detector for IdsIpsDetector {
    fn kind(&self) -> SourceKind {
        SourceKind::IdsIps
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
        let mut observations = BTreeMap::new();

        let Some(reader) = open_log(&self.log_path)? else {
            return Ok(observations);
        };

        for line in reader.lines() {
            let line = line?;
            match self.variant {
                IdsVariant::Snort => Self::parse_snort_line(&line, &mut observations),
                IdsVariant::Suricata => Self::parse_suricata_line(&line, &mut observations),
            }
        }

        Ok(observations)
    }
}
