//! Logic Module - Detection & Response Pipeline
//!
//! Contains the pipeline stages: Detectors, Analyzer, Defense, Scheduler.
//!
//! ## Architecture
//! - `detectors/` - Per-source log scanners (auth, IDS/IPS, UFW)
//! - `analyzer` - Cross-source correlation into the threat summary
//! - `defense` - Firewall response against correlated attackers
//! - `scheduler` - Dual-cadence control loop
//! - `store` - SQLite persistence (alerts, summary, block ledger)
//! - `telemetry` - JSONL audit trail

pub mod analyzer;
pub mod config;
pub mod defense;
pub mod detectors;
pub mod scheduler;
pub mod store;
pub mod telemetry;
