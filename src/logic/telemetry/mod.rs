//! Telemetry Module
//!
//! Append-only audit trail for the detection-and-response pipeline:
//! detector rounds, correlation results and block outcomes, one JSON
//! object per line.
//!
//! ## Structure
//! - `event.rs` - SecurityEvent struct (immutable, timestamped)
//! - `recorder.rs` - Append-only JSONL writer (thread-safe)
//!
//! ## Usage
//! ```ignore
//! use crate::logic::telemetry::{self, SecurityEvent};
//!
//! // Initialize at daemon start
//! telemetry::init(None)?;
//!
//! // Record events throughout the pipeline
//! telemetry::record(SecurityEvent::ip_blocked("10.0.0.5"));
//!
//! // Shutdown at daemon exit
//! telemetry::shutdown();
//! ```

pub mod event;
pub mod recorder;

// Re-export main types and functions
pub use event::{get_session_id, EventType, SecurityEvent};

pub use recorder::{init, read_events, record, shutdown};
