//! Security Event Types
//!
//! Immutable, timestamped audit events. Events are append-only and never
//! modified after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// EVENT TYPES
// ============================================================================

/// Categories of audit events. The wire form is snake_case, matching
/// `as_str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Daemon started
    SystemStart,
    /// Daemon stopped
    SystemStop,
    /// One source detector completed a scan cycle
    DetectorRun,
    /// One correlation cycle rewrote the threat summary
    CorrelationCompleted,
    /// An IP was blocked and recorded
    IpBlocked,
    /// A block attempt failed; the IP will be retried
    BlockFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SystemStart => "system_start",
            EventType::SystemStop => "system_stop",
            EventType::DetectorRun => "detector_run",
            EventType::CorrelationCompleted => "correlation_completed",
            EventType::IpBlocked => "ip_blocked",
            EventType::BlockFailed => "block_failed",
        }
    }
}

// ============================================================================
// SECURITY EVENT
// ============================================================================

/// Immutable audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique event ID
    pub id: String,
    /// When the event occurred (UTC)
    pub timestamp: DateTime<Utc>,
    /// Type of event
    pub event_type: EventType,
    /// Session ID (for correlating events in same daemon run)
    pub session_id: String,
    /// Source detector involved (if applicable)
    pub source: Option<String>,
    /// IP address involved (if applicable)
    pub ip: Option<String>,
    /// Additional metadata
    pub metadata: Option<serde_json::Value>,
    /// Human-readable description
    pub description: String,
}

impl SecurityEvent {
    pub fn new(event_type: EventType, description: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            session_id: get_session_id(),
            source: None,
            ip: None,
            metadata: None,
            description: description.to_string(),
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = Some(ip.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Convert to JSONL line (for append-only log)
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ============================================================================
// SESSION ID
// ============================================================================

use std::sync::OnceLock;

static SESSION_ID: OnceLock<String> = OnceLock::new();

/// Get the current session ID (generated once per daemon run)
pub fn get_session_id() -> String {
    SESSION_ID
        .get_or_init(|| Uuid::new_v4().to_string())
        .clone()
}

// ============================================================================
// CONVENIENCE CONSTRUCTORS
// ============================================================================

impl SecurityEvent {
    /// One detector finished a scan cycle
    pub fn detector_run(source: &str, ip_count: usize, duration_ms: u64) -> Self {
        Self::new(
            EventType::DetectorRun,
            &format!("{} detector stored {} source IP(s)", source, ip_count),
        )
        .with_source(source)
        .with_metadata(serde_json::json!({
            "ip_count": ip_count,
            "duration_ms": duration_ms,
        }))
    }

    /// One correlation cycle completed
    pub fn correlation_completed(total: usize, attacks: usize, suspicious: usize) -> Self {
        Self::new(
            EventType::CorrelationCompleted,
            &format!(
                "Correlated {} IP(s): {} attack, {} suspicious",
                total, attacks, suspicious
            ),
        )
        .with_metadata(serde_json::json!({
            "total": total,
            "attacks": attacks,
            "suspicious": suspicious,
        }))
    }

    /// An IP was blocked successfully
    pub fn ip_blocked(ip: &str) -> Self {
        Self::new(EventType::IpBlocked, &format!("Blocked {}", ip)).with_ip(ip)
    }

    /// A block attempt failed
    pub fn block_failed(ip: &str, error: &dyn std::fmt::Display) -> Self {
        Self::new(
            EventType::BlockFailed,
            &format!("Failed to block {}: {}", ip, error),
        )
        .with_ip(ip)
        .with_metadata(serde_json::json!({ "error": error.to_string() }))
    }

    /// Daemon start event
    pub fn system_start(version: &str) -> Self {
        Self::new(
            EventType::SystemStart,
            &format!("LogShield started (v{})", version),
        )
        .with_metadata(serde_json::json!({
            "version": version,
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }))
    }

    /// Daemon stop event
    pub fn system_stop() -> Self {
        Self::new(EventType::SystemStop, "LogShield stopped")
    }
}

// ============================================================================
// TESTS
// ============================================================================
