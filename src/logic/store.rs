//! Detection Store
//!
//! SQLite access layer for the three per-source alert tables, the threat
//! summary and the block ledger. Each table has exactly one logical writer
//! (its detector, the correlator, the responder), so writes never race
//! across components. All writes are row-level upserts.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};

// ============================================================================
// ERRORS
// ============================================================================

/// Store access error
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite failure
    Sqlite(rusqlite::Error),
    /// Filesystem failure (creating the database directory)
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {}", e),
            StoreError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

// ============================================================================
// ROW TYPES
// ============================================================================

/// Per-IP alert status within one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Normal,
    Attack,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Normal => "normal",
            AlertStatus::Attack => "attack",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "attack" => AlertStatus::Attack,
            _ => AlertStatus::Normal,
        }
    }
}

/// One normalized alert row, owned by its source detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    pub ip: String,
    pub count: u64,
    pub classification: String,
    pub protocol: String,
    pub status: AlertStatus,
}

/// Cross-source verdict for an IP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Suspicious,
    Attack,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Suspicious => "suspicious",
            Classification::Attack => "attack",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "attack" => Classification::Attack,
            _ => Classification::Suspicious,
        }
    }
}

/// One threat summary row, owned by the correlator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub ip: String,
    pub auth_flag: bool,
    pub ids_flag: bool,
    pub ufw_flag: bool,
    pub classification: Classification,
}

impl SummaryRow {
    /// Number of sources flagging this IP
    pub fn flag_count(&self) -> u32 {
        self.auth_flag as u32 + self.ids_flag as u32 + self.ufw_flag as u32
    }
}

/// Outcome of a block attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Blocked,
    BlockFailed,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Blocked => "blocked",
            BlockStatus::BlockFailed => "block_failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "blocked" => BlockStatus::Blocked,
            _ => BlockStatus::BlockFailed,
        }
    }
}

/// One block ledger row, owned by the responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub ip: String,
    pub blocked_at: String,
    pub status: BlockStatus,
}

// ============================================================================
// CONNECTION
// ============================================================================

/// Open (or create) a database, creating its parent directory first.
pub fn open_db(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Connection::open(path)?)
}

// ============================================================================
// ALERT TABLES (one per source, written by that source's detector)
// ============================================================================

pub fn init_alert_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS alerts (
            ip TEXT PRIMARY KEY,
            count INTEGER NOT NULL,
            classification TEXT NOT NULL,
            protocol TEXT NOT NULL,
            status TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Upsert one alert row. Replace-not-add: `count` is always the latest
/// full-file recount for this IP.
pub fn upsert_alert(conn: &Connection, record: &AlertRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO alerts (ip, count, classification, protocol, status)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(ip) DO UPDATE SET
            count = excluded.count,
            classification = excluded.classification,
            protocol = excluded.protocol,
            status = excluded.status",
        params![
            record.ip,
            record.count as i64,
            record.classification,
            record.protocol,
            record.status.as_str()
        ],
    )?;
    Ok(())
}

/// Raw IP presence set of one alert table. Not filtered by per-IP status:
/// membership alone counts as "flagged by this source".
pub fn alert_ips(db_path: &Path) -> Result<BTreeSet<String>, StoreError> {
    let conn = open_db(db_path)?;
    let mut stmt = conn.prepare("SELECT ip FROM alerts")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ips = BTreeSet::new();
    for ip in rows {
        ips.insert(ip?);
    }
    Ok(ips)
}

/// Read all alert rows, ordered by IP.
pub fn read_alerts(conn: &Connection) -> Result<Vec<AlertRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT ip, count, classification, protocol, status FROM alerts ORDER BY ip",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(AlertRecord {
            ip: row.get(0)?,
            count: row.get::<_, i64>(1)? as u64,
            classification: row.get(2)?,
            protocol: row.get(3)?,
            status: AlertStatus::from_str(&row.get::<_, String>(4)?),
        })
    })?;
    let mut records = Vec::new();
    for record in rows {
        records.push(record?);
    }
    Ok(records)
}

// ============================================================================
// THREAT SUMMARY (written by the correlator)
// ============================================================================

pub fn init_summary_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS threat_summary (
            ip TEXT PRIMARY KEY,
            auth_flag INTEGER NOT NULL,
            ids_flag INTEGER NOT NULL,
            ufw_flag INTEGER NOT NULL,
            classification TEXT NOT NULL
        );",
    )?;
    Ok(())
}

pub fn upsert_summary(conn: &Connection, row: &SummaryRow) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO threat_summary
            (ip, auth_flag, ids_flag, ufw_flag, classification)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.ip,
            row.auth_flag as i64,
            row.ids_flag as i64,
            row.ufw_flag as i64,
            row.classification.as_str()
        ],
    )?;
    Ok(())
}

/// IPs currently classified `attack` in the threat summary.
pub fn attack_ips(conn: &Connection) -> Result<BTreeSet<String>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT ip FROM threat_summary WHERE classification = 'attack'")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ips = BTreeSet::new();
    for ip in rows {
        ips.insert(ip?);
    }
    Ok(ips)
}

/// Read all summary rows, ordered by IP.
pub fn read_summary(conn: &Connection) -> Result<Vec<SummaryRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT ip, auth_flag, ids_flag, ufw_flag, classification
         FROM threat_summary ORDER BY ip",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SummaryRow {
            ip: row.get(0)?,
            auth_flag: row.get::<_, i64>(1)? != 0,
            ids_flag: row.get::<_, i64>(2)? != 0,
            ufw_flag: row.get::<_, i64>(3)? != 0,
            classification: Classification::from_str(&row.get::<_, String>(4)?),
        })
    })?;
    let mut summary = Vec::new();
    for row in rows {
        summary.push(row?);
    }
    Ok(summary)
}

// ============================================================================
// BLOCK LEDGER (written by the responder)
// ============================================================================

pub fn init_ledger_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS blocked_ips (
            ip TEXT PRIMARY KEY,
            blocked_at TIMESTAMP NOT NULL,
            status TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// IPs already successfully blocked. A `block_failed` row does not count:
/// failed attempts are retried on the next responder cycle.
pub fn blocked_ips(conn: &Connection) -> Result<BTreeSet<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT ip FROM blocked_ips WHERE status = 'blocked'")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ips = BTreeSet::new();
    for ip in rows {
        ips.insert(ip?);
    }
    Ok(ips)
}

/// Record a block outcome. Upsert so a later success replaces an earlier
/// `block_failed` row; an IP never has more than one ledger row.
pub fn record_block(
    conn: &Connection,
    ip: &str,
    blocked_at: &str,
    status: BlockStatus,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO blocked_ips (ip, blocked_at, status)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(ip) DO UPDATE SET
            blocked_at = excluded.blocked_at,
            status = excluded.status",
        params![ip, blocked_at, status.as_str()],
    )?;
    Ok(())
}

/// Read the full ledger, ordered by IP.
pub fn read_ledger(conn: &Connection) -> Result<Vec<LedgerEntry>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT ip, blocked_at, status FROM blocked_ips ORDER BY ip")?;
    let rows = stmt.query_map([], |row| {
        Ok(LedgerEntry {
            ip: row.get(0)?,
            blocked_at: row.get(1)?,
            status: BlockStatus::from_str(&row.get::<_, String>(2)?),
        })
    })?;
    let mut entries = Vec::new();
    for entry in rows {
        entries.push(entry?);
    }
    Ok(entries)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn alert(ip: &str, count: u64, status: AlertStatus) -> AlertRecord {
        AlertRecord {
            ip: ip.to_string(),
            count,
            classification: "Failed Password".to_string(),
            protocol: "ssh".to_string(),
            status,
        }
    }

    #[test]
    fn test_open_db_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("db").join("auth.db");
        let conn = open_db(&path).unwrap();
        init_alert_table(&conn).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_alert_upsert_replaces_count() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth.db");
        let conn = open_db(&path).unwrap();
        init_alert_table(&conn).unwrap();

        upsert_alert(&conn, &alert("10.0.0.1", 3, AlertStatus::Normal)).unwrap();
        upsert_alert(&conn, &alert("10.0.0.1", 12, AlertStatus::Attack)).unwrap();

        let records = read_alerts(&conn).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].count, 12);
        assert_eq!(records[0].status, AlertStatus::Attack);
    }

    #[test]
    fn test_alert_ips_ignores_status() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth.db");
        let conn = open_db(&path).unwrap();
        init_alert_table(&conn).unwrap();

        upsert_alert(&conn, &alert("10.0.0.1", 1, AlertStatus::Normal)).unwrap();
        upsert_alert(&conn, &alert("10.0.0.2", 99, AlertStatus::Attack)).unwrap();
        drop(conn);

        let ips = alert_ips(&path).unwrap();
        assert_eq!(ips.len(), 2);
        assert!(ips.contains("10.0.0.1"));
        assert!(ips.contains("10.0.0.2"));
    }

    #[test]
    fn test_summary_insert_or_replace() {
        let temp_dir = TempDir::new().unwrap();
        let conn = open_db(&temp_dir.path().join("threats.db")).unwrap();
        init_summary_table(&conn).unwrap();

        let row = SummaryRow {
            ip: "10.0.0.5".to_string(),
            auth_flag: true,
            ids_flag: false,
            ufw_flag: true,
            classification: Classification::Attack,
        };
        upsert_summary(&conn, &row).unwrap();
        upsert_summary(&conn, &row).unwrap();

        let summary = read_summary(&conn).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0], row);
        assert_eq!(summary[0].flag_count(), 2);
    }

    #[test]
    fn test_attack_ips_filters_classification() {
        let temp_dir = TempDir::new().unwrap();
        let conn = open_db(&temp_dir.path().join("threats.db")).unwrap();
        init_summary_table(&conn).unwrap();

        upsert_summary(
            &conn,
            &SummaryRow {
                ip: "10.0.0.5".to_string(),
                auth_flag: true,
                ids_flag: true,
                ufw_flag: false,
                classification: Classification::Attack,
            },
        )
        .unwrap();
        upsert_summary(
            &conn,
            &SummaryRow {
                ip: "10.0.0.6".to_string(),
                auth_flag: true,
                ids_flag: false,
                ufw_flag: false,
                classification: Classification::Suspicious,
            },
        )
        .unwrap();

        let ips = attack_ips(&conn).unwrap();
        assert_eq!(ips.len(), 1);
        assert!(ips.contains("10.0.0.5"));
    }

    #[test]
    fn test_ledger_failed_then_blocked() {
        let temp_dir = TempDir::new().unwrap();
        let conn = open_db(&temp_dir.path().join("defense.db")).unwrap();
        init_ledger_table(&conn).unwrap();

        record_block(&conn, "10.0.0.9", "2026-01-01T00:00:00Z", BlockStatus::BlockFailed)
            .unwrap();
        assert!(blocked_ips(&conn).unwrap().is_empty());

        record_block(&conn, "10.0.0.9", "2026-01-01T01:00:00Z", BlockStatus::Blocked)
            .unwrap();
        let blocked = blocked_ips(&conn).unwrap();
        assert!(blocked.contains("10.0.0.9"));

        // Still a single row per IP
        let entries = read_ledger(&conn).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, BlockStatus::Blocked);
    }

    #[test]
    fn test_alert_ips_missing_table_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.db");
        // Database exists but the alerts table was never created
        drop(open_db(&path).unwrap());
        assert!(alert_ips(&path).is_err());
    }
}
