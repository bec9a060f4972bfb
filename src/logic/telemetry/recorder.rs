//! Audit Event Recorder
//!
//! Append-only JSONL writer for audit events.
//! Thread-safe, persistent, and crash-resistant.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use parking_lot::Mutex;
use chrono::{Datelike, Timelike, Utc};

use super::event::SecurityEvent;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum file size before rotation (50 MB)
const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Default log directory name
const LOG_DIR: &str = "audit_logs";

/// Log file extension
const LOG_EXT: &str = ".jsonl";

// ============================================================================
// RECORDER STATE
// ============================================================================

/// Global recorder instance
static RECORDER: Mutex<Option<Recorder>> = Mutex::new(None);

// ============================================================================
// RECORDER
// ============================================================================

/// Append-only JSONL recorder
pub struct Recorder {
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_size: u64,
    base_dir: PathBuf,
}

impl Recorder {
    /// Create a new recorder in the given directory
    pub fn new(base_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        let (file_path, file) = Self::open_new_file(&base_dir)?;

        Ok(Self {
            writer: BufWriter::new(file),
            current_file: file_path,
            current_size: 0,
            base_dir,
        })
    }

    /// Open a new log file with timestamp
    fn open_new_file(base_dir: &PathBuf) -> std::io::Result<(PathBuf, File)> {
        let now = Utc::now();
        let filename = format!(
            "audit_{}_{:02}_{:02}_{:02}{:02}{:02}{}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            LOG_EXT
        );
        let file_path = base_dir.join(&filename);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        log::info!("Opened audit log: {:?}", file_path);
        Ok((file_path, file))
    }

    /// Record an audit event
    pub fn record(&mut self, event: &SecurityEvent) -> std::io::Result<()> {
        let line = event.to_jsonl();
        let bytes = line.as_bytes();

        // Check if rotation needed
        if self.current_size + bytes.len() as u64 > MAX_FILE_SIZE {
            self.rotate()?;
        }

        // Write line + newline
        self.writer.write_all(bytes)?;
        self.writer.write_all(b"\n")?;
        self.current_size += bytes.len() as u64 + 1;

        // Flush for durability
        self.writer.flush()?;

        Ok(())
    }

    /// Rotate to a new file
    fn rotate(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;

        let (new_path, new_file) = Self::open_new_file(&self.base_dir)?;
        self.writer = BufWriter::new(new_file);

        log::info!("Rotated from {:?} to {:?}", self.current_file, new_path);
        self.current_file = new_path;
        self.current_size = 0;

        Ok(())
    }

    /// Get current log file path
    pub fn current_file(&self) -> &PathBuf {
        &self.current_file
    }
}

// ============================================================================
// GLOBAL API
// ============================================================================

/// Initialize the global recorder
pub fn init(base_dir: Option<PathBuf>) -> std::io::Result<()> {
    let dir = base_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("logshield")
            .join(LOG_DIR)
    });

    let recorder = Recorder::new(dir)?;
    *RECORDER.lock() = Some(recorder);

    record(SecurityEvent::system_start(env!("CARGO_PKG_VERSION")));

    Ok(())
}

/// Record an audit event (global function)
pub fn record(event: SecurityEvent) {
    let mut guard = RECORDER.lock();
    if let Some(recorder) = guard.as_mut() {
        if let Err(e) = recorder.record(&event) {
            log::error!(
                "Failed to record {} audit event: {}",
                event.event_type.as_str(),
                e
            );
        }
    } else {
        // Recorder not initialized, just log
        log::debug!(
            "Audit recorder not initialized, {} event dropped: {}",
            event.event_type.as_str(),
            event.description
        );
    }
}

/// Flush and close the recorder
pub fn shutdown() {
    let mut guard = RECORDER.lock();
    if let Some(mut recorder) = guard.take() {
        let _ = recorder.record(&SecurityEvent::system_stop());
        let _ = recorder.writer.flush();
        log::info!("Audit recorder shutdown");
    }
}

// ============================================================================
// QUERY API (for reading logs)
// ============================================================================

use std::io::{BufRead, BufReader};

/// Read all events from a log file
pub fn read_events(file_path: &PathBuf) -> std::io::Result<Vec<SecurityEvent>> {
    let file = File::open(file_path)?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if !line.is_empty() {
            if let Ok(event) = serde_json::from_str::<SecurityEvent>(&line) {
                events.push(event);
            }
        }
    }

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================
