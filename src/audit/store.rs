// SPDX-License-Identifier: Apache-2.0

//! Audit Log Store
//!
//! Persistent audit log of reconciliation outcomes.
//! Stores records in a rotating JSON lines file.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::types::{AuditQuery, AuditRecord, AuditSink, AuditStats};

/// Maximum records to keep in memory for fast access
const MEMORY_CACHE_SIZE: usize = 1000;

/// Audit log store with optional file persistence
pub struct AuditStore {
    /// In-memory cache of recent records
    entries: RwLock<VecDeque<AuditRecord>>,
    /// Path to the audit log file, `None` for a memory-only store
    log_path: Option<PathBuf>,
    /// Maximum records to retain in file
    max_entries: RwLock<usize>,
    enabled: RwLock<bool>,
}

impl AuditStore {
    pub fn new(data_dir: PathBuf, max_entries: usize) -> Self {
        let log_path = data_dir.join("audit.jsonl");

        if let Some(parent) = log_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create audit log directory: {}", e);
            }
        }

        let store = Self {
            entries: RwLock::new(VecDeque::with_capacity(MEMORY_CACHE_SIZE)),
            log_path: Some(log_path),
            max_entries: RwLock::new(max_entries),
            enabled: RwLock::new(true),
        };

        store.load_recent_entries();

        store
    }

    /// Store that keeps records in memory only
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(MEMORY_CACHE_SIZE)),
            log_path: None,
            max_entries: RwLock::new(MEMORY_CACHE_SIZE),
            enabled: RwLock::new(true),
        }
    }

    fn load_recent_entries(&self) {
        let Some(log_path) = self.log_path.as_ref().filter(|p| p.exists()) else {
            return;
        };

        match File::open(log_path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                let mut entries = self.entries.write();

                for line in reader.lines().map_while(Result::ok) {
                    if let Ok(entry) = serde_json::from_str::<AuditRecord>(&line) {
                        if entries.len() >= MEMORY_CACHE_SIZE {
                            entries.pop_front();
                        }
                        entries.push_back(entry);
                    }
                }

                debug!("Loaded {} audit records from file", entries.len());
            }
            Err(e) => {
                warn!("Failed to load audit log file: {}", e);
            }
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.write() = enabled;
        info!("Audit logging {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn set_max_entries(&self, max_entries: usize) {
        *self.max_entries.write() = max_entries;
        self.maybe_rotate();
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.read()
    }

    pub fn log(&self, entry: AuditRecord) {
        if !self.is_enabled() {
            return;
        }

        {
            let mut entries = self.entries.write();
            if entries.len() >= MEMORY_CACHE_SIZE {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        if let Some(log_path) = &self.log_path {
            if let Err(e) = append_to_file(log_path, &entry) {
                error!("Failed to write audit record: {}", e);
            }
            self.maybe_rotate();
        }
    }

    /// Rotate the log file if it exceeds max entries
    fn maybe_rotate(&self) {
        let Some(log_path) = &self.log_path else {
            return;
        };
        let line_count = match File::open(log_path) {
            Ok(file) => BufReader::new(file).lines().count(),
            Err(_) => return,
        };

        let max_entries = *self.max_entries.read();
        if line_count <= max_entries {
            return;
        }

        let entries_to_keep = max_entries * 3 / 4;

        match rotate_file(log_path, entries_to_keep) {
            Ok(removed) => {
                info!("Rotated audit log, removed {} old records", removed);
            }
            Err(e) => {
                error!("Failed to rotate audit log: {}", e);
            }
        }
    }

    /// Recent records, most recent first
    pub fn get_entries(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        let entries = self.entries.read();
        let search = query.search.as_ref().map(|s| s.to_lowercase());

        entries
            .iter()
            .rev()
            .filter(|e| {
                if let Some(code) = query.code {
                    if e.code != code {
                        return false;
                    }
                }

                if let Some(min) = query.min_severity {
                    if !e.severity.at_least(min) {
                        return false;
                    }
                }

                if let Some(search) = &search {
                    let in_cause = e
                        .cause
                        .as_ref()
                        .map(|c| c.to_lowercase().contains(search))
                        .unwrap_or(false);
                    if !e.message.to_lowercase().contains(search)
                        && !e.event_kind.to_lowercase().contains(search)
                        && !in_cause
                    {
                        return false;
                    }
                }

                if let Some(from) = query.from_date {
                    if e.timestamp < from {
                        return false;
                    }
                }

                if let Some(to) = query.to_date {
                    if e.timestamp > to {
                        return false;
                    }
                }

                true
            })
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn get_stats(&self) -> AuditStats {
        let entries = self.entries.read();
        let now = Utc::now();
        let last_hour = now - Duration::hours(1);
        let last_day = now - Duration::days(1);

        let mut stats = AuditStats::default();

        for entry in entries.iter() {
            stats.total += 1;

            if entry.timestamp >= last_hour {
                stats.last_hour += 1;
            }

            if entry.timestamp >= last_day {
                stats.last_day += 1;
            }

            let severity_key = format!("{:?}", entry.severity).to_lowercase();
            *stats.by_severity.entry(severity_key).or_insert(0) += 1;
            *stats
                .by_code
                .entry(entry.message_id.clone())
                .or_insert(0) += 1;
        }

        stats
    }

    pub fn clear(&self) {
        self.entries.write().clear();

        if let Some(log_path) = &self.log_path {
            if let Err(e) = File::create(log_path) {
                error!("Failed to clear audit log file: {}", e);
            }
        }

        info!("Audit log cleared");
    }

    /// Export cached records as JSON
    pub fn export(&self) -> String {
        let entries = self.entries.read();
        let entries_vec: Vec<&AuditRecord> = entries.iter().collect();
        serde_json::to_string_pretty(&entries_vec).unwrap_or_else(|_| "[]".to_string())
    }
}

impl AuditSink for AuditStore {
    fn record(&self, record: AuditRecord) {
        self.log(record);
    }
}

fn append_to_file(log_path: &PathBuf, entry: &AuditRecord) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let mut writer = BufWriter::new(file);
    let json = serde_json::to_string(entry)?;
    writeln!(writer, "{}", json)?;
    writer.flush()?;

    Ok(())
}

/// Rewrites the log file keeping only the last `keep_count` lines
fn rotate_file(log_path: &PathBuf, keep_count: usize) -> std::io::Result<usize> {
    let file = File::open(log_path)?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

    let total = lines.len();
    if total <= keep_count {
        return Ok(0);
    }

    let skip = total - keep_count;

    let temp_path = log_path.with_extension("jsonl.tmp");
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        for line in lines.iter().skip(skip) {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
    }

    fs::rename(&temp_path, log_path)?;

    Ok(skip)
}
