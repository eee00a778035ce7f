//! IP blacklist gate.
//!
//! A small persisted set of banned addresses, checked before any other
//! admission step. Entries are cached in memory; every mutation rewrites
//! the backing JSON file.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GateError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    pub id: String,
    pub ip: String,
    /// Free text; moderation inserts its own wording so manual and
    /// automatic bans stay distinguishable.
    pub reason: String,
    /// Unix milliseconds.
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistPage {
    pub records: Vec<BlacklistEntry>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

pub struct Blacklist {
    /// Keyed by IP; the map itself enforces one entry per address.
    entries: DashMap<String, BlacklistEntry>,
    persistence_path: Option<PathBuf>,
}

impl Blacklist {
    /// Create an empty, unpersisted blacklist.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            entries: DashMap::new(),
            persistence_path,
        }
    }

    /// Open the blacklist, loading persisted entries if the file exists.
    ///
    /// An unreadable file is not a startup failure: the gate starts with
    /// an empty blacklist and the affected IPs are simply not blacklisted.
    pub fn open(path: &Path) -> Self {
        let blacklist = Self::new(Some(path.to_path_buf()));
        if !path.exists() {
            return blacklist;
        }

        let entries: Vec<BlacklistEntry> = match File::open(path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file)).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Unreadable blacklist file, starting empty");
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open blacklist file, starting empty");
                Vec::new()
            }
        };
        for entry in entries {
            blacklist.entries.insert(entry.ip.clone(), entry);
        }
        if !blacklist.entries.is_empty() {
            tracing::info!(count = blacklist.entries.len(), "Loaded blacklist entries");
        }
        blacklist
    }

    /// Membership test. Empty or unknown addresses are never blacklisted.
    pub fn is_blacklisted(&self, ip: &str) -> bool {
        if !valid_ip(ip) {
            return false;
        }
        self.entries.contains_key(ip)
    }

    pub fn add(&self, ip: &str, reason: &str) -> Result<BlacklistEntry, GateError> {
        if !valid_ip(ip) {
            return Err(GateError::InvalidIdentifier);
        }

        let entry = BlacklistEntry {
            id: Uuid::new_v4().to_string(),
            ip: ip.to_string(),
            reason: reason.to_string(),
            created_at: unix_millis(),
        };
        match self.entries.entry(ip.to_string()) {
            Entry::Occupied(_) => return Err(GateError::AlreadyBlacklisted),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
            }
        }
        self.save()?;
        tracing::info!(ip = %ip, reason = %reason, "IP added to blacklist");
        Ok(entry)
    }

    pub fn remove_by_ip(&self, ip: &str) -> Result<(), GateError> {
        if !valid_ip(ip) {
            return Err(GateError::InvalidIdentifier);
        }
        if self.entries.remove(ip).is_none() {
            return Err(GateError::NotFound);
        }
        self.save()?;
        tracing::info!(ip = %ip, "IP removed from blacklist");
        Ok(())
    }

    /// Remove an entry by its id; returns the IP it covered.
    pub fn remove_by_id(&self, id: &str) -> Result<String, GateError> {
        let ip = self
            .entries
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.key().clone())
            .ok_or(GateError::NotFound)?;
        self.entries.remove(&ip);
        self.save()?;
        tracing::info!(ip = %ip, "IP removed from blacklist");
        Ok(ip)
    }

    /// Page through entries, newest first. Page numbers start at one.
    pub fn list(&self, page: usize, limit: usize) -> BlacklistPage {
        let page = page.max(1);
        let limit = limit.max(1);

        let mut records: Vec<BlacklistEntry> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = records.len();
        let total_pages = total.div_ceil(limit);
        let start = (page - 1) * limit;
        let records = if start >= total {
            Vec::new()
        } else {
            records[start..(start + limit).min(total)].to_vec()
        };

        BlacklistPage {
            records,
            page,
            limit,
            total,
            total_pages,
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    fn save(&self) -> Result<(), GateError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let mut entries: Vec<BlacklistEntry> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let file = File::create(path).map_err(GateError::Store)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &entries)
            .map_err(|e| GateError::Store(e.into()))?;
        Ok(())
    }
}

fn valid_ip(ip: &str) -> bool {
    !ip.is_empty() && ip != "unknown"
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
