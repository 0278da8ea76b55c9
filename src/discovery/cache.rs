//! Last-known-good discovery result, persisted as one line:
//! `ip<TAB>name<TAB>timestamp`.
//!
//! The cache is advisory. An absent or corrupt file means "no cache", and the
//! caller must still revalidate the address before trusting it.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// One cached `(ip, name)` pair with the Unix time it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub ip: Ipv4Addr,
    pub name: String,
    pub timestamp: u64,
}

impl CacheRecord {
    pub fn new(ip: Ipv4Addr, name: impl Into<String>) -> Self {
        CacheRecord {
            ip,
            name: name.into(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Parse one record line; any deviation yields None.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split('\t');
        let ip: Ipv4Addr = fields.next()?.parse().ok()?;
        let name = fields.next()?.trim();
        let timestamp: u64 = fields.next()?.trim().parse().ok()?;
        if name.is_empty() || fields.next().is_some() {
            return None;
        }
        Some(CacheRecord {
            ip,
            name: name.to_string(),
            timestamp,
        })
    }

    pub fn to_line(&self) -> String {
        format!("{}\t{}\t{}\n", self.ip, self.name, self.timestamp)
    }
}

/// Read the cache file. Absent or corrupt means no cache.
pub fn load(path: &Path) -> Option<CacheRecord> {
    let content = std::fs::read_to_string(path).ok()?;
    let record = CacheRecord::parse(&content);
    if record.is_none() {
        debug!(path = %path.display(), "ignoring corrupt discovery cache");
    }
    record
}

/// Write the cache file. Failure is not worth surfacing; the next discovery
/// just runs the slow path again.
pub fn store(path: &Path, record: &CacheRecord) {
    if let Err(e) = std::fs::write(path, record.to_line()) {
        debug!(path = %path.display(), error = %e, "could not write discovery cache");
    }
}
