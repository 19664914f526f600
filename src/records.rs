//! Link record storage.
//!
//! Keeps a list of submitted page links and their processing status in
//! `link_records.json` under the data directory (~/.agent-chat by default).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::enrich::normalize_url;
use crate::error::{ChatError, Result};

pub const RECORDS_FILE: &str = "link_records.json";

/// Address recorded for links added from this machine
const LOCAL_IP: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Ready,
    Progress,
    Done,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Ready => "Ready",
            LinkStatus::Progress => "Progress",
            LinkStatus::Done => "Done",
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ready" => Ok(LinkStatus::Ready),
            "progress" => Ok(LinkStatus::Progress),
            "done" => Ok(LinkStatus::Done),
            other => Err(format!(
                "Unknown status '{}' (expected Ready, Progress or Done)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub status: LinkStatus,
}

/// File-backed list of link records
pub struct LinkRecordStore {
    records_path: PathBuf,
}

impl LinkRecordStore {
    /// Open the store in `data_dir`, creating the directory if needed.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            records_path: data_dir.join(RECORDS_FILE),
        })
    }

    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    /// All records in insertion order. A missing or unreadable file is an
    /// empty list.
    pub fn list(&self) -> Result<Vec<LinkRecord>> {
        if !self.records_path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.records_path)?;
        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("Failed to parse {:?}, starting empty: {}", self.records_path, e);
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, records: &[LinkRecord]) -> Result<()> {
        let content = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.records_path, content)?;
        debug!("Saved {} records to {:?}", records.len(), self.records_path);
        Ok(())
    }

    /// Append a link in the `Ready` state. Blank input adds nothing.
    pub fn add(&self, url: &str) -> Result<Option<LinkRecord>> {
        let url = normalize_url(url);
        if url.is_empty() {
            return Ok(None);
        }

        let record = LinkRecord {
            url,
            timestamp: Utc::now(),
            ip: LOCAL_IP.to_string(),
            status: LinkStatus::Ready,
        };
        let mut records = self.list()?;
        records.push(record.clone());
        self.save(&records)?;

        info!("Added link record {}", record.url);
        Ok(Some(record))
    }

    /// Update the status of the record at `index` (zero-based).
    pub fn set_status(&self, index: usize, status: LinkStatus) -> Result<LinkRecord> {
        let mut records = self.list()?;
        let count = records.len();
        let record = records.get_mut(index).ok_or_else(|| {
            ChatError::Store(format!("No link record #{} ({} stored)", index + 1, count))
        })?;
        record.status = status;
        let updated = record.clone();
        self.save(&records)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_store() {
        let tmp = tempdir().unwrap();
        let store = LinkRecordStore::new(tmp.path()).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(!store.records_path().exists());
    }

    #[test]
    fn test_add_normalizes_and_persists() {
        let tmp = tempdir().unwrap();
        let store = LinkRecordStore::new(tmp.path()).unwrap();

        let record = store.add("  wiki.example.com/page ").unwrap().unwrap();
        assert_eq!(record.url, "http://wiki.example.com/page");
        assert_eq!(record.ip, "127.0.0.1");
        assert_eq!(record.status, LinkStatus::Ready);
        assert!(store.add("   ").unwrap().is_none());

        let reopened = LinkRecordStore::new(tmp.path()).unwrap();
        assert_eq!(reopened.list().unwrap(), vec![record]);
    }

    #[test]
    fn test_set_status() {
        let tmp = tempdir().unwrap();
        let store = LinkRecordStore::new(tmp.path()).unwrap();
        store.add("https://a.example").unwrap();
        store.add("https://b.example").unwrap();

        let updated = store.set_status(1, LinkStatus::Done).unwrap();
        assert_eq!(updated.url, "https://b.example");
        let statuses: Vec<_> = store.list().unwrap().iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![LinkStatus::Ready, LinkStatus::Done]);

        assert!(store.set_status(5, LinkStatus::Progress).is_err());
    }

    #[test]
    fn test_file_format() {
        let tmp = tempdir().unwrap();
        let store = LinkRecordStore::new(tmp.path()).unwrap();
        store.add("example.com").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.records_path()).unwrap()).unwrap();
        assert_eq!(raw[0]["url"], "http://example.com");
        assert_eq!(raw[0]["status"], "Ready");
        assert!(raw[0]["timestamp"].is_string());
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let tmp = tempdir().unwrap();
        let store = LinkRecordStore::new(tmp.path()).unwrap();
        std::fs::write(store.records_path(), "not json").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("progress".parse::<LinkStatus>().unwrap(), LinkStatus::Progress);
        assert_eq!("Done".parse::<LinkStatus>().unwrap(), LinkStatus::Done);
        assert!("finished".parse::<LinkStatus>().is_err());
    }
}
