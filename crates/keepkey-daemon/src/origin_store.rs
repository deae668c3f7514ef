//! Approved origin storage
//!
//! A flat JSON-lines document file, one [`ApprovedOrigin`] per line. The whole
//! file is loaded at startup; approvals are appended and never rewritten.

use keepkey_core::{ApprovedOrigin, Origin};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{DaemonError, Result};

/// Allowlist of origins the user approved
pub struct OriginStore {
    /// Backing file
    path: PathBuf,

    /// Loaded records in insertion order
    records: Vec<ApprovedOrigin>,

    /// Origin -> index into `records`
    index: HashMap<Origin, usize>,
}

impl OriginStore {
    /// Open the store, loading every record in the file
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut store = Self {
            path,
            records: Vec::new(),
            index: HashMap::new(),
        };
        store.load_from_disk()?;

        info!(
            "Loaded {} approved origin(s) from {:?}",
            store.records.len(),
            store.path
        );
        Ok(store)
    }

    /// Check whether an origin is approved
    pub fn contains(&self, origin: &Origin) -> bool {
        self.index.contains_key(origin)
    }

    /// Look up the record of an approved origin
    pub fn get(&self, origin: &Origin) -> Option<&ApprovedOrigin> {
        self.index.get(origin).map(|&i| &self.records[i])
    }

    /// All approved origins, in approval order
    pub fn list(&self) -> &[ApprovedOrigin] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Approve an origin
    ///
    /// Returns `true` if the origin was new. Approving an origin twice keeps
    /// the first record and writes nothing.
    pub fn insert(&mut self, origin: Origin) -> Result<bool> {
        if self.contains(&origin) {
            debug!("Origin {} already approved", origin);
            return Ok(false);
        }

        let record = ApprovedOrigin::new(origin);
        self.append_to_disk(&record)?;

        self.index.insert(record.origin.clone(), self.records.len());
        info!("Saved approved origin {}", record.origin);
        self.records.push(record);
        Ok(true)
    }

    /// Load every parseable line; unreadable lines are skipped
    fn load_from_disk(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.path)?;
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<ApprovedOrigin>(line) {
                Ok(record) => {
                    if !self.index.contains_key(&record.origin) {
                        self.index.insert(record.origin.clone(), self.records.len());
                        self.records.push(record);
                    }
                }
                Err(e) => {
                    warn!(
                        "Skipping unreadable origin record at {:?}:{}: {}",
                        self.path,
                        line_no + 1,
                        e
                    );
                }
            }
        }

        Ok(())
    }

    /// Append one record and flush it to disk
    fn append_to_disk(&self, record: &ApprovedOrigin) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DaemonError::Store(format!("{:?}: {}", self.path, e)))?;

        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata()?.permissions();
            if perms.mode() & 0o777 != 0o600 {
                perms.set_mode(0o600);
                std::fs::set_permissions(&self.path, perms)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn origin(s: &str) -> Origin {
        Origin::parse(s).unwrap()
    }

    #[test]
    fn test_insert_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("origins.db");

        {
            let mut store = OriginStore::open(path.clone()).unwrap();
            assert!(store.is_empty());
            assert!(store.insert(origin("https://app.example.com")).unwrap());
            assert!(store.insert(origin("http://localhost:3000")).unwrap());
        }

        let store = OriginStore::open(path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains(&origin("https://app.example.com/some/page")));
        assert_eq!(store.list()[1].origin.as_str(), "http://localhost:3000");
        assert!(!store.list()[0].is_verified);
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("origins.db");
        let mut store = OriginStore::open(path.clone()).unwrap();

        assert!(store.insert(origin("https://app.example.com")).unwrap());
        let first_added = store.get(&origin("https://app.example.com")).unwrap().added_at;
        assert!(!store.insert(origin("https://app.example.com/")).unwrap());

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&origin("https://app.example.com")).unwrap().added_at,
            first_added
        );
        let lines = std::fs::read_to_string(&path).unwrap();
        assert_eq!(lines.lines().count(), 1);
    }

    #[test]
    fn test_skips_garbage_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("origins.db");
        std::fs::write(
            &path,
            concat!(
                "{\"origin\":\"https://a.example\",\"added\":1,\"isVerified\":false,\"_id\":\"x1\"}\n",
                "not json\n",
                "\n",
                "{\"origin\":\"https://b.example\",\"addedAt\":2,\"isVerified\":true}\n",
            ),
        )
        .unwrap();

        let store = OriginStore::open(path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get(&origin("https://b.example")).unwrap().is_verified);
    }

    #[test]
    fn test_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("origins.db");
        let mut store = OriginStore::open(path.clone()).unwrap();
        store.insert(origin("https://app.example.com")).unwrap();
        assert!(path.exists());
    }
}
