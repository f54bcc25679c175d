//! Storage backends
//!
//! A storage backend holds one whole snapshot: every table's data,
//! keyed by table name. The contract is deliberately narrow — read the
//! full snapshot or signal absence, and overwrite the full snapshot —
//! so any backend that can round-trip a blob can serve as one.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::RwLock;

use crate::document::TableData;
use crate::error::Result;

/// Whole-storage snapshot: every table's data, keyed by table name
pub type Snapshot = BTreeMap<String, TableData>;

/// Whole-snapshot storage contract.
///
/// `read` returns `None` while the backend holds no data yet. `write`
/// is a total overwrite; partially written state must never become
/// visible to a subsequent `read`.
pub trait Storage: Send + Sync {
    /// Read the full snapshot, or `None` if no data has been written
    fn read(&self) -> Result<Option<Snapshot>>;

    /// Overwrite the full snapshot
    fn write(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Volatile in-memory storage, mainly for tests and scratch data
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<Option<Snapshot>>,
}

impl MemoryStorage {
    /// Create empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self) -> Result<Option<Snapshot>> {
        Ok(self.data.read().clone())
    }

    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        *self.data.write() = Some(snapshot.clone());
        Ok(())
    }
}

/// Single-file JSON persistence.
///
/// The entire snapshot is serialized as one JSON document. An empty
/// file is the absence signal.
pub struct JsonStorage {
    file: RwLock<File>,
}

impl JsonStorage {
    /// Open or create a snapshot file at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file: RwLock::new(file),
        })
    }
}

impl Storage for JsonStorage {
    fn read(&self) -> Result<Option<Snapshot>> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        if contents.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let serialized = serde_json::to_string(snapshot)?;

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;

        Ok(())
    }
}
