//! Persisted tunnel inventory.
//!
//! The engine only needs three operations: list everything, save a new
//! record, and update an existing one. [`MemoryInventory`] keeps records in
//! memory; [`JsonFileInventory`] additionally snapshots them to a JSON file
//! after every write.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ReconcileError, Result};
use crate::record::TunnelRecord;

/// Narrow save/query interface over the tunnel store.
pub trait TunnelInventory: Send + Sync {
    /// Returns a snapshot of every record.
    fn list_all(&self) -> Result<Vec<TunnelRecord>>;

    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Persistence`] if the id already exists or
    /// the write fails.
    fn save(&self, record: &TunnelRecord) -> Result<()>;

    /// Replaces an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Persistence`] if the id is unknown or the
    /// write fails.
    fn update(&self, record: &TunnelRecord) -> Result<()>;
}

/// In-memory inventory keyed by record id.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    records: RwLock<BTreeMap<Uuid, TunnelRecord>>,
}

impl MemoryInventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inventory holding `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = TunnelRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<TunnelRecord> {
        self.records.read().get(id).cloned()
    }
}

impl TunnelInventory for MemoryInventory {
    fn list_all(&self) -> Result<Vec<TunnelRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn save(&self, record: &TunnelRecord) -> Result<()> {
        insert_new(&mut self.records.write(), record)
    }

    fn update(&self, record: &TunnelRecord) -> Result<()> {
        replace(&mut self.records.write(), record)
    }
}

fn insert_new(records: &mut BTreeMap<Uuid, TunnelRecord>, record: &TunnelRecord) -> Result<()> {
    if records.contains_key(&record.id) {
        return Err(ReconcileError::persistence(record.id, "record already exists"));
    }
    records.insert(record.id, record.clone());
    Ok(())
}

fn replace(records: &mut BTreeMap<Uuid, TunnelRecord>, record: &TunnelRecord) -> Result<()> {
    let slot = records
        .get_mut(&record.id)
        .ok_or_else(|| ReconcileError::persistence(record.id, "record not found"))?;
    *slot = record.clone();
    Ok(())
}

/// Inventory persisted as a JSON array on disk.
///
/// Each write serializes every record to a temporary file and renames it
/// over the target. The in-memory view only changes once the file has been
/// written, so a failed write leaves the inventory as it was.
#[derive(Debug)]
pub struct JsonFileInventory {
    path: PathBuf,
    memory: MemoryInventory,
}

impl JsonFileInventory {
    /// Opens the inventory at `path`, loading existing records.
    ///
    /// A missing file is treated as an empty inventory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records: Vec<TunnelRecord> = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ReconcileError::Config(format!("invalid inventory '{}': {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(ReconcileError::Config(format!(
                    "failed to read inventory '{}': {e}",
                    path.display()
                )));
            }
        };
        debug!(path = %path.display(), count = records.len(), "loaded tunnel inventory");
        Ok(Self {
            path,
            memory: MemoryInventory::with_records(records),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the records, writes the copy to disk,
    /// then makes it visible.
    fn commit(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut BTreeMap<Uuid, TunnelRecord>) -> Result<()>,
    ) -> Result<()> {
        let mut records = self.memory.records.write();
        let mut next = records.clone();
        change(&mut next)?;
        self.snapshot(id, &next)?;
        *records = next;
        Ok(())
    }

    fn snapshot(&self, id: Uuid, records: &BTreeMap<Uuid, TunnelRecord>) -> Result<()> {
        let records: Vec<&TunnelRecord> = records.values().collect();
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| ReconcileError::persistence(id, e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ReconcileError::persistence(id, e.to_string()))?;
        }
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                warn!(path = %self.path.display(), error = %e, "failed to snapshot inventory");
                ReconcileError::persistence(id, e.to_string())
            })
    }
}

impl TunnelInventory for JsonFileInventory {
    fn list_all(&self) -> Result<Vec<TunnelRecord>> {
        self.memory.list_all()
    }

    fn save(&self, record: &TunnelRecord) -> Result<()> {
        self.commit(record.id, |records| insert_new(records, record))
    }

    fn update(&self, record: &TunnelRecord) -> Result<()> {
        self.commit(record.id, |records| replace(records, record))
    }
}
