//! Durable per-tenant item sets.
//!
//! Each tenant owns one JSON file under the storage directory mapping every
//! committed item id to `true`. Files only ever grow: a merge is a set union.

use crate::core::{CountError, Result, validate_tenant};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Committed ids of one tenant, as stored on disk.
pub type TenantRecord = BTreeMap<String, bool>;

// ============================================================================
// Durable Tenant Store
// ============================================================================

/// File-backed tenant records.
///
/// All file I/O of one store (and its clones) is serialized by a single lock; callers on
/// the async runtime should go through `spawn_blocking`.
#[derive(Clone)]
pub struct DurableTenantStore {
    root: PathBuf,
    io_lock: Arc<Mutex<()>>,
}

impl DurableTenantStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            io_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, tenant: &str) -> Result<PathBuf> {
        validate_tenant(tenant)?;
        Ok(self.root.join(tenant))
    }

    /// Load a tenant's record, `None` if nothing was ever committed.
    pub fn load(&self, tenant: &str) -> Result<Option<TenantRecord>> {
        let path = self.path_for(tenant)?;
        let _guard = self.io_lock.lock()?;
        read_record(&path)
    }

    /// Cardinality of the committed set, zero for unknown tenants.
    pub fn count(&self, tenant: &str) -> Result<usize> {
        Ok(self.load(tenant)?.map_or(0, |record| record.len()))
    }

    /// Atomically load, union `ids` into, and save the tenant's record.
    ///
    /// Returns the total number of committed ids after the merge.
    pub fn merge<I>(&self, tenant: &str, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = String>,
    {
        let path = self.path_for(tenant)?;
        let _guard = self.io_lock.lock()?;
        let mut record = read_record(&path)?.unwrap_or_default();
        record.extend(ids.into_iter().map(|id| (id, true)));
        write_record(&self.root, &path, &record)?;
        Ok(record.len())
    }
}

fn read_record(path: &Path) -> Result<Option<TenantRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let record = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(record))
}

/// Write to a temp file in the same directory, sync, then rename over `path`.
fn write_record(root: &Path, path: &Path, record: &TenantRecord) -> Result<()> {
    let mut temp = NamedTempFile::new_in(root)?;
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut writer = BufWriter::new(temp.as_file_mut());
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    record.serialize(&mut serializer)?;
    writer.flush()?;
    drop(writer);
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| CountError::Io(e.error))?;
    Ok(())
}
