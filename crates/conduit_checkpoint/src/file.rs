//! File-backed processing record store.
//!
//! Layout:
//!
//! ```text
//! <dir>/
//! ├─ <sha256(key)>.json    # One processing record
//! ├─ <sha256(key)>.lock    # Advisory lock held while a run is active
//! └─ <sha256(key)>.tmp     # Transient, during atomic writes
//! ```
//!
//! Run gates are OS advisory locks, so a crashed process releases its
//! gates automatically.

use crate::error::{StoreError, StoreResult};
use crate::record::{ProcessingRecord, RecordKey};
use crate::store::ProcessingRecordStore;
use fs2::FileExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const RECORD_EXT: &str = "json";
const LOCK_EXT: &str = "lock";
const TEMP_EXT: &str = "tmp";

/// Stores each processing record as a JSON document in a directory.
#[derive(Debug)]
pub struct FileRecordStore {
    dir: PathBuf,
    held: Mutex<HashMap<RecordKey, File>>,
}

impl FileRecordStore {
    /// Opens a store, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        if !dir.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a directory: {}", dir.display()),
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            held: Mutex::new(HashMap::new()),
        })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &RecordKey, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(key), ext))
    }

    fn read_record(path: &Path) -> StoreResult<Option<ProcessingRecord>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StoreError::corrupted(format!("{}: {}", path.display(), e)))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StoreResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Hex SHA-256 of the key's components, NUL separated.
fn file_stem(key: &RecordKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.tenant.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.connector.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.resource.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl ProcessingRecordStore for FileRecordStore {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<ProcessingRecord>> {
        let record = Self::read_record(&self.path_for(key, RECORD_EXT))?;
        match record {
            Some(record) if record.key != *key => Err(StoreError::corrupted(format!(
                "record for {} found under the file of {}",
                record.key, key
            ))),
            other => Ok(other),
        }
    }

    fn put(&self, record: &ProcessingRecord) -> StoreResult<()> {
        let path = self.path_for(&record.key, RECORD_EXT);
        let temp_path = self.path_for(&record.key, TEMP_EXT);

        let data = serde_json::to_vec_pretty(record)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        self.sync_directory()?;

        tracing::trace!(key = %record.key, path = %path.display(), "processing record written");
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<ProcessingRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match Self::read_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(StoreError::Corrupted(message)) => {
                    tracing::warn!(kind = "checkpoint_corrupt", detail = %message, "skipping unreadable processing record");
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn try_acquire_run(&self, key: &RecordKey) -> StoreResult<bool> {
        let mut held = self.held.lock();
        if held.contains_key(key) {
            return Ok(false);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.path_for(key, LOCK_EXT))?;

        match FileExt::try_lock_exclusive(&lock_file) {
            Ok(()) => {
                held.insert(key.clone(), lock_file);
                Ok(true)
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn release_run(&self, key: &RecordKey) -> StoreResult<()> {
        if let Some(lock_file) = self.held.lock().remove(key) {
            FileExt::unlock(&lock_file)?;
        }
        Ok(())
    }
}
