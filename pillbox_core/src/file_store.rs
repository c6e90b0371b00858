//! JSON-file backed store with file locking.
//!
//! The whole database lives in one JSON document. Every transaction takes an
//! exclusive lock on a sidecar lock file, so transactions from concurrent
//! threads and processes are serialized; readers take a shared lock. Writes
//! go to a temp file in the same directory which is synced and renamed over
//! the document, so a crash never leaves a half-written database.

use crate::store::{Database, Store};
use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Database document file name inside the data directory
pub const DATABASE_FILE: &str = "pillbox.json";
/// Lock file name inside the data directory
pub const LOCK_FILE: &str = "pillbox.lock";

/// Store persisted as a locked JSON document
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    /// Create a store for the standard file names inside `data_dir`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(DATABASE_FILE),
            lock_path: data_dir.join(LOCK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn open_lock(&self) -> Result<File> {
        self.ensure_parent_dir()?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;
        Ok(file)
    }

    /// Read the document. Caller must hold the lock.
    ///
    /// A missing or empty document is an empty database. A document that
    /// fails to parse is an error: silently starting over would drop records.
    fn load(&self) -> Result<Database> {
        if !self.path.exists() {
            tracing::debug!("No database at {:?}, starting empty", self.path);
            return Ok(Database::default());
        }

        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(Database::default());
        }

        serde_json::from_str(&contents).map_err(|e| {
            tracing::error!("Failed to parse database {:?}: {}", self.path, e);
            Error::Storage(format!("database {:?} is corrupted: {}", self.path, e))
        })
    }

    /// Atomically replace the document. Caller must hold the exclusive lock.
    fn save(&self, db: &Database) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "database path missing parent")
        })?;
        let temp = NamedTempFile::new_in(parent)?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(db)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved database to {:?}", self.path);
        Ok(())
    }
}

impl Store for FileStore {
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let db = self.load()?;
        lock.unlock()?;
        f(&db)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;

        // On any early return the lock is released when `lock` is dropped
        let mut db = self.load()?;
        let value = f(&mut db)?;
        self.save(&db)?;

        lock.unlock()?;
        Ok(value)
    }
}
