//! Append-only record storage with a fixed-size superblock.
//!
//! The backing file is laid out as:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Superblock (4096 bytes)                                     │
//! │  - Root address: u64 BE (8 bytes), 0 = empty tree            │
//! │  - Zero padding                                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Records (repeated, append-only)                             │
//! │  - Length: u64 BE (8 bytes)                                  │
//! │  - Payload: `length` bytes                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are never rewritten once appended. The only in-place write is the
//! 8-byte root address at offset 0, which sits on a sector boundary and is
//! published only after every record it can reach has been flushed.
//!
//! Writers serialize through an exclusive advisory lock on the file. Readers
//! never take the lock; they re-read the root address instead.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Byte offset of a record in the backing file. `0` means "unset".
pub type Address = u64;

/// Size of the superblock at the start of every file.
pub const SUPERBLOCK_SIZE: u64 = 4096;

/// Width of the big-endian integers used for lengths and addresses.
pub const INTEGER_LENGTH: usize = 8;

/// Sync mode applied whenever the storage flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync on every flush (default, highest durability).
    #[default]
    Fsync,
    /// Use fdatasync (skip metadata update, faster).
    Fdatasync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

/// Configuration for storage behavior.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Sync mode for durability guarantees.
    pub sync_mode: SyncMode,
}

impl StorageConfig {
    /// Sets the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }
}

/// Append-only file with a superblock holding the current root address.
///
/// A `Storage` owns the advisory lock of its session: once acquired by
/// [`Storage::lock`] or [`Storage::write`] it is held until
/// [`Storage::unlock`], [`Storage::commit_root_address`], [`Storage::close`]
/// or drop.
#[derive(Debug)]
pub struct Storage {
    file: File,
    path: PathBuf,
    locked: bool,
    config: StorageConfig,
}

impl Storage {
    /// Opens the file at `path`, creating it if it does not exist.
    ///
    /// The file is zero-padded to the superblock size under the lock, so no
    /// record can ever overlap the root address.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, locked or extended.
    pub fn open(path: impl AsRef<Path>, config: StorageConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut storage = Self {
            file,
            path,
            locked: false,
            config,
        };
        storage.ensure_superblock()?;
        Ok(storage)
    }

    fn ensure_superblock(&mut self) -> Result<()> {
        self.lock()?;
        let result = self.pad_superblock();
        let unlocked = self.unlock();
        result.and(unlocked)
    }

    fn pad_superblock(&mut self) -> Result<()> {
        let end = self.file.seek(SeekFrom::End(0))?;
        if end < SUPERBLOCK_SIZE {
            self.file
                .write_all(&vec![0u8; (SUPERBLOCK_SIZE - end) as usize])?;
            debug!("Initialized superblock in {}", self.path.display());
        }
        Ok(())
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the storage configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns true if this session currently holds the exclusive lock.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Acquires the exclusive lock, blocking until it is available.
    ///
    /// Returns `true` if the lock was newly acquired and `false` if this
    /// session already held it.
    pub fn lock(&mut self) -> Result<bool> {
        if self.locked {
            return Ok(false);
        }
        FileExt::lock_exclusive(&self.file)?;
        self.locked = true;
        debug!("Acquired lock on {}", self.path.display());
        Ok(true)
    }

    /// Flushes pending writes and releases the lock if held.
    pub fn unlock(&mut self) -> Result<()> {
        if !self.locked {
            return Ok(());
        }
        let flushed = self.flush();
        // Release even when the flush failed, the error is still reported.
        FileExt::unlock(&self.file)?;
        self.locked = false;
        debug!("Released lock on {}", self.path.display());
        flushed
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        match self.config.sync_mode {
            SyncMode::Fsync => self.file.sync_all()?,
            SyncMode::Fdatasync => self.file.sync_data()?,
            SyncMode::None => {}
        }
        Ok(())
    }

    /// Appends a length-prefixed record and returns its address.
    ///
    /// Acquires the lock if it is not already held and leaves it held.
    pub fn write(&mut self, data: &[u8]) -> Result<Address> {
        self.lock()?;
        let address = self.file.seek(SeekFrom::End(0))?;

        let mut record = Vec::with_capacity(INTEGER_LENGTH + data.len());
        record.extend_from_slice(&(data.len() as u64).to_be_bytes());
        record.extend_from_slice(data);
        self.file.write_all(&record)?;

        Ok(address)
    }

    /// Reads the payload of the record stored at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if the length prefix runs past the end of
    /// the file.
    pub fn read(&mut self, address: Address) -> Result<Vec<u8>> {
        if address < SUPERBLOCK_SIZE {
            return Err(Error::InvalidAddress(address));
        }
        self.file.seek(SeekFrom::Start(address))?;
        let len = self.read_integer()?;

        let file_len = self.file.metadata()?.len();
        let end = address
            .checked_add(INTEGER_LENGTH as u64)
            .and_then(|start| start.checked_add(len))
            .filter(|&end| end <= file_len);
        let len = end
            .and_then(|_| usize::try_from(len).ok())
            .ok_or_else(|| {
                Error::corrupted(address, format!("record length {} exceeds file", len))
            })?;

        let mut data = vec![0u8; len];
        self.file.read_exact(&mut data)?;
        Ok(data)
    }

    /// Publishes `root_address` as the current root.
    ///
    /// All appended records are flushed before the superblock is rewritten,
    /// and the lock is released afterwards even if a write fails.
    pub fn commit_root_address(&mut self, root_address: Address) -> Result<()> {
        self.lock()?;
        let result = self.write_superblock(root_address);
        let unlocked = self.unlock();
        result.and(unlocked)?;
        debug!(
            "Committed root address {} to {}",
            root_address,
            self.path.display()
        );
        Ok(())
    }

    fn write_superblock(&mut self, root_address: Address) -> Result<()> {
        self.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&root_address.to_be_bytes())?;
        self.flush()
    }

    /// Reads the currently published root address.
    pub fn get_root_address(&mut self) -> Result<Address> {
        self.file.seek(SeekFrom::Start(0))?;
        self.read_integer()
    }

    fn read_integer(&mut self) -> Result<u64> {
        let mut buf = [0u8; INTEGER_LENGTH];
        self.file.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Releases the lock and closes the file.
    pub fn close(mut self) -> Result<()> {
        self.unlock()
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if self.locked {
            if let Err(e) = FileExt::unlock(&self.file) {
                warn!("Failed to release lock on {}: {}", self.path.display(), e);
            }
            self.locked = false;
        }
    }
}
