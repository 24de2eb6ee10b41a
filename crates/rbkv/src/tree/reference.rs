//! Lazy address-or-value references.
//!
//! A [`Ref`] is either unresolved (only an address), resolved (a value that
//! has not been written yet), or both. Resolving reads the record once and
//! caches it; storing writes the value once and records its address. A stored
//! record is never rewritten, so a reference with an address is final.

use crate::error::{Error, Result};
use crate::storage::{Address, Storage};
use crate::tree::node::Node;
use std::sync::{Arc, OnceLock};

/// A value that can live behind a [`Ref`].
pub trait Referent: Clone + Sized {
    /// Persists anything this value's encoding points at.
    fn prepare_to_store(&mut self, _storage: &mut Storage) -> Result<()> {
        Ok(())
    }

    /// Serializes the value into a record payload.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Deserializes the payload of the record stored at `address`.
    fn from_bytes(bytes: &[u8], address: Address) -> Result<Self>;
}

/// Reference to a value stored as canonical UTF-8 text.
pub type ValueRef = Ref<String>;

/// Reference to a tree node.
pub type NodeRef = Ref<Arc<Node>>;

impl Referent for String {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8], address: Address) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::corrupted(address, format!("value is not UTF-8: {}", e)))
    }
}

impl Referent for Arc<Node> {
    fn prepare_to_store(&mut self, storage: &mut Storage) -> Result<()> {
        Arc::make_mut(self).store_refs(storage)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        self.encode()
    }

    fn from_bytes(bytes: &[u8], address: Address) -> Result<Self> {
        Node::decode(bytes, address).map(Arc::new)
    }
}

/// Lazy handle to a record: an address, a materialized value, or both.
#[derive(Debug, Clone)]
pub struct Ref<T> {
    address: Address,
    referent: OnceLock<T>,
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self {
            address: 0,
            referent: OnceLock::new(),
        }
    }
}

impl<T: Referent> Ref<T> {
    /// Creates an empty reference (no address, no value).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a resolved reference that has not been stored yet.
    pub fn new(referent: T) -> Self {
        Self {
            address: 0,
            referent: OnceLock::from(referent),
        }
    }

    /// Creates an unresolved reference to the record at `address`.
    pub fn from_address(address: Address) -> Self {
        Self {
            address,
            referent: OnceLock::new(),
        }
    }

    /// Address of the stored record, `0` if not stored.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns true if the reference points at nothing.
    pub fn is_empty(&self) -> bool {
        self.address == 0 && self.referent.get().is_none()
    }

    /// Returns true if the value has not been written to storage yet.
    pub fn is_dirty(&self) -> bool {
        self.address == 0 && self.referent.get().is_some()
    }

    /// Resolves the reference, reading and caching the record if needed.
    ///
    /// Returns `None` for an empty reference.
    pub fn get(&self, storage: &mut Storage) -> Result<Option<&T>> {
        if self.referent.get().is_none() && self.address != 0 {
            let bytes = storage.read(self.address)?;
            let value = T::from_bytes(&bytes, self.address)?;
            let _ = self.referent.set(value);
        }
        Ok(self.referent.get())
    }

    /// Writes the value if it is resolved but has no address yet.
    ///
    /// Everything the value points at is stored first.
    pub fn store(&mut self, storage: &mut Storage) -> Result<()> {
        if self.address != 0 {
            return Ok(());
        }
        if let Some(referent) = self.referent.get_mut() {
            referent.prepare_to_store(storage)?;
            self.address = storage.write(&referent.to_bytes()?)?;
        }
        Ok(())
    }
}

impl Ref<Arc<Node>> {
    /// Wraps a freshly built node in an unstored reference.
    pub fn from_node(node: Node) -> Self {
        Self::new(Arc::new(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageConfig, SyncMode, SUPERBLOCK_SIZE};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Storage {
        let config = StorageConfig::default().with_sync_mode(SyncMode::None);
        Storage::open(dir.path().join("ref.db"), config).unwrap()
    }

    #[test]
    fn test_empty_ref() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir);

        let mut r = ValueRef::empty();
        assert!(r.is_empty());
        assert!(r.get(&mut storage).unwrap().is_none());
        r.store(&mut storage).unwrap();
        assert_eq!(r.address(), 0);
        assert!(!storage.is_locked());
    }

    #[test]
    fn test_store_then_resolve() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir);

        let mut r = ValueRef::new("apple".to_string());
        assert!(r.is_dirty());
        r.store(&mut storage).unwrap();
        assert_eq!(r.address(), SUPERBLOCK_SIZE);
        assert!(!r.is_dirty());

        let lazy = ValueRef::from_address(r.address());
        assert_eq!(lazy.get(&mut storage).unwrap().unwrap(), "apple");
        // Cached from here on.
        assert_eq!(lazy.get(&mut storage).unwrap().unwrap(), "apple");
    }

    #[test]
    fn test_store_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir);

        let mut r = ValueRef::new("42".to_string());
        r.store(&mut storage).unwrap();
        let first = r.address();
        r.store(&mut storage).unwrap();
        assert_eq!(r.address(), first);

        let mut next = ValueRef::new("43".to_string());
        next.store(&mut storage).unwrap();
        assert_eq!(next.address(), first + 8 + 2);
    }

    #[test]
    fn test_invalid_utf8_is_corrupted() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir);

        let addr = storage.write(&[0xff, 0xfe]).unwrap();
        let r = ValueRef::from_address(addr);
        assert!(matches!(
            r.get(&mut storage),
            Err(Error::Corrupted { address, .. }) if address == addr
        ));
    }
}
