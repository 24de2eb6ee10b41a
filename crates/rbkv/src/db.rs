//! Database handle restricting keys and values to [`Scalar`]s.
//!
//! A [`Database`] owns one [`Tree`] over one file. Values are written as
//! their canonical text and read back through [`Scalar::from_text`], so a
//! string value that looks like a number comes back as that number.

use crate::error::{Error, Result};
use crate::scalar::Scalar;
use crate::storage::{Storage, StorageConfig};
use crate::tree::Tree;
use std::path::Path;
use tracing::debug;

/// Opens or creates the database at `path` with the default configuration.
pub fn connect(path: impl AsRef<Path>) -> Result<Database> {
    Database::connect(path)
}

/// A key-value database backed by a single file.
pub struct Database {
    tree: Option<Tree>,
}

impl Database {
    /// Opens or creates the database at `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_config(path, StorageConfig::default())
    }

    /// Opens or creates the database at `path` with a custom configuration.
    pub fn connect_with_config(path: impl AsRef<Path>, config: StorageConfig) -> Result<Self> {
        let storage = Storage::open(path, config)?;
        debug!("Connected to {}", storage.path().display());
        Ok(Self {
            tree: Some(Tree::new(storage)?),
        })
    }

    fn tree(&mut self) -> Result<&mut Tree> {
        self.tree.as_mut().ok_or(Error::Closed)
    }

    /// Returns true once [`Database::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.tree.is_none()
    }

    /// Looks up `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is absent, or
    /// [`Error::InvalidType`] if `key` is not a supported scalar.
    pub fn get<K>(&mut self, key: K) -> Result<Scalar>
    where
        K: TryInto<Scalar>,
        Error: From<K::Error>,
    {
        let tree = self.tree()?;
        let key = convert(key, "key")?;
        let text = tree.get(&key)?;
        Ok(Scalar::from_text(&text))
    }

    /// Inserts or overwrites `key`. The change is visible to this handle
    /// right away and to others after [`Database::commit`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if the key or value is not a supported
    /// scalar; nothing is written in that case.
    pub fn set<K, V>(&mut self, key: K, value: V) -> Result<()>
    where
        K: TryInto<Scalar>,
        V: TryInto<Scalar>,
        Error: From<K::Error> + From<V::Error>,
    {
        let tree = self.tree()?;
        let key = convert(key, "key")?;
        let value = convert(value, "value")?;
        tree.set(key, value.to_text())
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is absent.
    pub fn delete<K>(&mut self, key: K) -> Result<()>
    where
        K: TryInto<Scalar>,
        Error: From<K::Error>,
    {
        let tree = self.tree()?;
        let key = convert(key, "key")?;
        tree.delete(&key)
    }

    /// Persists pending changes and publishes them.
    pub fn commit(&mut self) -> Result<()> {
        self.tree()?.commit()
    }

    /// Closes the file, discarding uncommitted changes.
    ///
    /// Every later call on this handle fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let tree = self.tree.take().ok_or(Error::Closed)?;
        let storage = tree.into_storage();
        debug!("Closing {}", storage.path().display());
        storage.close()
    }
}

fn convert<T>(raw: T, role: &'static str) -> Result<Scalar>
where
    T: TryInto<Scalar>,
    Error: From<T::Error>,
{
    raw.try_into().map_err(|e| match Error::from(e) {
        Error::InvalidType { reason, .. } => Error::InvalidType { role, reason },
        other => other,
    })
}
