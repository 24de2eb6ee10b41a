//! Copy-on-write red-black tree over append-only storage.
//!
//! Nodes are immutable and addressed by file offset. Every mutation rebuilds
//! the path from the root down to the changed node and shares every untouched
//! subtree with the previous version. A version becomes current only when
//! [`Tree::commit`] publishes its root address.
//!
//! Nodes carry no parent pointers; a node's parent is found by descending
//! from the root.

mod balance;
pub mod node;
pub mod reference;

pub use node::{Color, Node};
pub use reference::{NodeRef, Ref, Referent, ValueRef};

use crate::error::{Error, Result};
use crate::scalar::Scalar;
use crate::storage::Storage;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Which child slot of a parent holds a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left child.
    Left,
    /// Right child.
    Right,
}

impl Side {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

fn not_found(key: &Scalar) -> Error {
    Error::KeyNotFound(key.to_string())
}

/// Red-black tree rooted at a single reference.
pub struct Tree {
    storage: Storage,
    root: NodeRef,
}

impl Tree {
    /// Creates a tree over `storage`, starting at its published root.
    pub fn new(storage: Storage) -> Result<Self> {
        let mut tree = Self {
            storage,
            root: NodeRef::empty(),
        };
        tree.refresh_root()?;
        Ok(tree)
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub(crate) fn into_storage(self) -> Storage {
        self.storage
    }

    /// Reference to the current (possibly uncommitted) root.
    pub fn root_ref(&self) -> &NodeRef {
        &self.root
    }

    /// Resolves the current root node.
    pub fn root(&mut self) -> Result<Option<Arc<Node>>> {
        Ok(self.root.get(&mut self.storage)?.cloned())
    }

    /// Resolves a node reference against this tree's storage.
    pub fn follow(&mut self, node_ref: &NodeRef) -> Result<Option<Arc<Node>>> {
        Ok(node_ref.get(&mut self.storage)?.cloned())
    }

    /// Reloads the published root. Resolved nodes are kept while the address
    /// is unchanged, since stored records never change.
    fn refresh_root(&mut self) -> Result<()> {
        let address = self.storage.get_root_address()?;
        if address != self.root.address() || self.root.is_dirty() {
            self.root = NodeRef::from_address(address);
        }
        Ok(())
    }

    /// Picks up commits made by other sessions unless this one is writing.
    fn refresh_if_unlocked(&mut self) -> Result<()> {
        if !self.storage.is_locked() {
            self.refresh_root()?;
        }
        Ok(())
    }

    /// Returns true if the tree has no nodes.
    pub fn is_empty(&mut self) -> Result<bool> {
        self.refresh_if_unlocked()?;
        Ok(self.root()?.is_none())
    }

    /// Color of the root node, `None` for an empty tree.
    pub fn root_color(&mut self) -> Result<Option<Color>> {
        self.refresh_if_unlocked()?;
        Ok(self.root()?.map(|root| root.color()))
    }

    /// Looks up the stored text for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is absent.
    pub fn get(&mut self, key: &Scalar) -> Result<String> {
        self.refresh_if_unlocked()?;
        let node = self.find(key)?;
        node.value_ref()
            .get(&mut self.storage)?
            .cloned()
            .ok_or_else(|| Error::corrupted(node.value_ref().address(), "node has no value"))
    }

    /// Returns the reference that holds the node with `key`.
    pub fn get_ref(&mut self, key: &Scalar) -> Result<NodeRef> {
        self.refresh_if_unlocked()?;
        match self.locate(key)? {
            (_, None) => Ok(self.root.clone()),
            (_, Some((parent, side))) => Ok(parent.child_ref(side).clone()),
        }
    }

    /// Returns the parent of the node with `key` and the side it hangs on,
    /// or `None` if that node is the root.
    pub fn get_parent(&mut self, key: &Scalar) -> Result<Option<(Arc<Node>, Side)>> {
        self.refresh_if_unlocked()?;
        Ok(self.locate(key)?.1)
    }

    /// All keys in order.
    pub fn keys(&mut self) -> Result<Vec<Scalar>> {
        self.refresh_if_unlocked()?;
        let mut keys = Vec::new();
        let mut stack = Vec::new();
        let mut current = self.root()?;
        loop {
            while let Some(node) = current {
                current = self.follow(node.left_ref())?;
                stack.push(node);
            }
            match stack.pop() {
                Some(node) => {
                    keys.push(node.key().clone());
                    current = self.follow(node.right_ref())?;
                }
                None => break,
            }
        }
        Ok(keys)
    }

    pub(crate) fn find(&mut self, key: &Scalar) -> Result<Arc<Node>> {
        let mut current = self.root()?;
        while let Some(node) = current {
            current = match key.cmp(node.key()) {
                Ordering::Less => self.follow(node.left_ref())?,
                Ordering::Greater => self.follow(node.right_ref())?,
                Ordering::Equal => return Ok(node),
            };
        }
        Err(not_found(key))
    }

    /// Finds the node with `key` together with its parent, if any.
    pub(crate) fn locate(
        &mut self,
        key: &Scalar,
    ) -> Result<(Arc<Node>, Option<(Arc<Node>, Side)>)> {
        let mut node = self.root()?.ok_or_else(|| not_found(key))?;
        let mut parent = None;
        loop {
            let side = match key.cmp(node.key()) {
                Ordering::Equal => return Ok((node, parent)),
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
            };
            let child = self
                .follow(node.child_ref(side))?
                .ok_or_else(|| not_found(key))?;
            parent = Some((node, side));
            node = child;
        }
    }

    /// Inserts or overwrites `key`.
    ///
    /// Takes the write lock and, when it was not already held, starts from
    /// the latest committed root. The new path is rebalanced and the root
    /// forced black.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] for a string key longer than
    /// `u32::MAX` bytes; nothing is written in that case.
    pub fn set(&mut self, key: Scalar, value: String) -> Result<()> {
        node::check_key(&key)?;
        if self.storage.lock()? {
            self.refresh_root()?;
        }
        let root = self.root.clone();
        self.root = self.insert(&root, &key, ValueRef::new(value))?;
        self.update(&key)?;
        self.blacken_root()
    }

    fn insert(&mut self, at: &NodeRef, key: &Scalar, value_ref: ValueRef) -> Result<NodeRef> {
        let Some(node) = self.follow(at)? else {
            return Ok(NodeRef::from_node(Node::leaf(key.clone(), value_ref)));
        };
        let new_node = match key.cmp(node.key()) {
            Ordering::Less => node.with_left(self.insert(node.left_ref(), key, value_ref)?),
            Ordering::Greater => node.with_right(self.insert(node.right_ref(), key, value_ref)?),
            Ordering::Equal => node.with_value(value_ref),
        };
        Ok(NodeRef::from_node(new_node))
    }

    fn blacken_root(&mut self) -> Result<()> {
        if let Some(root) = self.root()? {
            if root.is_red() {
                self.root = NodeRef::from_node(root.blacken());
            }
        }
        Ok(())
    }

    /// Removes `key`.
    ///
    /// A node with two children takes over its in-order predecessor's key
    /// and value and keeps its own color, so removing the root of a
    /// committed tree never leaves a red root. The tree is not rebalanced
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is absent; the tree is left
    /// unchanged.
    pub fn delete(&mut self, key: &Scalar) -> Result<()> {
        if self.storage.lock()? {
            self.refresh_root()?;
        }
        let root = self.root.clone();
        self.root = self.remove(&root, key)?;
        debug!("Deleted key {}", key);
        Ok(())
    }

    fn remove(&mut self, at: &NodeRef, key: &Scalar) -> Result<NodeRef> {
        let node = self.follow(at)?.ok_or_else(|| not_found(key))?;
        let new_node = match key.cmp(node.key()) {
            Ordering::Less => node.with_left(self.remove(node.left_ref(), key)?),
            Ordering::Greater => node.with_right(self.remove(node.right_ref(), key)?),
            Ordering::Equal => {
                let left = self.follow(node.left_ref())?;
                let right = self.follow(node.right_ref())?;
                match (left, right) {
                    (Some(left), Some(_)) => {
                        let replacement = self.find_max(left)?;
                        let left_ref = self.remove(node.left_ref(), replacement.key())?;
                        node.with_key_value(
                            replacement.key().clone(),
                            replacement.value_ref().clone(),
                        )
                        .with_left(left_ref)
                    }
                    (Some(_), None) => return Ok(node.left_ref().clone()),
                    (None, _) => return Ok(node.right_ref().clone()),
                }
            }
        };
        Ok(NodeRef::from_node(new_node))
    }

    /// Rightmost node of the subtree rooted at `node`.
    pub(crate) fn find_max(&mut self, mut node: Arc<Node>) -> Result<Arc<Node>> {
        while let Some(next) = self.follow(node.right_ref())? {
            node = next;
        }
        Ok(node)
    }

    /// Persists every unstored node reachable from the root, then publishes
    /// the root address.
    pub fn commit(&mut self) -> Result<()> {
        self.root.store(&mut self.storage)?;
        self.storage.commit_root_address(self.root.address())?;
        debug!("Committed tree with root address {}", self.root.address());
        Ok(())
    }
}
