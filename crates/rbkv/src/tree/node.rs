//! Immutable tree nodes and their on-disk record format.
//!
//! ## Node Record Layout (big-endian)
//!
//! ```text
//! Offset  Size   Field
//! 0x00    8      left address (u64)
//! 0x08    1      key tag (0 = i64, 1 = f64, 2 = string)
//! 0x09    8|4+N  key: i64 / f64 bits, or u32 length + UTF-8 bytes
//! ...     8      value address (u64)
//! ...     8      right address (u64)
//! ...     1      color (0 = red, 1 = black)
//! ```

use crate::error::{Error, Result};
use crate::scalar::Scalar;
use crate::storage::{Address, Storage};
use crate::tree::reference::{NodeRef, ValueRef};
use crate::tree::Side;

const KEY_TAG_INT: u8 = 0;
const KEY_TAG_FLOAT: u8 = 1;
const KEY_TAG_STR: u8 = 2;

/// Length of a string key as stored in its `u32` prefix.
fn str_key_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::InvalidType {
        role: "key",
        reason: format!("string key of {} bytes exceeds {} bytes", len, u32::MAX),
    })
}

/// Rejects keys the node record cannot hold.
pub(crate) fn check_key(key: &Scalar) -> Result<()> {
    match key {
        Scalar::Str(s) => str_key_len(s.len()).map(|_| ()),
        Scalar::Int(_) | Scalar::Float(_) => Ok(()),
    }
}

/// Node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    /// Red node.
    Red = 0,
    /// Black node.
    Black = 1,
}

impl Color {
    /// Creates a Color from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Red),
            1 => Some(Self::Black),
            _ => None,
        }
    }
}

/// A tree node.
///
/// Nodes are never modified once built: the `with_*` methods return a copy
/// with selected fields replaced, which the caller wraps in a fresh
/// [`NodeRef`].
#[derive(Debug, Clone)]
pub struct Node {
    left_ref: NodeRef,
    key: Scalar,
    value_ref: ValueRef,
    right_ref: NodeRef,
    color: Color,
}

impl Node {
    /// Creates a node.
    pub fn new(
        left_ref: NodeRef,
        key: Scalar,
        value_ref: ValueRef,
        right_ref: NodeRef,
        color: Color,
    ) -> Self {
        Self {
            left_ref,
            key,
            value_ref,
            right_ref,
            color,
        }
    }

    /// Creates a red node without children.
    pub fn leaf(key: Scalar, value_ref: ValueRef) -> Self {
        Self::new(NodeRef::empty(), key, value_ref, NodeRef::empty(), Color::Red)
    }

    /// The node's key.
    pub fn key(&self) -> &Scalar {
        &self.key
    }

    /// Reference to the node's value.
    pub fn value_ref(&self) -> &ValueRef {
        &self.value_ref
    }

    /// Reference to the left subtree.
    pub fn left_ref(&self) -> &NodeRef {
        &self.left_ref
    }

    /// Reference to the right subtree.
    pub fn right_ref(&self) -> &NodeRef {
        &self.right_ref
    }

    /// Reference to the subtree on `side`.
    pub fn child_ref(&self, side: Side) -> &NodeRef {
        match side {
            Side::Left => &self.left_ref,
            Side::Right => &self.right_ref,
        }
    }

    /// The node's color.
    pub fn color(&self) -> Color {
        self.color
    }

    /// Copy with the left subtree replaced.
    pub fn with_left(&self, left_ref: NodeRef) -> Self {
        Self {
            left_ref,
            ..self.clone()
        }
    }

    /// Copy with the right subtree replaced.
    pub fn with_right(&self, right_ref: NodeRef) -> Self {
        Self {
            right_ref,
            ..self.clone()
        }
    }

    /// Copy with the subtree on `side` replaced.
    pub fn with_child(&self, side: Side, child: NodeRef) -> Self {
        match side {
            Side::Left => self.with_left(child),
            Side::Right => self.with_right(child),
        }
    }

    /// Copy with the value replaced.
    pub fn with_value(&self, value_ref: ValueRef) -> Self {
        Self {
            value_ref,
            ..self.clone()
        }
    }

    /// Copy carrying another entry's key and value.
    pub fn with_key_value(&self, key: Scalar, value_ref: ValueRef) -> Self {
        Self {
            key,
            value_ref,
            ..self.clone()
        }
    }

    /// Copy with the color replaced.
    pub fn with_color(&self, color: Color) -> Self {
        Self {
            color,
            ..self.clone()
        }
    }

    /// Black copy of this node.
    pub fn blacken(&self) -> Self {
        self.with_color(Color::Black)
    }

    /// Red copy of this node.
    pub fn redden(&self) -> Self {
        self.with_color(Color::Red)
    }

    /// Returns true if the node is black.
    pub fn is_black(&self) -> bool {
        self.color == Color::Black
    }

    /// Returns true if the node is red.
    pub fn is_red(&self) -> bool {
        self.color == Color::Red
    }

    /// Stores the value, then the left subtree, then the right subtree, so
    /// the node's own encoding can embed their final addresses.
    pub(crate) fn store_refs(&mut self, storage: &mut Storage) -> Result<()> {
        self.value_ref.store(storage)?;
        self.left_ref.store(storage)?;
        self.right_ref.store(storage)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(34);
        bytes.extend_from_slice(&self.left_ref.address().to_be_bytes());
        match &self.key {
            Scalar::Int(i) => {
                bytes.push(KEY_TAG_INT);
                bytes.extend_from_slice(&i.to_be_bytes());
            }
            Scalar::Float(f) => {
                bytes.push(KEY_TAG_FLOAT);
                bytes.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Scalar::Str(s) => {
                bytes.push(KEY_TAG_STR);
                bytes.extend_from_slice(&str_key_len(s.len())?.to_be_bytes());
                bytes.extend_from_slice(s.as_bytes());
            }
        }
        bytes.extend_from_slice(&self.value_ref.address().to_be_bytes());
        bytes.extend_from_slice(&self.right_ref.address().to_be_bytes());
        bytes.push(self.color as u8);
        Ok(bytes)
    }

    /// Rebuilds a node whose children and value are unresolved references.
    pub(crate) fn decode(bytes: &[u8], address: Address) -> Result<Self> {
        let mut cursor = Cursor {
            bytes,
            pos: 0,
            address,
        };

        let left = cursor.u64()?;
        let key = match cursor.u8()? {
            KEY_TAG_INT => Scalar::Int(cursor.u64()? as i64),
            KEY_TAG_FLOAT => Scalar::Float(f64::from_bits(cursor.u64()?)),
            KEY_TAG_STR => {
                let len = cursor.u32()? as usize;
                let raw = cursor.take(len)?;
                let s = std::str::from_utf8(raw)
                    .map_err(|e| Error::corrupted(address, format!("key is not UTF-8: {}", e)))?;
                Scalar::Str(s.to_string())
            }
            tag => return Err(Error::corrupted(address, format!("unknown key tag {}", tag))),
        };
        let value = cursor.u64()?;
        let right = cursor.u64()?;
        let color_byte = cursor.u8()?;
        let color = Color::from_u8(color_byte).ok_or_else(|| {
            Error::corrupted(address, format!("unknown color byte {}", color_byte))
        })?;

        if cursor.pos != bytes.len() {
            return Err(Error::corrupted(
                address,
                format!("{} trailing bytes in node record", bytes.len() - cursor.pos),
            ));
        }

        Ok(Self::new(
            NodeRef::from_address(left),
            key,
            ValueRef::from_address(value),
            NodeRef::from_address(right),
            color,
        ))
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    address: Address,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::corrupted(self.address, "truncated node record"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }
}
