//! rbkv - Persistent Red-Black Tree Key-Value Store
//!
//! This crate stores an ordered map in a single append-only file. The map is
//! a red-black tree whose nodes are immutable records; each commit appends
//! the changed path and then publishes a new root address in the file's
//! superblock.
//!
//! # Components
//!
//! - [`Storage`]: Append-only record file with a root-address superblock
//! - [`Tree`]: Copy-on-write red-black tree over lazily loaded nodes
//! - [`Database`]: Handle restricting keys and values to [`Scalar`]s
//!
//! # Example
//!
//! ```rust,no_run
//! use rbkv::Scalar;
//!
//! let mut db = rbkv::connect("/tmp/example.db")?;
//! db.set(1, 10)?;
//! db.set("apple", 4.5)?;
//! db.commit()?;
//!
//! assert_eq!(db.get(1)?, Scalar::Int(10));
//! db.close()?;
//! # Ok::<(), rbkv::Error>(())
//! ```

#![deny(missing_docs)]

pub mod db;
pub mod error;
pub mod scalar;
pub mod storage;
pub mod tree;

pub use db::{connect, Database};
pub use error::{Error, Result};
pub use scalar::Scalar;
pub use storage::{Address, Storage, StorageConfig, SyncMode};
pub use tree::{Color, Node, NodeRef, Side, Tree, ValueRef};
