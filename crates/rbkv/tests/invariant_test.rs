//! Property-based tests for tree invariants.
//!
//! Random insert sequences must keep keys strictly ordered, never leave a
//! red node under a red parent, and keep every root-to-leaf path at the same
//! black height. Rotations and deletes must preserve the in-order sequence.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use rbkv::{Error, NodeRef, Scalar, Storage, StorageConfig, SyncMode, Tree};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Tree {
    let config = StorageConfig::default().with_sync_mode(SyncMode::None);
    let storage = Storage::open(dir.path().join("prop.db"), config).unwrap();
    Tree::new(storage).unwrap()
}

/// Strategy for keys of every supported type, with frequent collisions.
fn key_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        4 => (-50i64..50).prop_map(Scalar::Int),
        2 => (-50i64..50).prop_map(|i| Scalar::Float(i as f64 / 4.0)),
        1 => "[a-e]{1,3}".prop_map(Scalar::from),
    ]
}

/// Walks the subtree checking the red rule and returns its black height.
fn black_height(
    tree: &mut Tree,
    node_ref: &NodeRef,
    parent_red: bool,
) -> Result<usize, TestCaseError> {
    let Some(node) = tree.follow(node_ref).unwrap() else {
        return Ok(1);
    };
    prop_assert!(
        !(parent_red && node.is_red()),
        "red node {} under a red parent",
        node.key()
    );
    let left = black_height(tree, node.left_ref(), node.is_red())?;
    let right = black_height(tree, node.right_ref(), node.is_red())?;
    prop_assert_eq!(left, right, "black heights differ under {}", node.key());
    Ok(left + usize::from(node.is_black()))
}

fn assert_matches_model(
    tree: &mut Tree,
    model: &BTreeMap<Scalar, String>,
) -> Result<(), TestCaseError> {
    let keys = tree.keys().unwrap();
    prop_assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys not strictly increasing");
    prop_assert_eq!(keys.len(), model.len());
    for (key, value) in model {
        prop_assert_eq!(&tree.get(key).unwrap(), value);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Inserts keep the tree ordered and red-black balanced.
    #[test]
    fn test_inserts_keep_invariants(keys in prop::collection::vec(key_strategy(), 1..60)) {
        let dir = TempDir::new().unwrap();
        let mut tree = open(&dir);
        let mut model = BTreeMap::new();

        for (i, key) in keys.into_iter().enumerate() {
            let value = format!("v{}", i);
            tree.set(key.clone(), value.clone()).unwrap();
            model.insert(key, value);
        }

        assert_matches_model(&mut tree, &model)?;
        let root = tree.root_ref().clone();
        black_height(&mut tree, &root, true)?;
    }

    /// Interleaved commits do not change the outcome of an insert sequence.
    #[test]
    fn test_commits_between_inserts(
        keys in prop::collection::vec(-100i64..100, 1..50),
        commit_every in 1usize..10,
    ) {
        let dir = TempDir::new().unwrap();
        let mut tree = open(&dir);
        let mut model = BTreeMap::new();

        for (i, key) in keys.into_iter().enumerate() {
            tree.set(Scalar::Int(key), i.to_string()).unwrap();
            model.insert(Scalar::Int(key), i.to_string());
            if i % commit_every == 0 {
                tree.commit().unwrap();
            }
        }
        tree.commit().unwrap();

        let mut reopened = open(&dir);
        assert_matches_model(&mut reopened, &model)?;
        let root = reopened.root_ref().clone();
        black_height(&mut reopened, &root, true)?;
    }

    /// Deletes remove exactly the requested keys and keep the rest ordered.
    #[test]
    fn test_deletes_match_model(
        keys in prop::collection::vec(-100i64..100, 1..50),
        deletes in prop::collection::vec(-100i64..100, 1..30),
    ) {
        let dir = TempDir::new().unwrap();
        let mut tree = open(&dir);
        let mut model = BTreeMap::new();

        for key in keys {
            tree.set(Scalar::Int(key), key.to_string()).unwrap();
            model.insert(Scalar::Int(key), key.to_string());
        }
        tree.commit().unwrap();

        for key in deletes {
            let key = Scalar::Int(key);
            match tree.delete(&key) {
                Ok(()) => prop_assert!(model.remove(&key).is_some()),
                Err(Error::KeyNotFound(_)) => prop_assert!(!model.contains_key(&key)),
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
        }
        tree.commit().unwrap();

        assert_matches_model(&mut tree, &model)?;
    }

    /// Rotations move nodes around without changing the key order.
    #[test]
    fn test_rotations_preserve_order(
        keys in prop::collection::btree_set(-100i64..100, 1..40),
        picks in prop::collection::vec((any::<prop::sample::Index>(), any::<bool>()), 1..20),
    ) {
        let dir = TempDir::new().unwrap();
        let mut tree = open(&dir);
        let keys: Vec<i64> = keys.into_iter().collect();
        for &key in &keys {
            tree.set(Scalar::Int(key), "x".into()).unwrap();
        }
        let expected = tree.keys().unwrap();

        for (index, left) in picks {
            let key = Scalar::Int(keys[index.index(keys.len())]);
            let result = if left {
                tree.rotate_left(&key)
            } else {
                tree.rotate_right(&key)
            };
            match result {
                Ok(()) | Err(Error::InvalidRotation { .. }) => {}
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
            prop_assert_eq!(tree.keys().unwrap(), expected.clone());
        }
    }
}
