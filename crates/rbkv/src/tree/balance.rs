//! Post-insert rebalancing.
//!
//! Violations are judged from a black node looking at its red children. A
//! red child with a red child of its own is fixed by recoloring when the
//! other child (the uncle of the offending node) is also red, and by one or
//! two rotations otherwise.
//!
//! Since nodes are immutable, a fix produces a new subtree head which is
//! spliced back into the tree by rebuilding the path from the root. Nodes are
//! tracked by key across fixes because every fix replaces node identities.

use super::{not_found, Node, NodeRef, Side, Tree};
use crate::error::{Error, Result};
use crate::scalar::Scalar;

impl Tree {
    /// Rebalances the subtree held by `node_ref`, which must be reachable
    /// from the current root.
    ///
    /// Returns `true` if a recolor or rotation was applied.
    pub fn balance(&mut self, node_ref: &NodeRef) -> Result<bool> {
        let Some(node) = self.follow(node_ref)? else {
            return Ok(false);
        };
        match self.balanced(&node)? {
            Some(head) => {
                self.splice(node.key(), NodeRef::from_node(head))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rotates the node with `key` to the left; its right child takes its
    /// place.
    pub fn rotate_left(&mut self, key: &Scalar) -> Result<()> {
        let node = self.find(key)?;
        let head = self.rotated(&node, Side::Left)?;
        self.splice(key, NodeRef::from_node(head))
    }

    /// Rotates the node with `key` to the right; its left child takes its
    /// place.
    pub fn rotate_right(&mut self, key: &Scalar) -> Result<()> {
        let node = self.find(key)?;
        let head = self.rotated(&node, Side::Right)?;
        self.splice(key, NodeRef::from_node(head))
    }

    /// Walks from the node with `key` up to the root, balancing the branch
    /// that contains `key` at every level.
    pub(crate) fn update(&mut self, key: &Scalar) -> Result<()> {
        let mut current = key.clone();
        loop {
            let Some((parent, _)) = self.locate(&current)?.1 else {
                break;
            };
            let parent_key = parent.key().clone();
            self.balance_toward(&current, key)?;
            self.balance_toward(&parent_key, key)?;
            current = parent_key;
        }
        self.balance_toward(&current, key)?;
        let root = self.root.clone();
        self.balance(&root)?;
        Ok(())
    }

    /// Balances the child of the node `at` on the side where `key` lives.
    fn balance_toward(&mut self, at: &Scalar, key: &Scalar) -> Result<bool> {
        let node = self.find(at)?;
        let side = if key < node.key() {
            Side::Left
        } else {
            Side::Right
        };
        self.balance(node.child_ref(side))
    }

    /// The fixed subtree head for `node`, or `None` if nothing fires.
    fn balanced(&mut self, node: &Node) -> Result<Option<Node>> {
        if node.is_red() {
            return Ok(None);
        }

        for side in [Side::Left, Side::Right] {
            let child = match self.follow(node.child_ref(side))? {
                Some(child) if child.is_red() => child,
                _ => continue,
            };
            let outer_red = self.is_red_at(child.child_ref(side))?;
            let inner_red = self.is_red_at(child.child_ref(side.opposite()))?;
            if !outer_red && !inner_red {
                continue;
            }

            if self.is_red_at(node.child_ref(side.opposite()))? {
                return self.recolored(node).map(Some);
            }

            let head = if outer_red {
                self.rotated(node, side.opposite())?
            } else {
                let pivot = self.rotated(&child, side)?;
                let node = node.with_child(side, NodeRef::from_node(pivot));
                self.rotated(&node, side.opposite())?
            };

            // The original node sank to the far side of the new head.
            let sunk = side.opposite();
            let demoted = self
                .follow(head.child_ref(sunk))?
                .ok_or_else(|| not_found(node.key()))?;
            let head = head
                .with_child(sunk, NodeRef::from_node(demoted.redden()))
                .blacken();
            return Ok(Some(head));
        }

        Ok(None)
    }

    fn is_red_at(&mut self, node_ref: &NodeRef) -> Result<bool> {
        Ok(self.follow(node_ref)?.map_or(false, |node| node.is_red()))
    }

    /// Red node with both children black.
    fn recolored(&mut self, node: &Node) -> Result<Node> {
        let left = self.blackened(node.left_ref())?;
        let right = self.blackened(node.right_ref())?;
        Ok(node.with_left(left).with_right(right).redden())
    }

    fn blackened(&mut self, node_ref: &NodeRef) -> Result<NodeRef> {
        Ok(match self.follow(node_ref)? {
            Some(node) if node.is_red() => NodeRef::from_node(node.blacken()),
            _ => node_ref.clone(),
        })
    }

    /// Single rotation moving `node` down towards `direction`. Colors are
    /// left untouched.
    fn rotated(&mut self, node: &Node, direction: Side) -> Result<Node> {
        let rising = direction.opposite();
        let pivot = self
            .follow(node.child_ref(rising))?
            .ok_or_else(|| Error::InvalidRotation {
                key: node.key().to_string(),
                direction: match direction {
                    Side::Left => "left",
                    Side::Right => "right",
                },
            })?;
        let lowered = node.with_child(rising, pivot.child_ref(direction).clone());
        Ok(pivot.with_child(direction, NodeRef::from_node(lowered)))
    }

    /// Replaces the subtree whose head has `key`, repointing the parent slot
    /// or the root, and rebuilds the path above it.
    fn splice(&mut self, key: &Scalar, subtree: NodeRef) -> Result<()> {
        let root = self.root.clone();
        self.root = self.spliced(&root, key, subtree)?;
        Ok(())
    }

    fn spliced(&mut self, at: &NodeRef, key: &Scalar, subtree: NodeRef) -> Result<NodeRef> {
        let node = self.follow(at)?.ok_or_else(|| not_found(key))?;
        let side = match key.cmp(node.key()) {
            std::cmp::Ordering::Equal => return Ok(subtree),
            std::cmp::Ordering::Less => Side::Left,
            std::cmp::Ordering::Greater => Side::Right,
        };
        let child = self.spliced(node.child_ref(side), key, subtree)?;
        Ok(NodeRef::from_node(node.with_child(side, child)))
    }
}
