/* This file is part of csmt
 *
 * Copyright (C) 2024-2026 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! The Compact Sparse Merkle Tree engine.
//!
//! The tree stores a leaf directly at the highest position that separates
//! it from every other occupied leaf, so no chain of empty-sibling nodes
//! hangs below a lone occupant. Mutations stage their writes into the
//! store and commit atomically together with the new root.

use log::{debug, trace};
use pasta_curves::{
    group::ff::{PrimeField, PrimeFieldBits},
    pallas,
};

use crate::{
    error::{Error, Result},
    hasher::{count_common_prefix, path_bits, FieldHasher, Poseidon, ToFields, TreeHasher, RIGHT},
    proof::{pad_sentinel, CompactSmtProof, SmtProof},
    store::{MemoryStorage, StorageAdapter},
    SMT_DEPTH,
};

/// Staged mutation applied by [`SparseMerkleTree::update`].
#[derive(Clone, Debug)]
pub enum SmtOp<V> {
    Put(V),
    Delete,
}

/// In-memory tree over the Pallas base field with Poseidon hashing.
pub type MemorySmt<V> = SparseMerkleTree<pallas::Base, Poseidon, MemoryStorage<pallas::Base, V>>;

/// Result of walking the tree along a path, down to the first leaf or
/// empty slot.
struct WalkData<F> {
    /// Sibling hashes in positional order: slot `d` is the sibling node at
    /// depth `d + 1`.
    side_nodes: Vec<F>,
    /// Hashes on the walked spine, terminal node first.
    path_nodes: Vec<F>,
    /// Triple of the terminal leaf, if the walk ended on one.
    leaf_data: Option<[F; 3]>,
    /// Preimage of the deepest sibling, when requested.
    sibling_data: Option<[F; 3]>,
}

/// Authenticated key-value map with compact membership and non-membership
/// proofs.
pub struct SparseMerkleTree<F, H, S, const D: usize = SMT_DEPTH>
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
    S: StorageAdapter<F>,
    S::Value: ToFields<F>,
{
    store: S,
    th: TreeHasher<F, H>,
    root: F,
}

impl<F, H, S, const D: usize> SparseMerkleTree<F, H, S, D>
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
    S: StorageAdapter<F>,
    S::Value: ToFields<F>,
{
    /// Create a tree over `store`. Without an initial root the tree is
    /// empty and its root is the placeholder.
    pub fn new(store: S, hasher: H, root: Option<F>) -> Self {
        let root = root.unwrap_or_else(TreeHasher::<F, H>::placeholder);
        Self { store, th: TreeHasher::new(hasher), root }
    }

    /// Adopt the root persisted in `store`. Errors if none was committed.
    pub fn import_tree(store: S, hasher: H) -> Result<Self> {
        let root = store.get_root()?.ok_or(Error::KeyNotFound)?;
        Ok(Self { store, th: TreeHasher::new(hasher), root })
    }

    pub fn root(&self) -> F {
        self.root
    }

    pub fn depth(&self) -> usize {
        D
    }

    pub fn hasher(&self) -> &H {
        self.th.hasher()
    }

    pub fn tree_hasher(&self) -> &TreeHasher<F, H> {
        &self.th
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Value stored under `key`, if any. Errors on an empty tree.
    pub fn get<K: ToFields<F>>(&self, key: &K) -> Result<Option<S::Value>> {
        if self.root == TreeHasher::<F, H>::placeholder() {
            return Err(Error::KeyNotFound)
        }
        self.store.get_value(&self.th.path(key))
    }

    pub fn has<K: ToFields<F>>(&self, key: &K) -> Result<bool> {
        if self.root == TreeHasher::<F, H>::placeholder() {
            return Ok(false)
        }
        Ok(self.store.get_value(&self.th.path(key))?.is_some())
    }

    /// Apply a single mutation and commit the new root.
    pub fn update<K: ToFields<F>>(&mut self, key: &K, op: SmtOp<S::Value>) -> Result<F> {
        let new_root = match self.stage_update(key, op, self.root) {
            Ok(root) => root,
            Err(e) => {
                self.store.clear_prepared();
                return Err(e)
            }
        };

        if new_root == self.root {
            // Nothing was staged: deleting an absent key or re-inserting
            // an identical value leaves the tree untouched.
            self.store.clear_prepared();
            return Ok(self.root)
        }

        self.finalize(new_root)
    }

    /// Apply a batch of mutations, committing once with the final root.
    pub fn update_all<K: ToFields<F>>(
        &mut self,
        updates: impl IntoIterator<Item = (K, SmtOp<S::Value>)>,
    ) -> Result<F> {
        let mut new_root = self.root;
        for (key, op) in updates {
            new_root = match self.stage_update(&key, op, new_root) {
                Ok(root) => root,
                Err(e) => {
                    self.store.clear_prepared();
                    return Err(e)
                }
            };
        }
        self.finalize(new_root)
    }

    /// `update(key, Delete)`
    pub fn delete<K: ToFields<F>>(&mut self, key: &K) -> Result<F> {
        self.update(key, SmtOp::Delete)
    }

    /// Discard any staged writes and adopt `root` as the committed root.
    pub fn set_root(&mut self, root: F) -> Result<()> {
        self.store.clear_prepared();
        self.store.prepare_update_root(root)?;
        self.store.commit()?;
        self.root = root;
        Ok(())
    }

    /// Empty the backing store and reset the root to the placeholder.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        self.root = TreeHasher::<F, H>::placeholder();
        Ok(())
    }

    /// Membership or non-membership proof for `key` against the current root.
    pub fn prove<K: ToFields<F>>(&self, key: &K) -> Result<SmtProof<F, D>> {
        self.prove_for_root(key, self.root, false)
    }

    /// As [`SparseMerkleTree::prove`], additionally binding the preimage of
    /// the deepest sibling so the proof can seed later updates.
    pub fn prove_updatable<K: ToFields<F>>(&self, key: &K) -> Result<SmtProof<F, D>> {
        self.prove_for_root(key, self.root, true)
    }

    pub fn prove_compact<K: ToFields<F>>(&self, key: &K) -> Result<CompactSmtProof<F, D>> {
        Ok(self.prove(key)?.compact())
    }

    pub fn prove_compact_updatable<K: ToFields<F>>(&self, key: &K) -> Result<CompactSmtProof<F, D>> {
        Ok(self.prove_updatable(key)?.compact())
    }

    /// Stage the new root and commit everything staged so far. The
    /// in-memory root only advances once the store reports success.
    fn finalize(&mut self, new_root: F) -> Result<F> {
        if let Err(e) = self.store.prepare_update_root(new_root) {
            self.store.clear_prepared();
            return Err(e)
        }
        self.store.commit()?;
        debug!(target: "csmt::tree", "committed root {:?}", new_root);
        self.root = new_root;
        Ok(new_root)
    }

    fn fetch_nodes(&self, key: &F) -> Result<[F; 3]> {
        self.store
            .get_nodes(key)?
            .ok_or_else(|| Error::StorageInconsistent(format!("missing node preimage for {key:?}")))
    }

    fn stage_update<K: ToFields<F>>(&mut self, key: &K, op: SmtOp<S::Value>, root: F) -> Result<F> {
        let path = self.th.path(key);
        match op {
            SmtOp::Delete => self.stage_remove(path, root),
            SmtOp::Put(value) => self.stage_insert(path, value, root),
        }
    }

    /// Walk from `root` along `path`. Stops at the first empty slot or at
    /// the leaf absorbing the remaining path.
    fn walk_path(&self, path: F, root: F, with_sibling_data: bool) -> Result<WalkData<F>> {
        let placeholder = TreeHasher::<F, H>::placeholder();
        let mut side_nodes = vec![];
        let mut path_nodes = vec![root];

        if root == placeholder {
            return Ok(WalkData { side_nodes, path_nodes, leaf_data: None, sibling_data: None })
        }

        let mut current = self.fetch_nodes(&root)?;
        if TreeHasher::<F, H>::is_leaf(&current) {
            return Ok(WalkData {
                side_nodes,
                path_nodes,
                leaf_data: Some(current),
                sibling_data: None,
            })
        }

        let bits = path_bits(&path, D);
        let mut leaf_data = None;
        let mut reached_end = false;

        for depth in 0..D {
            let (left, right) = TreeHasher::<F, H>::parse_node(&current);
            let (side, next) =
                if bits[depth] == RIGHT { (left, right) } else { (right, left) };
            side_nodes.push(side);
            path_nodes.push(next);

            if next == placeholder {
                reached_end = true;
                break
            }

            current = self.fetch_nodes(&next)?;
            if TreeHasher::<F, H>::is_leaf(&current) {
                leaf_data = Some(current);
                reached_end = true;
                break
            }
        }

        if !reached_end {
            return Err(Error::StorageInconsistent("tree deeper than the path width".into()))
        }

        path_nodes.reverse();

        let mut sibling_data = None;
        if with_sibling_data {
            if let Some(side) = side_nodes.last() {
                if *side != placeholder {
                    sibling_data = Some(self.fetch_nodes(side)?);
                }
            }
        }

        Ok(WalkData { side_nodes, path_nodes, leaf_data, sibling_data })
    }

    fn stage_insert(&mut self, path: F, value: S::Value, root: F) -> Result<F> {
        let walk = self.walk_path(path, root, false)?;
        let value_hash = self.th.digest(&value);
        let bits = path_bits(&path, D);

        // Number of leading branch bits shared with the occupying leaf;
        // D when the terminal slot is free.
        let mut replaces_leaf = false;
        let common_prefix = match &walk.leaf_data {
            None => D,
            Some(leaf_data) => {
                let (actual_path, old_value_hash) = TreeHasher::<F, H>::parse_leaf(leaf_data);
                if actual_path == path {
                    if old_value_hash == value_hash {
                        trace!(target: "csmt::tree", "insert of unchanged value, skipping");
                        return Ok(root)
                    }
                    replaces_leaf = true;
                    D
                } else {
                    count_common_prefix(&bits, &path_bits(&actual_path, D))
                }
            }
        };

        let (mut cur, leaf_node) = self.th.digest_leaf(path, value_hash);
        self.store.prepare_put_nodes(cur, leaf_node)?;

        if common_prefix != D {
            // The slot is held by a leaf with a different path: pair the
            // two leaves at their divergence point.
            let old_leaf = walk.path_nodes[0];
            let (hash, data) = if bits[common_prefix] == RIGHT {
                self.th.digest_node(old_leaf, cur)
            } else {
                self.th.digest_node(cur, old_leaf)
            };
            self.store.prepare_put_nodes(hash, data)?;
            cur = hash;
        } else if replaces_leaf {
            self.store.prepare_del_nodes(&walk.path_nodes[0])?;
            self.store.prepare_del_value(&path)?;
        }

        // The rest of the walked spine is orphaned by the rebuild.
        for node in walk.path_nodes.iter().skip(1) {
            self.store.prepare_del_nodes(node)?;
        }

        // Close back up to the root.
        let num = walk.side_nodes.len();
        for step in 0..D {
            let depth = D - 1 - step;
            let side = if depth < num {
                walk.side_nodes[depth]
            } else if common_prefix != D && common_prefix > depth {
                // Between the divergence point and the previously shortcut
                // leaf there is nothing on the sibling side.
                TreeHasher::<F, H>::placeholder()
            } else {
                continue
            };

            let (hash, data) = if bits[depth] == RIGHT {
                self.th.digest_node(side, cur)
            } else {
                self.th.digest_node(cur, side)
            };
            self.store.prepare_put_nodes(hash, data)?;
            cur = hash;
        }

        self.store.prepare_put_value(path, value)?;
        Ok(cur)
    }

    fn stage_remove(&mut self, path: F, root: F) -> Result<F> {
        let walk = self.walk_path(path, root, false)?;
        let placeholder = TreeHasher::<F, H>::placeholder();

        // Terminal slot empty, or held by a different key: already absent.
        let Some(leaf_data) = walk.leaf_data else {
            trace!(target: "csmt::tree", "delete of absent key, skipping");
            return Ok(root)
        };
        let (actual_path, _) = TreeHasher::<F, H>::parse_leaf(&leaf_data);
        if actual_path != path {
            trace!(target: "csmt::tree", "delete of absent key, skipping");
            return Ok(root)
        }

        // Every node on the walked spine is orphaned by the removal.
        for node in &walk.path_nodes {
            self.store.prepare_del_nodes(node)?;
        }
        self.store.prepare_del_value(&path)?;

        let bits = path_bits(&path, D);
        let mut cur: Option<F> = None;
        let mut reached_inner = false;

        for depth in (0..walk.side_nodes.len()).rev() {
            let side = walk.side_nodes[depth];

            if cur.is_none() {
                if side == placeholder {
                    continue
                }
                let side_data = self.fetch_nodes(&side)?;
                if TreeHasher::<F, H>::is_leaf(&side_data) {
                    // Lone leaf sibling: hoist it up the emptied spine.
                    cur = Some(side);
                    continue
                }
                // An internal sibling keeps its depth; the emptied slot
                // becomes a placeholder child next to it.
                cur = Some(placeholder);
                reached_inner = true;
            } else if !reached_inner {
                if side == placeholder {
                    // Keep hoisting past empty siblings.
                    continue
                }
                reached_inner = true;
            }

            let combined = cur.unwrap();
            let (hash, data) = if bits[depth] == RIGHT {
                self.th.digest_node(side, combined)
            } else {
                self.th.digest_node(combined, side)
            };
            self.store.prepare_put_nodes(hash, data)?;
            cur = Some(hash);
        }

        // Deleting the last occupant empties the whole tree.
        Ok(cur.unwrap_or(placeholder))
    }

    fn prove_for_root<K: ToFields<F>>(
        &self,
        key: &K,
        root: F,
        updatable: bool,
    ) -> Result<SmtProof<F, D>> {
        let path = self.th.path(key);
        let walk = self.walk_path(path, root, updatable)?;

        let non_membership_leaf_data = match &walk.leaf_data {
            Some(data) if TreeHasher::<F, H>::parse_leaf(data).0 != path => *data,
            _ => TreeHasher::<F, H>::empty_data(),
        };
        let sibling_data = walk.sibling_data.unwrap_or_else(TreeHasher::<F, H>::empty_data);

        let mut side_nodes = [pad_sentinel::<F>(); D];
        for (slot, side) in side_nodes.iter_mut().zip(&walk.side_nodes) {
            *slot = *side;
        }

        Ok(SmtProof { side_nodes, non_membership_leaf_data, sibling_data, root })
    }
}

#[cfg(test)]
mod tests {
    use pasta_curves::group::ff::Field;

    use super::*;

    #[test]
    fn empty_tree_behaviour() {
        let mut tree: MemorySmt<pallas::Base> =
            SparseMerkleTree::new(MemoryStorage::new(), Poseidon::new(), None);
        let key = pallas::Base::from(42);

        assert_eq!(tree.root(), pallas::Base::ZERO);
        assert!(matches!(tree.get(&key), Err(Error::KeyNotFound)));
        assert!(!tree.has(&key).unwrap());

        // Deleting from an empty tree is a no-op.
        assert_eq!(tree.delete(&key).unwrap(), pallas::Base::ZERO);
        assert_eq!(tree.store().nodes_len(), 0);
    }

    #[test]
    fn import_requires_persisted_root() {
        let store = MemoryStorage::<pallas::Base, pallas::Base>::new();
        assert!(matches!(
            MemorySmt::<pallas::Base>::import_tree(store, Poseidon::new()),
            Err(Error::KeyNotFound)
        ));
    }

    #[test]
    fn single_leaf_is_the_root() {
        let mut tree: MemorySmt<pallas::Base> =
            SparseMerkleTree::new(MemoryStorage::new(), Poseidon::new(), None);
        let (key, value) = (pallas::Base::from(1), pallas::Base::from(2));

        let root = tree.update(&key, SmtOp::Put(value)).unwrap();

        // The lone leaf is stored directly at the root, no inner nodes.
        let th = tree.tree_hasher();
        let value_hash = th.digest(&value);
        let (leaf_hash, _) = th.digest_leaf(key, value_hash);
        assert_eq!(root, leaf_hash);
        assert_eq!(tree.store().nodes_len(), 1);
        assert_eq!(tree.get(&key).unwrap(), Some(value));
    }

    #[test]
    fn set_root_adopts_and_persists() {
        let mut tree: MemorySmt<pallas::Base> =
            SparseMerkleTree::new(MemoryStorage::new(), Poseidon::new(), None);
        let root = pallas::Base::from(123);
        tree.set_root(root).unwrap();
        assert_eq!(tree.root(), root);
        assert_eq!(tree.store().get_root().unwrap(), Some(root));
    }
}
