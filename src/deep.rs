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

//! Proof-seeded partial tree.
//!
//! A deep sub-tree starts from a trusted root and ingests verified
//! branches. Once the branches of every key about to change have been
//! added, the sub-tree proves and updates those keys like a full tree,
//! without ever holding the complete node set.

use std::ops::{Deref, DerefMut};

use log::debug;
use pasta_curves::group::ff::{PrimeField, PrimeFieldBits};

use crate::{
    error::{Error, Result},
    hasher::{FieldHasher, ToFields, TreeHasher},
    proof::SmtProof,
    store::StorageAdapter,
    tree::SparseMerkleTree,
    verify::verify_proof_with_updates,
    SMT_DEPTH,
};

/// Partial tree over a proof-covered subset of another tree's keys.
pub struct DeepSparseMerkleSubTree<F, H, S, const D: usize = SMT_DEPTH>
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
    S: StorageAdapter<F>,
    S::Value: ToFields<F>,
{
    tree: SparseMerkleTree<F, H, S, D>,
}

impl<F, H, S, const D: usize> DeepSparseMerkleSubTree<F, H, S, D>
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
    S: StorageAdapter<F>,
    S::Value: ToFields<F>,
{
    /// Seed an empty sub-tree anchored at `root`.
    pub fn new(store: S, hasher: H, root: F) -> Self {
        Self { tree: SparseMerkleTree::new(store, hasher, Some(root)) }
    }

    /// Verify a branch against the current root and ingest its nodes.
    ///
    /// `Some(value)` ingests a membership branch together with the stored
    /// value, `None` a non-membership branch. An updatable proof
    /// additionally binds the preimage of its deepest sibling, letting
    /// later walks descend below that sibling.
    pub fn add_branch<K: ToFields<F>>(
        &mut self,
        proof: &SmtProof<F, D>,
        key: &K,
        value: Option<S::Value>,
    ) -> Result<()> {
        let (ok, updates) = verify_proof_with_updates(
            self.tree.tree_hasher(),
            proof,
            self.tree.root(),
            key,
            value.as_ref(),
        );
        if !ok {
            return Err(Error::BadProof)
        }

        let path = self.tree.tree_hasher().path(key);
        let res = self.stage_branch(proof, path, value, updates);
        if res.is_err() {
            self.tree.store_mut().clear_prepared();
            return res
        }
        self.tree.store_mut().commit()?;

        debug!(target: "csmt::deep", "ingested branch for path {path:?}");
        Ok(())
    }

    fn stage_branch(
        &mut self,
        proof: &SmtProof<F, D>,
        path: F,
        value: Option<S::Value>,
        updates: Vec<(F, [F; 3])>,
    ) -> Result<()> {
        let store = self.tree.store_mut();

        if let Some(value) = value {
            store.prepare_put_value(path, value)?;
        }

        for (hash, data) in updates {
            store.prepare_put_nodes(hash, data)?;
        }

        // Bind the deepest sibling's preimage so walks can descend into it.
        if !TreeHasher::<F, H>::is_empty_data(&proof.sibling_data) {
            let num = proof.num_side_nodes();
            if num > 0 {
                store.prepare_put_nodes(proof.side_nodes[num - 1], proof.sibling_data)?;
            }
        }

        Ok(())
    }
}

impl<F, H, S, const D: usize> Deref for DeepSparseMerkleSubTree<F, H, S, D>
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
    S: StorageAdapter<F>,
    S::Value: ToFields<F>,
{
    type Target = SparseMerkleTree<F, H, S, D>;

    fn deref(&self) -> &Self::Target {
        &self.tree
    }
}

impl<F, H, S, const D: usize> DerefMut for DeepSparseMerkleSubTree<F, H, S, D>
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
    S: StorageAdapter<F>,
    S::Value: ToFields<F>,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tree
    }
}
