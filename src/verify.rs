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

//! Host-side proof verification.

use pasta_curves::group::ff::{PrimeField, PrimeFieldBits};

use crate::{
    hasher::{path_bits, FieldHasher, ToFields, TreeHasher, RIGHT},
    proof::SmtProof,
};

/// Per-level `(hash, triple)` trace emitted while re-deriving the root.
/// Feeding it back into a store reconstructs the proven branch.
pub type UpdateTrace<F> = Vec<(F, [F; 3])>;

/// Verify `proof` against `root` for `key`. `Some(value)` claims
/// membership, `None` claims non-membership.
pub fn verify_proof<F, H, K, V, const D: usize>(
    th: &TreeHasher<F, H>,
    proof: &SmtProof<F, D>,
    root: F,
    key: &K,
    value: Option<&V>,
) -> bool
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
    K: ToFields<F>,
    V: ToFields<F>,
{
    verify_proof_with_updates(th, proof, root, key, value).0
}

/// As [`verify_proof`], additionally returning the branch trace.
pub fn verify_proof_with_updates<F, H, K, V, const D: usize>(
    th: &TreeHasher<F, H>,
    proof: &SmtProof<F, D>,
    root: F,
    key: &K,
    value: Option<&V>,
) -> (bool, UpdateTrace<F>)
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
    K: ToFields<F>,
    V: ToFields<F>,
{
    let path = th.path(key);
    let mut updates = vec![];

    let mut cur = match value {
        // Membership: the leaf binds our path to the claimed value.
        Some(value) => {
            let value_hash = th.digest(value);
            let (hash, data) = th.digest_leaf(path, value_hash);
            updates.push((hash, data));
            hash
        }
        // Non-membership: the terminal slot is either empty or occupied
        // by a leaf with a different path.
        None => {
            if TreeHasher::<F, H>::is_empty_data(&proof.non_membership_leaf_data) {
                TreeHasher::<F, H>::placeholder()
            } else {
                let (actual_path, value_hash) =
                    TreeHasher::<F, H>::parse_leaf(&proof.non_membership_leaf_data);
                if actual_path == path {
                    // The slot holds our own path: the claim is contradicted.
                    return (false, vec![])
                }
                let (hash, data) = th.digest_leaf(actual_path, value_hash);
                updates.push((hash, data));
                hash
            }
        }
    };

    let bits = path_bits(&path, D);
    let num = proof.num_side_nodes();
    for depth in (0..num).rev() {
        let side = proof.side_nodes[depth];
        let (hash, data) = if bits[depth] == RIGHT {
            th.digest_node(side, cur)
        } else {
            th.digest_node(cur, side)
        };
        updates.push((hash, data));
        cur = hash;
    }

    (cur == root, updates)
}
