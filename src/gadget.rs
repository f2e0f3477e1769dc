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

//! In-circuit proof verification.
//!
//! [`verify_gadget`] re-expresses the host verifier as a fixed-length
//! sequence of field operations against the [`CircuitBuilder`] capability
//! interface: every data-dependent branch becomes a conditional selection,
//! and the side-node loop always runs the full `D` steps, folding PAD
//! slots through selection instead of exiting early. A proving framework
//! supplies the interface; [`WitnessBuilder`] is the native instantiation
//! used to cross-check circuit and host verdicts.

use std::marker::PhantomData;

use pasta_curves::group::ff::{PrimeField, PrimeFieldBits};

use crate::{
    hasher::{FieldHasher, EMPTY_TAG, LEAF_TAG},
    proof::pad_sentinel,
};

/// Operations a constraint system has to provide for proof verification:
/// field constants, the arity-3 algebraic hash, equality, boolean algebra,
/// conditional selection and fixed-width bit decomposition.
pub trait CircuitBuilder<F: PrimeField> {
    type Var: Clone;
    type Bool: Clone;

    fn constant(&mut self, value: F) -> Self::Var;
    fn hash3(&mut self, messages: [Self::Var; 3]) -> Self::Var;
    fn is_equal(&mut self, a: &Self::Var, b: &Self::Var) -> Self::Bool;
    fn and(&mut self, a: &Self::Bool, b: &Self::Bool) -> Self::Bool;
    fn not(&mut self, a: &Self::Bool) -> Self::Bool;
    fn select(&mut self, cond: &Self::Bool, if_true: &Self::Var, if_false: &Self::Var)
        -> Self::Var;
    /// Little-endian bit decomposition of `value`, `width` bits wide.
    fn to_bits(&mut self, value: &Self::Var, width: usize) -> Vec<Self::Bool>;
}

/// Witnessed proof inputs of [`verify_gadget`].
pub struct ProofInputs<C: CircuitBuilder<F>, F: PrimeField> {
    /// All `D` side-node slots, PAD sentinels included
    pub side_nodes: Vec<C::Var>,
    pub non_membership_leaf_data: [C::Var; 3],
    /// Digest of the claimed value; ignored when `value_present` is false
    pub value_hash: C::Var,
    /// Membership/non-membership selector
    pub value_present: C::Bool,
}

/// Boolean circuit output: does `proof` open `root` for `path`?
///
/// Mirrors the host verifier step for step. Iteration `i` consumes slot
/// `D - 1 - i`, whose combine bit is little-endian path bit `i`, so each
/// slot's bit index is fixed at synthesis time and the trip count never
/// depends on the proof's true length.
pub fn verify_gadget<F, C, const D: usize>(
    cs: &mut C,
    proof: &ProofInputs<C, F>,
    path: &C::Var,
    root: &C::Var,
) -> C::Bool
where
    F: PrimeField,
    C: CircuitBuilder<F>,
{
    assert_eq!(proof.side_nodes.len(), D);

    let placeholder = cs.constant(F::ZERO);
    let pad = cs.constant(pad_sentinel::<F>());
    let leaf_tag = cs.constant(F::from(LEAF_TAG));
    let empty_tag = cs.constant(F::from(EMPTY_TAG));

    // Leaf-hash candidates for the four claim shapes, collapsed by
    // selection: membership hashes our own (path, value), non-membership
    // starts from the placeholder or from the occupying foreign leaf.
    let own_leaf = cs.hash3([leaf_tag.clone(), path.clone(), proof.value_hash.clone()]);
    let other_leaf = cs.hash3([
        leaf_tag,
        proof.non_membership_leaf_data[1].clone(),
        proof.non_membership_leaf_data[2].clone(),
    ]);
    let slot_empty = cs.is_equal(&proof.non_membership_leaf_data[0], &empty_tag);
    let absent_start = cs.select(&slot_empty, &placeholder, &other_leaf);
    let mut cur = cs.select(&proof.value_present, &own_leaf, &absent_start);

    // A non-membership claim is contradicted when the occupying leaf holds
    // the claimed path itself.
    let same_path = cs.is_equal(&proof.non_membership_leaf_data[1], path);
    let slot_occupied = cs.not(&slot_empty);
    let claims_absent = cs.not(&proof.value_present);
    let occupied_claim = cs.and(&claims_absent, &slot_occupied);
    let contradicted = cs.and(&occupied_claim, &same_path);

    let inner_tag = cs.constant(F::from(crate::hasher::INNER_TAG));
    let bits = cs.to_bits(path, D);
    for i in 0..D {
        let side = &proof.side_nodes[D - 1 - i];
        let skip = cs.is_equal(side, &pad);

        let side_left = cs.hash3([inner_tag.clone(), side.clone(), cur.clone()]);
        let side_right = cs.hash3([inner_tag.clone(), cur.clone(), side.clone()]);
        let combined = cs.select(&bits[i], &side_left, &side_right);
        cur = cs.select(&skip, &cur, &combined);
    }

    let root_matches = cs.is_equal(&cur, root);
    let upheld = cs.not(&contradicted);
    cs.and(&root_matches, &upheld)
}

/// Native instantiation of [`CircuitBuilder`]: variables are bare field
/// elements, booleans bare bools, the hash the host hash.
pub struct WitnessBuilder<F: PrimeField, H: FieldHasher<F>> {
    hasher: H,
    _field: PhantomData<F>,
}

impl<F: PrimeField, H: FieldHasher<F>> WitnessBuilder<F, H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher, _field: PhantomData }
    }
}

impl<F: PrimeField + PrimeFieldBits, H: FieldHasher<F>> CircuitBuilder<F>
    for WitnessBuilder<F, H>
{
    type Var = F;
    type Bool = bool;

    fn constant(&mut self, value: F) -> F {
        value
    }

    fn hash3(&mut self, messages: [F; 3]) -> F {
        self.hasher.hash3(messages)
    }

    fn is_equal(&mut self, a: &F, b: &F) -> bool {
        a == b
    }

    fn and(&mut self, a: &bool, b: &bool) -> bool {
        *a && *b
    }

    fn not(&mut self, a: &bool) -> bool {
        !a
    }

    fn select(&mut self, cond: &bool, if_true: &F, if_false: &F) -> F {
        if *cond {
            *if_true
        } else {
            *if_false
        }
    }

    fn to_bits(&mut self, value: &F, width: usize) -> Vec<bool> {
        let le_bits = value.to_le_bits();
        (0..width).map(|i| le_bits[i]).collect()
    }
}

/// Evaluate the verification circuit natively over a host proof.
pub fn verify_in_circuit<F, H, const D: usize>(
    hasher: H,
    proof: &crate::proof::SmtProof<F, D>,
    root: F,
    path: F,
    value_hash: Option<F>,
) -> bool
where
    F: PrimeField + PrimeFieldBits,
    H: FieldHasher<F>,
{
    let mut cs = WitnessBuilder::new(hasher);
    let inputs = ProofInputs {
        side_nodes: proof.side_nodes.to_vec(),
        non_membership_leaf_data: proof.non_membership_leaf_data,
        value_hash: value_hash.unwrap_or(F::ZERO),
        value_present: value_hash.is_some(),
    };
    verify_gadget::<F, _, D>(&mut cs, &inputs, &path, &root)
}

#[cfg(test)]
mod tests {
    use pasta_curves::pallas;

    use super::*;
    use crate::{
        hasher::Poseidon,
        store::MemoryStorage,
        tree::{MemorySmt, SmtOp, SparseMerkleTree},
        verify::verify_proof,
    };

    #[test]
    fn circuit_matches_host_verifier() {
        let mut tree: MemorySmt<pallas::Base> =
            SparseMerkleTree::new(MemoryStorage::new(), Poseidon::new(), None);

        let pairs =
            [(1u64, 11u64), (2, 22), (3, 33)].map(|(k, v)| (pallas::Base::from(k), pallas::Base::from(v)));
        for (key, value) in pairs {
            tree.update(&key, SmtOp::Put(value)).unwrap();
        }
        let root = tree.root();
        let th = tree.tree_hasher().clone();

        for (key, value) in pairs {
            let proof = tree.prove(&key).unwrap();

            // Membership, valid and invalid value.
            let host = verify_proof(&th, &proof, root, &key, Some(&value));
            let circuit =
                verify_in_circuit(Poseidon::new(), &proof, root, key, Some(th.digest(&value)));
            assert!(host && circuit);

            let wrong = value + pallas::Base::from(1);
            let host = verify_proof(&th, &proof, root, &key, Some(&wrong));
            let circuit =
                verify_in_circuit(Poseidon::new(), &proof, root, key, Some(th.digest(&wrong)));
            assert!(!host && !circuit);

            // Non-membership against an occupied slot.
            let host = verify_proof(&th, &proof, root, &key, None::<&pallas::Base>);
            let circuit = verify_in_circuit(Poseidon::new(), &proof, root, key, None);
            assert_eq!(host, circuit);
            assert!(!host);
        }

        // Non-membership of an absent key.
        let absent = pallas::Base::from(999);
        let proof = tree.prove(&absent).unwrap();
        let host = verify_proof(&th, &proof, root, &absent, None::<&pallas::Base>);
        let circuit = verify_in_circuit(Poseidon::new(), &proof, root, absent, None);
        assert!(host && circuit);
    }
}
