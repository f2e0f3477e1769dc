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

//! Canonical hashing for tree nodes, path derivation from keys, and the
//! key/value capability traits.

use std::marker::PhantomData;

use halo2_gadgets::poseidon::{
    primitives as poseidon,
    primitives::{ConstantLength, P128Pow5T3},
};
use pasta_curves::{
    group::ff::{Field, PrimeField, PrimeFieldBits},
    pallas,
};

use crate::error::{Error, Result};

/// Tag of the empty node triple. Never stored, only used in proof slots.
pub const EMPTY_TAG: u64 = 0;
/// Tag of a persisted leaf node triple.
pub const LEAF_TAG: u64 = 1;
/// Tag of a persisted internal node triple.
pub const INNER_TAG: u64 = 2;

/// Branch-bit convention: a set path bit descends into the right subtree.
pub const RIGHT: bool = true;

/// Conversion of keys and values into their canonical field representation.
///
/// Anything reducible to an ordered list of field elements can act as a key
/// or value of the tree.
pub trait ToFields<F: PrimeField> {
    fn to_fields(&self) -> Vec<F>;
}

impl<F: PrimeField> ToFields<F> for F {
    fn to_fields(&self) -> Vec<F> {
        vec![*self]
    }
}

impl<F: PrimeField, const N: usize> ToFields<F> for [F; N] {
    fn to_fields(&self) -> Vec<F> {
        self.to_vec()
    }
}

impl<F: PrimeField> ToFields<F> for Vec<F> {
    fn to_fields(&self) -> Vec<F> {
        self.clone()
    }
}

/// Inverse of [`ToFields`], for values that round-trip through their field
/// representation. Required by stores that persist values.
pub trait FromFields<F: PrimeField>: Sized {
    fn from_fields(fields: &[F]) -> Result<Self>;
}

impl<F: PrimeField> FromFields<F> for F {
    fn from_fields(fields: &[F]) -> Result<Self> {
        if fields.len() != 1 {
            return Err(Error::ParseFailed("expected a single field element"))
        }
        Ok(fields[0])
    }
}

impl<F: PrimeField, const N: usize> FromFields<F> for [F; N] {
    fn from_fields(fields: &[F]) -> Result<Self> {
        fields.try_into().map_err(|_| Error::ParseFailed("field element count mismatch"))
    }
}

impl<F: PrimeField> FromFields<F> for Vec<F> {
    fn from_fields(fields: &[F]) -> Result<Self> {
        Ok(fields.to_vec())
    }
}

/// An algebraic hash compressing a sequence of field elements into one.
///
/// The tree only ever hashes tagged triples through [`FieldHasher::hash3`];
/// the variable-arity [`FieldHasher::hash`] digests key and value field
/// sequences.
pub trait FieldHasher<F: PrimeField>: Clone {
    fn hash(&self, messages: &[F]) -> F;
    fn hash3(&self, messages: [F; 3]) -> F;
}

/// Poseidon hash function over the Pallas base field
#[derive(Copy, Clone, Debug, Default)]
pub struct Poseidon;

impl Poseidon {
    pub fn new() -> Self {
        Self
    }
}

fn poseidon_hash<const N: usize>(messages: [pallas::Base; N]) -> pallas::Base {
    poseidon::Hash::<_, P128Pow5T3, ConstantLength<N>, 3, 2>::init().hash(messages)
}

impl FieldHasher<pallas::Base> for Poseidon {
    fn hash(&self, messages: &[pallas::Base]) -> pallas::Base {
        match messages.len() {
            0 => pallas::Base::ZERO,
            1 => poseidon_hash([messages[0]]),
            2 => poseidon_hash([messages[0], messages[1]]),
            3 => poseidon_hash([messages[0], messages[1], messages[2]]),
            4 => poseidon_hash([messages[0], messages[1], messages[2], messages[3]]),
            // Longer messages are absorbed by chaining the 2:1 compressor.
            _ => messages[1..]
                .iter()
                .fold(messages[0], |acc, m| poseidon_hash([acc, *m])),
        }
    }

    fn hash3(&self, messages: [pallas::Base; 3]) -> pallas::Base {
        poseidon_hash(messages)
    }
}

/// Derives every digest the tree stores or proves against: leaf and internal
/// node hashes, value digests and key paths.
#[derive(Clone, Debug)]
pub struct TreeHasher<F: PrimeField, H: FieldHasher<F>> {
    hasher: H,
    _field: PhantomData<F>,
}

impl<F: PrimeField + PrimeFieldBits, H: FieldHasher<F>> TreeHasher<F, H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher, _field: PhantomData }
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Digest of a value's field representation.
    pub fn digest(&self, value: &impl ToFields<F>) -> F {
        self.hasher.hash(&value.to_fields())
    }

    /// Path of a key. A key reducing to a single field element is its own
    /// path, anything longer is hashed down to one element.
    pub fn path(&self, key: &impl ToFields<F>) -> F {
        let fields = key.to_fields();
        if fields.len() == 1 {
            return fields[0]
        }
        self.hasher.hash(&fields)
    }

    /// Hash a leaf, returning the node hash and the persisted triple.
    pub fn digest_leaf(&self, path: F, value_hash: F) -> (F, [F; 3]) {
        let data = [F::from(LEAF_TAG), path, value_hash];
        (self.hasher.hash3(data), data)
    }

    /// Hash an internal node, returning the node hash and the persisted triple.
    pub fn digest_node(&self, left: F, right: F) -> (F, [F; 3]) {
        let data = [F::from(INNER_TAG), left, right];
        (self.hasher.hash3(data), data)
    }

    pub fn parse_leaf(data: &[F; 3]) -> (F, F) {
        (data[1], data[2])
    }

    pub fn parse_node(data: &[F; 3]) -> (F, F) {
        (data[1], data[2])
    }

    pub fn is_leaf(data: &[F; 3]) -> bool {
        data[0] == F::from(LEAF_TAG)
    }

    pub fn is_empty_data(data: &[F; 3]) -> bool {
        data[0] == F::from(EMPTY_TAG)
    }

    /// The triple carried in proof slots that hold no node.
    pub fn empty_data() -> [F; 3] {
        [F::from(EMPTY_TAG), F::ZERO, F::ZERO]
    }

    /// Hash of the empty subtree, established by convention.
    pub fn placeholder() -> F {
        F::ZERO
    }
}

/// Branch bits of `path`, indexed by depth below the root: `bits[0]` is
/// consulted at the root, `bits[depth - 1]` just above the leaf level. The
/// most significant of the low `depth` bits is walked first.
pub fn path_bits<F: PrimeFieldBits>(path: &F, depth: usize) -> Vec<bool> {
    let le_bits = path.to_le_bits();
    (0..depth).map(|d| le_bits[depth - 1 - d]).collect()
}

/// Number of leading (root-nearest) branch bits two paths share.
pub fn count_common_prefix(a: &[bool], b: &[bool]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_bit_convention() {
        // 0b1011 = 11: the low bits sit at the leaf-nearest end of the walk.
        let path = pallas::Base::from(11);
        let bits = path_bits(&path, 254);
        assert_eq!(bits.len(), 254);
        assert!(bits[..250].iter().all(|b| !b));
        assert_eq!(&bits[250..], &[true, false, true, true]);
    }

    #[test]
    fn common_prefix() {
        let a = [true, false, true, true];
        let b = [true, false, true, false];
        assert_eq!(count_common_prefix(&a, &b), 3);
        assert_eq!(count_common_prefix(&a, &a), 4);
        assert_eq!(count_common_prefix(&a[..1], &b), 1);
    }

    #[test]
    fn leaf_and_node_digests_differ() {
        let th = TreeHasher::new(Poseidon::new());
        let (x, y) = (pallas::Base::from(5), pallas::Base::from(6));
        let (leaf_hash, leaf_data) = th.digest_leaf(x, y);
        let (node_hash, node_data) = th.digest_node(x, y);
        assert_ne!(leaf_hash, node_hash);
        assert!(TreeHasher::<pallas::Base, Poseidon>::is_leaf(&leaf_data));
        assert!(!TreeHasher::<pallas::Base, Poseidon>::is_leaf(&node_data));
        assert_eq!(TreeHasher::<pallas::Base, Poseidon>::parse_leaf(&leaf_data), (x, y));
    }

    #[test]
    fn single_field_key_is_its_own_path() {
        let th = TreeHasher::<pallas::Base, _>::new(Poseidon::new());
        let key = pallas::Base::from(42);
        assert_eq!(th.path(&key), key);
        let wide = vec![key, key];
        assert_ne!(th.path(&wide), key);
    }
}
