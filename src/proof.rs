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

//! Fixed-shape membership/non-membership proofs and their compact encoding.
//!
//! `side_nodes` is positional: slot `i` holds the sibling node at depth
//! `i + 1`, i.e. the hash combined under the branch bit at depth `i`. Slots
//! beyond the proof's true length hold the [`pad_sentinel`]. The compact
//! form additionally elides every placeholder sibling, recording its slot
//! in `bit_mask`.

use pasta_curves::group::ff::{Field, PrimeField, PrimeFieldBits};

use crate::{
    error::{Error, Result},
    SMT_DEPTH,
};

/// Sentinel filling the unused side-node slots of a full proof. Distinct
/// from the placeholder and from every node tag; part of the wire contract.
pub fn pad_sentinel<F: PrimeField>() -> F {
    -F::ONE
}

/// Merkle proof of (non-)membership against a fixed root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtProof<F: PrimeField, const D: usize = SMT_DEPTH> {
    /// Sibling hashes, positional, PAD-filled beyond the true length
    pub side_nodes: [F; D],
    /// Triple of the leaf occupying the terminal slot, or the empty triple
    pub non_membership_leaf_data: [F; 3],
    /// Triple of the deepest sibling (updatable proofs), or the empty triple
    pub sibling_data: [F; 3],
    /// Root this proof was generated against
    pub root: F,
}

impl<F: PrimeField, const D: usize> SmtProof<F, D> {
    /// True length of the proof: slots before the first PAD sentinel.
    pub fn num_side_nodes(&self) -> usize {
        let pad = pad_sentinel::<F>();
        self.side_nodes.iter().position(|s| *s == pad).unwrap_or(D)
    }

    /// Serialize to the canonical wire layout: `D` side nodes, the two
    /// triples, then the root, each element as its canonical repr bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity((D + 7) * repr_len::<F>());
        for f in &self.side_nodes {
            buf.extend_from_slice(f.to_repr().as_ref());
        }
        for f in self.non_membership_leaf_data.iter().chain(&self.sibling_data) {
            buf.extend_from_slice(f.to_repr().as_ref());
        }
        buf.extend_from_slice(self.root.to_repr().as_ref());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let width = repr_len::<F>();
        if bytes.len() != (D + 7) * width {
            return Err(Error::ParseFailed("proof length mismatch"))
        }
        let mut fields = bytes.chunks(width).map(field_from_bytes::<F>);

        let mut side_nodes = [F::ZERO; D];
        for slot in side_nodes.iter_mut() {
            *slot = fields.next().unwrap()?;
        }
        let mut triples = [[F::ZERO; 3]; 2];
        for triple in triples.iter_mut() {
            for slot in triple.iter_mut() {
                *slot = fields.next().unwrap()?;
            }
        }
        let root = fields.next().unwrap()?;

        Ok(Self {
            side_nodes,
            non_membership_leaf_data: triples[0],
            sibling_data: triples[1],
            root,
        })
    }
}

impl<F: PrimeField + PrimeFieldBits, const D: usize> SmtProof<F, D> {
    /// Compact encoding: drops PAD slots and placeholder siblings, the
    /// latter recorded in the bit mask.
    pub fn compact(&self) -> CompactSmtProof<F, D> {
        let num = self.num_side_nodes();
        let placeholder = F::ZERO;

        let mut side_nodes = Vec::new();
        let mut bit_mask = F::ZERO;
        for i in (0..num).rev() {
            bit_mask = bit_mask.double();
            if self.side_nodes[i] == placeholder {
                bit_mask += F::ONE;
            } else {
                side_nodes.push(self.side_nodes[i]);
            }
        }
        side_nodes.reverse();

        CompactSmtProof {
            side_nodes,
            non_membership_leaf_data: self.non_membership_leaf_data,
            sibling_data: self.sibling_data,
            bit_mask,
            num_side_nodes: num as u32,
            root: self.root,
        }
    }
}

/// Bandwidth-friendly form of [`SmtProof`]. Carries only non-placeholder
/// siblings; `bit_mask` bit `i` marks slot `i` as a placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactSmtProof<F: PrimeField, const D: usize = SMT_DEPTH> {
    pub side_nodes: Vec<F>,
    pub non_membership_leaf_data: [F; 3],
    pub sibling_data: [F; 3],
    pub bit_mask: F,
    pub num_side_nodes: u32,
    pub root: F,
}

impl<F: PrimeField + PrimeFieldBits, const D: usize> CompactSmtProof<F, D> {
    /// Expand back into the fixed-shape proof. Rejects malformed masks.
    pub fn decompact(&self) -> Result<SmtProof<F, D>> {
        let num = self.num_side_nodes as usize;
        if num > D {
            return Err(Error::ParseFailed("side node count exceeds tree depth"))
        }

        let mask_bits = self.bit_mask.to_le_bits();
        if (num..mask_bits.len()).any(|i| mask_bits[i]) {
            return Err(Error::ParseFailed("bit mask set beyond side node count"))
        }

        let placeholder = F::ZERO;
        let mut compacted = self.side_nodes.iter();
        let mut side_nodes = [pad_sentinel::<F>(); D];
        for (i, slot) in side_nodes.iter_mut().enumerate().take(num) {
            if mask_bits[i] {
                *slot = placeholder;
            } else {
                *slot = *compacted
                    .next()
                    .ok_or(Error::ParseFailed("compact proof side nodes exhausted"))?;
            }
        }
        if compacted.next().is_some() {
            return Err(Error::ParseFailed("compact proof has excess side nodes"))
        }

        Ok(SmtProof {
            side_nodes,
            non_membership_leaf_data: self.non_membership_leaf_data,
            sibling_data: self.sibling_data,
            root: self.root,
        })
    }

    /// Serialize to the compact wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.num_side_nodes.to_le_bytes());
        buf.extend_from_slice(self.bit_mask.to_repr().as_ref());
        for f in &self.side_nodes {
            buf.extend_from_slice(f.to_repr().as_ref());
        }
        for f in self.non_membership_leaf_data.iter().chain(&self.sibling_data) {
            buf.extend_from_slice(f.to_repr().as_ref());
        }
        buf.extend_from_slice(self.root.to_repr().as_ref());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let width = repr_len::<F>();
        if bytes.len() < 4 + width || (bytes.len() - 4) % width != 0 {
            return Err(Error::ParseFailed("compact proof length mismatch"))
        }
        let num_side_nodes = u32::from_le_bytes(bytes[..4].try_into().unwrap());
        let n_fields = (bytes.len() - 4) / width;
        if n_fields < 8 {
            return Err(Error::ParseFailed("compact proof too short"))
        }

        let mut fields = bytes[4..].chunks(width).map(field_from_bytes::<F>);
        let bit_mask = fields.next().unwrap()?;

        let mut side_nodes = Vec::with_capacity(n_fields - 8);
        for _ in 0..n_fields - 8 {
            side_nodes.push(fields.next().unwrap()?);
        }
        let mut triples = [[F::ZERO; 3]; 2];
        for triple in triples.iter_mut() {
            for slot in triple.iter_mut() {
                *slot = fields.next().unwrap()?;
            }
        }
        let root = fields.next().unwrap()?;

        let proof = Self {
            side_nodes,
            non_membership_leaf_data: triples[0],
            sibling_data: triples[1],
            bit_mask,
            num_side_nodes,
            root,
        };
        // Shape validation happens on expansion.
        proof.decompact()?;
        Ok(proof)
    }
}

pub(crate) fn repr_len<F: PrimeField>() -> usize {
    F::Repr::default().as_ref().len()
}

pub(crate) fn field_from_bytes<F: PrimeField>(bytes: &[u8]) -> Result<F> {
    let mut repr = F::Repr::default();
    if bytes.len() != repr.as_ref().len() {
        return Err(Error::ParseFailed("field element length mismatch"))
    }
    repr.as_mut().copy_from_slice(bytes);
    Option::from(F::from_repr(repr)).ok_or(Error::ParseFailed("non-canonical field element"))
}

#[cfg(test)]
mod tests {
    use pasta_curves::pallas;

    use super::*;

    type Proof = SmtProof<pallas::Base>;

    fn sample_proof(side_nodes: &[u64]) -> Proof {
        let mut proof = Proof {
            side_nodes: [pad_sentinel(); SMT_DEPTH],
            non_membership_leaf_data: [pallas::Base::ZERO; 3],
            sibling_data: [pallas::Base::ZERO; 3],
            root: pallas::Base::from(99),
        };
        for (i, s) in side_nodes.iter().enumerate() {
            proof.side_nodes[i] = pallas::Base::from(*s);
        }
        proof
    }

    #[test]
    fn compact_roundtrip() {
        // Placeholder siblings (zeros) interleaved with real hashes.
        let proof = sample_proof(&[0, 0, 7, 0, 13, 21]);
        let compact = proof.compact();

        assert_eq!(compact.num_side_nodes, 6);
        assert_eq!(compact.side_nodes.len(), 3);
        // Mask bits 0, 1, 3 set: 0b1011 = 11.
        assert_eq!(compact.bit_mask, pallas::Base::from(11));

        assert_eq!(compact.decompact().unwrap(), proof);
    }

    #[test]
    fn compact_roundtrip_no_placeholders() {
        let proof = sample_proof(&[5, 6, 7]);
        let compact = proof.compact();
        assert_eq!(compact.bit_mask, pallas::Base::ZERO);
        assert_eq!(compact.decompact().unwrap(), proof);
    }

    #[test]
    fn wire_roundtrip() {
        let proof = sample_proof(&[0, 4, 9]);
        assert_eq!(Proof::from_bytes(&proof.to_bytes()).unwrap(), proof);

        let compact = proof.compact();
        assert_eq!(
            CompactSmtProof::<pallas::Base>::from_bytes(&compact.to_bytes()).unwrap(),
            compact
        );
    }

    #[test]
    fn malformed_wire_rejected() {
        let proof = sample_proof(&[3]);
        let mut bytes = proof.to_bytes();
        bytes.pop();
        assert!(Proof::from_bytes(&bytes).is_err());

        let mut compact = proof.compact();
        // Claim more side nodes than the tree depth.
        compact.num_side_nodes = SMT_DEPTH as u32 + 1;
        assert!(compact.decompact().is_err());
    }
}
