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

//! Compact Sparse Merkle Tree over a prime field.
//!
//! An authenticated key-value map whose root binds the full contents and
//! supports compact membership and non-membership proofs. Nodes are hashed
//! with a caller-supplied algebraic hash (Poseidon over the Pallas base
//! field by default), so proofs verify both on the host and inside an
//! arithmetic circuit. Any subtree holding a single occupied leaf is
//! represented by that leaf alone, keeping stored branches and proofs
//! short.

pub use pasta_curves as pasta;

/// Crate error types
pub mod error;
pub use error::{Error, Result};

/// Node hashing, path derivation and key/value field conversion
pub mod hasher;
pub use hasher::{FieldHasher, FromFields, Poseidon, ToFields, TreeHasher};

/// Storage adapters with staged writes and atomic commit
pub mod store;
pub use store::{MemoryStorage, SledStorage, StorageAdapter};

/// Proof types, compact codec and wire serialization
pub mod proof;
pub use proof::{pad_sentinel, CompactSmtProof, SmtProof};

/// Host-side proof verification
pub mod verify;
pub use verify::{verify_proof, verify_proof_with_updates};

/// The tree engine
pub mod tree;
pub use tree::{MemorySmt, SmtOp, SparseMerkleTree};

/// Proof-seeded partial tree
pub mod deep;
pub use deep::DeepSparseMerkleSubTree;

/// In-circuit proof verification
pub mod gadget;

/// Tree depth: number of branch bits taken from a path.
pub const SMT_DEPTH: usize = 254;
