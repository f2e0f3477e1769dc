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

use pasta_curves::group::ff::PrimeField;

pub use sled_overlay::sled;

use crate::error::Result;

/// In-memory storage backend
pub mod memory;
pub use memory::MemoryStorage;

/// sled storage backend with overlay-staged writes
pub mod sled_store;
pub use sled_store::SledStorage;

/// Persistence contract consumed by the tree engine.
///
/// Nodes are addressed by their hash, values by their path, and the last
/// committed root by a fixed slot. All mutations are staged with the
/// `prepare_*` methods and become visible to readers of the same store
/// immediately, but only reach the backing medium on [`StorageAdapter::commit`],
/// which applies the whole staged set atomically. A failed commit leaves the
/// committed state intact and discards the staged set.
pub trait StorageAdapter<F: PrimeField> {
    type Value;

    fn get_nodes(&self, key: &F) -> Result<Option<[F; 3]>>;
    fn get_value(&self, path: &F) -> Result<Option<Self::Value>>;
    fn get_root(&self) -> Result<Option<F>>;

    fn prepare_put_nodes(&mut self, key: F, data: [F; 3]) -> Result<()>;
    fn prepare_del_nodes(&mut self, key: &F) -> Result<()>;
    fn prepare_put_value(&mut self, path: F, value: Self::Value) -> Result<()>;
    fn prepare_del_value(&mut self, path: &F) -> Result<()>;
    fn prepare_update_root(&mut self, root: F) -> Result<()>;

    fn commit(&mut self) -> Result<()>;
    /// Discard the staged mutation set, leaving committed state untouched
    /// (the prepare-operation cache of the wire contract).
    fn clear_prepared(&mut self);
    fn clear(&mut self) -> Result<()>;
}

/// Canonical byte key of a field element.
pub(crate) fn field_key<F: PrimeField>(f: &F) -> Vec<u8> {
    f.to_repr().as_ref().to_vec()
}
