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

use std::marker::PhantomData;

use log::debug;
use sled_overlay::{
    sled,
    sled::{transaction::ConflictableTransactionError, Transactional},
    SledTreeOverlay,
};

use pasta_curves::group::ff::PrimeField;

use super::{field_key, StorageAdapter};
use crate::{
    error::{Error, Result},
    hasher::{FromFields, ToFields},
};

pub const SLED_NODES_TREE: &[u8] = b"_smt_nodes";
pub const SLED_VALUES_TREE: &[u8] = b"_smt_values";
pub const SLED_ROOT_TREE: &[u8] = b"_smt_root";

const ROOT_KEY: &[u8] = b"root";

/// Persistent storage backend on top of a `sled` database.
///
/// Mutations are staged in [`SledTreeOverlay`]s, one per tree, so reads
/// observe them immediately. `commit` aggregates the overlays into batches
/// and applies them inside a single multi-tree transaction; afterwards the
/// overlays are rebuilt over the new base state. Values are persisted as
/// their canonical field representation, so the value type has to implement
/// both [`ToFields`] and [`FromFields`].
pub struct SledStorage<F: PrimeField, V> {
    nodes_tree: sled::Tree,
    values_tree: sled::Tree,
    root_tree: sled::Tree,
    nodes: SledTreeOverlay,
    values: SledTreeOverlay,
    root: SledTreeOverlay,
    _marker: PhantomData<(F, V)>,
}

impl<F: PrimeField, V> SledStorage<F, V> {
    /// Instantiate over the given `sled` database handle.
    pub fn new(db: &sled::Db) -> Result<Self> {
        let nodes_tree = db.open_tree(SLED_NODES_TREE)?;
        let values_tree = db.open_tree(SLED_VALUES_TREE)?;
        let root_tree = db.open_tree(SLED_ROOT_TREE)?;

        let nodes = SledTreeOverlay::new(&nodes_tree);
        let values = SledTreeOverlay::new(&values_tree);
        let root = SledTreeOverlay::new(&root_tree);

        Ok(Self { nodes_tree, values_tree, root_tree, nodes, values, root, _marker: PhantomData })
    }

    fn reset_overlays(&mut self) {
        self.nodes = SledTreeOverlay::new(&self.nodes_tree);
        self.values = SledTreeOverlay::new(&self.values_tree);
        self.root = SledTreeOverlay::new(&self.root_tree);
    }
}

fn field_from_bytes<F: PrimeField>(bytes: &[u8]) -> Result<F> {
    let mut repr = F::Repr::default();
    if bytes.len() != repr.as_ref().len() {
        return Err(Error::ParseFailed("field element length mismatch"))
    }
    repr.as_mut().copy_from_slice(bytes);
    Option::from(F::from_repr(repr)).ok_or(Error::ParseFailed("non-canonical field element"))
}

fn node_to_bytes<F: PrimeField>(data: &[F; 3]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 * data[0].to_repr().as_ref().len());
    for f in data {
        buf.extend_from_slice(f.to_repr().as_ref());
    }
    buf
}

fn node_from_bytes<F: PrimeField>(bytes: &[u8]) -> Result<[F; 3]> {
    if bytes.len() % 3 != 0 {
        return Err(Error::ParseFailed("node record length mismatch"))
    }
    let width = bytes.len() / 3;
    Ok([
        field_from_bytes(&bytes[..width])?,
        field_from_bytes(&bytes[width..2 * width])?,
        field_from_bytes(&bytes[2 * width..])?,
    ])
}

fn value_to_bytes<F: PrimeField>(fields: &[F]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(fields.len() as u32).to_le_bytes());
    for f in fields {
        buf.extend_from_slice(f.to_repr().as_ref());
    }
    buf
}

fn value_from_bytes<F: PrimeField>(bytes: &[u8]) -> Result<Vec<F>> {
    if bytes.len() < 4 {
        return Err(Error::ParseFailed("value record too short"))
    }
    let count = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
    let body = &bytes[4..];
    let width = F::Repr::default().as_ref().len();
    if body.len() != count * width {
        return Err(Error::ParseFailed("value record length mismatch"))
    }
    let mut fields = Vec::with_capacity(count);
    for chunk in body.chunks(width) {
        fields.push(field_from_bytes(chunk)?);
    }
    Ok(fields)
}

impl<F: PrimeField, V: ToFields<F> + FromFields<F>> StorageAdapter<F> for SledStorage<F, V> {
    type Value = V;

    fn get_nodes(&self, key: &F) -> Result<Option<[F; 3]>> {
        match self.nodes.get(&field_key(key))? {
            Some(bytes) => Ok(Some(node_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_value(&self, path: &F) -> Result<Option<V>> {
        match self.values.get(&field_key(path))? {
            Some(bytes) => Ok(Some(V::from_fields(&value_from_bytes(&bytes)?)?)),
            None => Ok(None),
        }
    }

    fn get_root(&self) -> Result<Option<F>> {
        match self.root_tree.get(ROOT_KEY)? {
            Some(bytes) => Ok(Some(field_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn prepare_put_nodes(&mut self, key: F, data: [F; 3]) -> Result<()> {
        self.nodes.insert(&field_key(&key), &node_to_bytes(&data))?;
        Ok(())
    }

    fn prepare_del_nodes(&mut self, key: &F) -> Result<()> {
        self.nodes.remove(&field_key(key))?;
        Ok(())
    }

    fn prepare_put_value(&mut self, path: F, value: V) -> Result<()> {
        self.values.insert(&field_key(&path), &value_to_bytes(&value.to_fields()))?;
        Ok(())
    }

    fn prepare_del_value(&mut self, path: &F) -> Result<()> {
        self.values.remove(&field_key(path))?;
        Ok(())
    }

    fn prepare_update_root(&mut self, root: F) -> Result<()> {
        self.root.insert(ROOT_KEY, root.to_repr().as_ref())?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let nodes_batch = self.nodes.aggregate();
        let values_batch = self.values.aggregate();
        let root_batch = self.root.aggregate();

        let res = (&self.nodes_tree, &self.values_tree, &self.root_tree).transaction(
            |(nodes_tree, values_tree, root_tree)| {
                if let Some(batch) = &nodes_batch {
                    nodes_tree.apply_batch(batch)?;
                }
                if let Some(batch) = &values_batch {
                    values_tree.apply_batch(batch)?;
                }
                if let Some(batch) = &root_batch {
                    root_tree.apply_batch(batch)?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            },
        );

        // Successful or not, the overlays are rebuilt over the base state:
        // a failed transaction leaves the trees untouched, so rebuilding
        // doubles as rollback.
        self.reset_overlays();

        if let Err(e) = res {
            debug!(target: "csmt::store::sled", "commit transaction failed: {e:?}");
            return Err(Error::StorageCommitFailed(format!("{e:?}")))
        }

        Ok(())
    }

    fn clear_prepared(&mut self) {
        self.reset_overlays();
    }

    fn clear(&mut self) -> Result<()> {
        self.reset_overlays();
        self.nodes_tree.clear()?;
        self.values_tree.clear()?;
        self.root_tree.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pasta_curves::pallas;

    use super::*;

    fn temp_store() -> SledStorage<pallas::Base, pallas::Base> {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledStorage::new(&db).unwrap()
    }

    #[test]
    fn staged_and_committed_reads() {
        let mut store = temp_store();
        let key = pallas::Base::from(11);
        let data = [pallas::Base::from(2), key, pallas::Base::from(13)];

        store.prepare_put_nodes(key, data).unwrap();
        assert_eq!(store.get_nodes(&key).unwrap(), Some(data));
        // Not on disk until commit.
        assert_eq!(store.nodes_tree.len(), 0);

        store.commit().unwrap();
        assert_eq!(store.get_nodes(&key).unwrap(), Some(data));
        assert_eq!(store.nodes_tree.len(), 1);

        store.prepare_del_nodes(&key).unwrap();
        store.clear_prepared();
        assert_eq!(store.get_nodes(&key).unwrap(), Some(data));
    }

    #[test]
    fn value_roundtrip() {
        let mut store = temp_store();
        let path = pallas::Base::from(5);
        store.prepare_put_value(path, pallas::Base::from(6)).unwrap();
        store.prepare_update_root(pallas::Base::from(77)).unwrap();
        store.commit().unwrap();

        assert_eq!(store.get_value(&path).unwrap(), Some(pallas::Base::from(6)));
        assert_eq!(store.get_root().unwrap(), Some(pallas::Base::from(77)));
    }
}
