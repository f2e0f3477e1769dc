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

use std::collections::BTreeMap;

use pasta_curves::group::ff::PrimeField;

use super::{field_key, StorageAdapter};
use crate::error::Result;

/// Ephemeral storage backend.
///
/// Staged mutations live in overlay maps (`None` marks a staged deletion)
/// so readers observe them before commit, matching the semantics of the
/// sled-backed store.
#[derive(Clone, Debug)]
pub struct MemoryStorage<F: PrimeField, V> {
    nodes: BTreeMap<Vec<u8>, [F; 3]>,
    values: BTreeMap<Vec<u8>, V>,
    root: Option<F>,
    staged_nodes: BTreeMap<Vec<u8>, Option<[F; 3]>>,
    staged_values: BTreeMap<Vec<u8>, Option<V>>,
    staged_root: Option<F>,
}

impl<F: PrimeField, V> Default for MemoryStorage<F, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: PrimeField, V> MemoryStorage<F, V> {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            values: BTreeMap::new(),
            root: None,
            staged_nodes: BTreeMap::new(),
            staged_values: BTreeMap::new(),
            staged_root: None,
        }
    }

    /// Number of committed node records. Exposes the physical tree shape
    /// for diagnostics and shape assertions.
    pub fn nodes_len(&self) -> usize {
        self.nodes.len()
    }
}

impl<F: PrimeField, V: Clone> StorageAdapter<F> for MemoryStorage<F, V> {
    type Value = V;

    fn get_nodes(&self, key: &F) -> Result<Option<[F; 3]>> {
        let key = field_key(key);
        if let Some(staged) = self.staged_nodes.get(&key) {
            return Ok(*staged)
        }
        Ok(self.nodes.get(&key).copied())
    }

    fn get_value(&self, path: &F) -> Result<Option<V>> {
        let key = field_key(path);
        if let Some(staged) = self.staged_values.get(&key) {
            return Ok(staged.clone())
        }
        Ok(self.values.get(&key).cloned())
    }

    fn get_root(&self) -> Result<Option<F>> {
        Ok(self.root)
    }

    fn prepare_put_nodes(&mut self, key: F, data: [F; 3]) -> Result<()> {
        self.staged_nodes.insert(field_key(&key), Some(data));
        Ok(())
    }

    fn prepare_del_nodes(&mut self, key: &F) -> Result<()> {
        self.staged_nodes.insert(field_key(key), None);
        Ok(())
    }

    fn prepare_put_value(&mut self, path: F, value: V) -> Result<()> {
        self.staged_values.insert(field_key(&path), Some(value));
        Ok(())
    }

    fn prepare_del_value(&mut self, path: &F) -> Result<()> {
        self.staged_values.insert(field_key(path), None);
        Ok(())
    }

    fn prepare_update_root(&mut self, root: F) -> Result<()> {
        self.staged_root = Some(root);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        for (key, entry) in std::mem::take(&mut self.staged_nodes) {
            match entry {
                Some(data) => self.nodes.insert(key, data),
                None => self.nodes.remove(&key),
            };
        }
        for (key, entry) in std::mem::take(&mut self.staged_values) {
            match entry {
                Some(value) => self.values.insert(key, value),
                None => self.values.remove(&key),
            };
        }
        if let Some(root) = self.staged_root.take() {
            self.root = Some(root);
        }
        Ok(())
    }

    fn clear_prepared(&mut self) {
        self.staged_nodes.clear();
        self.staged_values.clear();
        self.staged_root = None;
    }

    fn clear(&mut self) -> Result<()> {
        self.clear_prepared();
        self.nodes.clear();
        self.values.clear();
        self.root = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pasta_curves::pallas;

    use super::*;

    #[test]
    fn staged_writes_are_visible_before_commit() {
        let mut store = MemoryStorage::<pallas::Base, pallas::Base>::new();
        let key = pallas::Base::from(7);
        let data = [pallas::Base::from(1), key, pallas::Base::from(9)];

        store.prepare_put_nodes(key, data).unwrap();
        assert_eq!(store.get_nodes(&key).unwrap(), Some(data));
        assert_eq!(store.nodes_len(), 0);

        store.commit().unwrap();
        assert_eq!(store.get_nodes(&key).unwrap(), Some(data));
        assert_eq!(store.nodes_len(), 1);

        store.prepare_del_nodes(&key).unwrap();
        assert_eq!(store.get_nodes(&key).unwrap(), None);
        store.clear_prepared();
        assert_eq!(store.get_nodes(&key).unwrap(), Some(data));
    }

    #[test]
    fn root_only_moves_on_commit() {
        let mut store = MemoryStorage::<pallas::Base, pallas::Base>::new();
        assert_eq!(store.get_root().unwrap(), None);

        store.prepare_update_root(pallas::Base::from(3)).unwrap();
        assert_eq!(store.get_root().unwrap(), None);

        store.commit().unwrap();
        assert_eq!(store.get_root().unwrap(), Some(pallas::Base::from(3)));
    }
}
