//! In-memory backend
//!
//! One ordered map per [`Space`] behind a single lock. Used by tests and by
//! embedders that do not need durability.

use crate::database::{Backend, Space, WriteOp};
use crate::Result;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// In-memory, map-based backend.
///
/// A write set is applied under one write lock, so readers never observe a
/// partially applied commit.
#[derive(Default)]
pub struct MemoryBackend {
    spaces: RwLock<HashMap<Space, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held in `space`.
    pub fn len(&self, space: Space) -> usize {
        self.spaces.read().get(&space).map_or(0, BTreeMap::len)
    }
}

impl Backend for MemoryBackend {
    fn get(&self, space: Space, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .spaces
            .read()
            .get(&space)
            .and_then(|map| map.get(key).cloned()))
    }

    fn scan(&self, space: Space) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .spaces
            .read()
            .get(&space)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut spaces = self.spaces.write();
        for op in ops {
            match op {
                WriteOp::Put { space, key, value } => {
                    spaces.entry(space).or_default().insert(key, value);
                }
                WriteOp::Delete { space, key } => {
                    if let Some(map) = spaces.get_mut(&space) {
                        map.remove(&key);
                    }
                }
                WriteOp::Clear { space } => {
                    spaces.remove(&space);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(&str, usize)> = Space::ALL
            .iter()
            .map(|space| (space.name(), self.len(*space)))
            .collect();
        f.debug_struct("MemoryBackend").field("keys", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_in_order() {
        let backend = MemoryBackend::new();
        backend
            .apply(vec![
                WriteOp::Put { space: Space::State, key: b"a".to_vec(), value: b"1".to_vec() },
                WriteOp::Clear { space: Space::State },
                WriteOp::Put { space: Space::State, key: b"b".to_vec(), value: b"2".to_vec() },
                WriteOp::Delete { space: Space::Offers, key: b"x".to_vec() },
            ])
            .unwrap();

        assert!(backend.get(Space::State, b"a").unwrap().is_none());
        assert_eq!(backend.get(Space::State, b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(backend.len(Space::State), 1);
        assert_eq!(backend.len(Space::Offers), 0);
    }

    #[test]
    fn test_scan_sorted() {
        let backend = MemoryBackend::new();
        for k in [b"c", b"a", b"b"] {
            backend
                .apply(vec![WriteOp::Put { space: Space::Nodes, key: k.to_vec(), value: vec![] }])
                .unwrap();
        }
        let keys: Vec<Vec<u8>> = backend.scan(Space::Nodes).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
