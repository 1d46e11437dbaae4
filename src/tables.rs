//! Hash tables backing the decision diagram engines
//!
//! The unique table keeps diagrams reduced by hash-consing vertices on
//! `(variable index, high id, signed low id)`. Entries are weak so the
//! table never extends vertex lifetime; expired entries are evicted lazily
//! on lookup and in periodic purges while the table grows.

use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

/// Key of a unique-table entry: variable index, high id, signed low id.
pub type VertexKey = (i32, i32, i32);

/// Memoization table keyed by an ordered pair of ids.
pub type PairTable<V> = FxHashMap<(i32, i32), V>;

/// Memoization table keyed by an ordered pair of ids and an order limit.
pub type TripletTable<V> = FxHashMap<(i32, i32, i32), V>;

/// Weak hash-consing table for decision diagram vertices.
pub struct UniqueTable<T> {
    table: FxHashMap<VertexKey, Weak<T>>,
    inserts_since_purge: usize,
}

impl<T> Default for UniqueTable<T> {
    fn default() -> Self {
        UniqueTable {
            table: FxHashMap::default(),
            inserts_since_purge: 0,
        }
    }
}

impl<T> UniqueTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        UniqueTable::default()
    }

    /// The number of live and expired entries currently stored.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Finds the canonical vertex for the key if it is still alive.
    ///
    /// An expired entry found under the key is evicted on the spot.
    pub fn find(&mut self, key: VertexKey) -> Option<Rc<T>> {
        match self.table.get(&key) {
            Some(weak) => match weak.upgrade() {
                Some(vertex) => Some(vertex),
                None => {
                    self.table.remove(&key);
                    None
                }
            },
            None => None,
        }
    }

    /// Registers a vertex as the canonical representative for the key.
    ///
    /// Periodically sweeps expired entries so the table tracks the number
    /// of live vertices rather than the number ever created.
    pub fn insert(&mut self, key: VertexKey, vertex: &Rc<T>) {
        self.table.insert(key, Rc::downgrade(vertex));
        self.inserts_since_purge += 1;
        if self.inserts_since_purge > self.table.len() / 2 + 1024 {
            self.purge_expired();
        }
    }

    /// Removes every expired entry.
    pub fn purge_expired(&mut self) {
        self.table.retain(|_, weak| weak.strong_count() > 0);
        self.inserts_since_purge = 0;
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.table.clear();
        self.inserts_since_purge = 0;
    }

    /// Releases the storage entirely; the table must not be used afterwards
    /// except through `clear`/`insert` which will reallocate.
    pub fn release(&mut self) {
        self.table = FxHashMap::default();
        self.inserts_since_purge = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_missing() {
        let mut table: UniqueTable<i32> = UniqueTable::new();
        assert!(table.find((2, 1, 1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_and_find() {
        let mut table: UniqueTable<i32> = UniqueTable::new();
        let vertex = Rc::new(42);
        table.insert((2, 1, -1), &vertex);
        assert_eq!(table.len(), 1);
        let found = table.find((2, 1, -1)).unwrap();
        assert_eq!(*found, 42);
        assert!(Rc::ptr_eq(&found, &vertex));
    }

    #[test]
    fn test_expired_entry_evicted_on_find() {
        let mut table: UniqueTable<i32> = UniqueTable::new();
        {
            let vertex = Rc::new(7);
            table.insert((3, 2, 2), &vertex);
        }
        assert_eq!(table.len(), 1);
        assert!(table.find((3, 2, 2)).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let mut table: UniqueTable<i32> = UniqueTable::new();
        let keep = Rc::new(1);
        table.insert((2, 1, 1), &keep);
        {
            let drop_me = Rc::new(2);
            table.insert((3, 1, 1), &drop_me);
        }
        table.purge_expired();
        assert_eq!(table.len(), 1);
        assert!(table.find((2, 1, 1)).is_some());
    }

    #[test]
    fn test_release() {
        let mut table: UniqueTable<i32> = UniqueTable::new();
        let vertex = Rc::new(9);
        table.insert((2, 1, 1), &vertex);
        table.release();
        assert!(table.is_empty());
        // The vertex itself outlives the table.
        assert_eq!(*vertex, 9);
    }
}
