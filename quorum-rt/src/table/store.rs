//! The four table container semantics: `Set`, `OrderedSet`, `Bag`,
//! `DuplicateBag`.
//!
//! A table is owned by the component that created it and closed explicitly.
//! Reads take a shared lock and run concurrently; writes are serialized in
//! arrival order. No operation yields while holding the lock.

// Layer 1: Standard library imports
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::RwLock;

// Layer 3: Internal module imports
use super::error::TableError;

/// Container semantics of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    /// Unique keys; insert replaces.
    Set,

    /// Unique keys kept in sorted order; supports `first/last/next/prev`.
    OrderedSet,

    /// Multiple values per key; `(key, value)` pairs are unique.
    Bag,

    /// Multiple values per key; identical pairs may repeat.
    DuplicateBag,
}

/// User-supplied key comparator for ordered tables.
pub type KeyOrder<K> = Arc<dyn Fn(&K, &K) -> CmpOrdering + Send + Sync>;

/// Comparator ordering strings by their UTF-16 code units.
///
/// `String`'s derived `Ord` compares UTF-8 bytes, which diverges from UTF-16
/// code-unit order for supplementary-plane characters. This comparator is the
/// default used by `ordered_set` tables keyed by strings in systems that
/// inherit JavaScript string ordering.
pub fn utf16_string_order() -> KeyOrder<String> {
    Arc::new(|a: &String, b: &String| a.encode_utf16().cmp(b.encode_utf16()))
}

enum Storage<K, V> {
    Hash(HashMap<K, V>),
    Ordered {
        entries: Vec<(K, V)>,
        order: KeyOrder<K>,
    },
    Bag(HashMap<K, Vec<V>>),
    DuplicateBag(HashMap<K, Vec<V>>),
}

/// An in-memory keyed table with one of four container semantics.
///
/// # Example
/// ```rust
/// use quorum_rt::table::{Table, TableType};
///
/// let t: Table<String, i64> = Table::new(TableType::Set);
/// t.insert("hits".to_string(), 0).unwrap();
/// assert_eq!(t.update_counter(&"hits".to_string(), 5).unwrap(), 5);
/// assert_eq!(t.get(&"hits".to_string()).unwrap(), Some(5));
/// ```
pub struct Table<K, V> {
    table_type: TableType,
    storage: RwLock<Storage<K, V>>,
    closed: AtomicBool,
}

impl<K, V> Table<K, V>
where
    K: Clone + Eq + Hash + Ord + Send + 'static,
    V: Clone + PartialEq + Send + 'static,
{
    /// Create a table. `OrderedSet` tables get the key type's natural order;
    /// use [`Table::ordered_with`] to supply a comparator.
    pub fn new(table_type: TableType) -> Self {
        let storage = match table_type {
            TableType::Set => Storage::Hash(HashMap::new()),
            TableType::OrderedSet => Storage::Ordered {
                entries: Vec::new(),
                order: Arc::new(|a: &K, b: &K| a.cmp(b)),
            },
            TableType::Bag => Storage::Bag(HashMap::new()),
            TableType::DuplicateBag => Storage::DuplicateBag(HashMap::new()),
        };
        Self {
            table_type,
            storage: RwLock::new(storage),
            closed: AtomicBool::new(false),
        }
    }

    /// Create an `OrderedSet` table with a custom key comparator.
    pub fn ordered_with(order: KeyOrder<K>) -> Self {
        Self {
            table_type: TableType::OrderedSet,
            storage: RwLock::new(Storage::Ordered {
                entries: Vec::new(),
                order,
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// This table's container semantics.
    pub fn table_type(&self) -> TableType {
        self.table_type
    }

    /// Close the table; every subsequent operation fails with
    /// [`TableError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut storage = self.storage.write();
        match &mut *storage {
            Storage::Hash(map) => map.clear(),
            Storage::Ordered { entries, .. } => entries.clear(),
            Storage::Bag(map) | Storage::DuplicateBag(map) => map.clear(),
        }
    }

    /// Whether the table has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), TableError> {
        if self.is_closed() {
            Err(TableError::Closed)
        } else {
            Ok(())
        }
    }

    /// Insert a pair.
    ///
    /// `Set`/`OrderedSet`: replaces any existing value under the key.
    /// `Bag`: no-op when the identical pair exists. `DuplicateBag`: always
    /// appends.
    pub fn insert(&self, key: K, value: V) -> Result<(), TableError> {
        self.check_open()?;
        let mut storage = self.storage.write();
        match &mut *storage {
            Storage::Hash(map) => {
                map.insert(key, value);
            }
            Storage::Ordered { entries, order } => {
                match entries.binary_search_by(|(k, _)| order(k, &key)) {
                    Ok(idx) => entries[idx].1 = value,
                    Err(idx) => entries.insert(idx, (key, value)),
                }
            }
            Storage::Bag(map) => {
                let values = map.entry(key).or_default();
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            Storage::DuplicateBag(map) => {
                map.entry(key).or_default().push(value);
            }
        }
        Ok(())
    }

    /// All values under a key, in insertion order for bag types.
    ///
    /// Set types yield zero or one element.
    pub fn lookup(&self, key: &K) -> Result<Vec<V>, TableError> {
        self.check_open()?;
        let storage = self.storage.read();
        Ok(match &*storage {
            Storage::Hash(map) => map.get(key).cloned().into_iter().collect(),
            Storage::Ordered { entries, order } => entries
                .binary_search_by(|(k, _)| order(k, key))
                .ok()
                .map(|idx| entries[idx].1.clone())
                .into_iter()
                .collect(),
            Storage::Bag(map) | Storage::DuplicateBag(map) => {
                map.get(key).cloned().unwrap_or_default()
            }
        })
    }

    /// The single value under a key (first value for bag types).
    pub fn get(&self, key: &K) -> Result<Option<V>, TableError> {
        Ok(self.lookup(key)?.into_iter().next())
    }

    /// Remove every entry under a key. Returns how many were removed.
    pub fn delete(&self, key: &K) -> Result<usize, TableError> {
        self.check_open()?;
        let mut storage = self.storage.write();
        Ok(match &mut *storage {
            Storage::Hash(map) => usize::from(map.remove(key).is_some()),
            Storage::Ordered { entries, order } => {
                match entries.binary_search_by(|(k, _)| order(k, key)) {
                    Ok(idx) => {
                        entries.remove(idx);
                        1
                    }
                    Err(_) => 0,
                }
            }
            Storage::Bag(map) | Storage::DuplicateBag(map) => {
                map.remove(key).map(|v| v.len()).unwrap_or(0)
            }
        })
    }

    /// Remove a specific `(key, value)` pair.
    ///
    /// Set types remove the entry only when the stored value equals `value`.
    /// `Bag` removes the matching pair; `DuplicateBag` removes the FIRST
    /// occurrence only. Returns whether anything was removed.
    pub fn delete_object(&self, key: &K, value: &V) -> Result<bool, TableError> {
        self.check_open()?;
        let mut storage = self.storage.write();
        Ok(match &mut *storage {
            Storage::Hash(map) => {
                if map.get(key) == Some(value) {
                    map.remove(key);
                    true
                } else {
                    false
                }
            }
            Storage::Ordered { entries, order } => {
                match entries.binary_search_by(|(k, _)| order(k, key)) {
                    Ok(idx) if &entries[idx].1 == value => {
                        entries.remove(idx);
                        true
                    }
                    _ => false,
                }
            }
            Storage::Bag(map) | Storage::DuplicateBag(map) => {
                let Some(values) = map.get_mut(key) else {
                    return Ok(false);
                };
                let Some(pos) = values.iter().position(|v| v == value) else {
                    return Ok(false);
                };
                values.remove(pos);
                if values.is_empty() {
                    map.remove(key);
                }
                true
            }
        })
    }

    /// Number of entries (not unique keys).
    pub fn size(&self) -> usize {
        let storage = self.storage.read();
        match &*storage {
            Storage::Hash(map) => map.len(),
            Storage::Ordered { entries, .. } => entries.len(),
            Storage::Bag(map) | Storage::DuplicateBag(map) => map.values().map(Vec::len).sum(),
        }
    }

    /// All keys; sorted for `OrderedSet`, arbitrary order otherwise.
    pub fn keys(&self) -> Vec<K> {
        let storage = self.storage.read();
        match &*storage {
            Storage::Hash(map) => map.keys().cloned().collect(),
            Storage::Ordered { entries, .. } => entries.iter().map(|(k, _)| k.clone()).collect(),
            Storage::Bag(map) | Storage::DuplicateBag(map) => map.keys().cloned().collect(),
        }
    }

    /// Smallest key (`OrderedSet` only).
    pub fn first(&self) -> Result<Option<K>, TableError> {
        self.check_open()?;
        let storage = self.storage.read();
        match &*storage {
            Storage::Ordered { entries, .. } => Ok(entries.first().map(|(k, _)| k.clone())),
            _ => Err(self.wrong_type("first")),
        }
    }

    /// Largest key (`OrderedSet` only).
    pub fn last(&self) -> Result<Option<K>, TableError> {
        self.check_open()?;
        let storage = self.storage.read();
        match &*storage {
            Storage::Ordered { entries, .. } => Ok(entries.last().map(|(k, _)| k.clone())),
            _ => Err(self.wrong_type("last")),
        }
    }

    /// Smallest key strictly greater than `key` (`OrderedSet` only).
    ///
    /// `key` itself does not need to be present.
    pub fn next(&self, key: &K) -> Result<Option<K>, TableError> {
        self.check_open()?;
        let storage = self.storage.read();
        match &*storage {
            Storage::Ordered { entries, order } => {
                let idx = match entries.binary_search_by(|(k, _)| order(k, key)) {
                    Ok(idx) => idx + 1,
                    Err(idx) => idx,
                };
                Ok(entries.get(idx).map(|(k, _)| k.clone()))
            }
            _ => Err(self.wrong_type("next")),
        }
    }

    /// Largest key strictly smaller than `key` (`OrderedSet` only).
    pub fn prev(&self, key: &K) -> Result<Option<K>, TableError> {
        self.check_open()?;
        let storage = self.storage.read();
        match &*storage {
            Storage::Ordered { entries, order } => {
                let idx = match entries.binary_search_by(|(k, _)| order(k, key)) {
                    Ok(idx) | Err(idx) => idx,
                };
                if idx == 0 {
                    Ok(None)
                } else {
                    Ok(entries.get(idx - 1).map(|(k, _)| k.clone()))
                }
            }
            _ => Err(self.wrong_type("prev")),
        }
    }

    fn wrong_type(&self, op: &'static str) -> TableError {
        TableError::WrongTableType {
            op,
            table_type: self.table_type,
        }
    }
}

impl<K> Table<K, i64>
where
    K: Clone + Eq + Hash + Ord + Send + 'static,
{
    /// Atomically add `delta` to the counter under `key`, returning the new
    /// value. Only defined for `Set` and `OrderedSet` tables; fails with
    /// [`TableError::MissingKey`] when the key has no entry.
    pub fn update_counter(&self, key: &K, delta: i64) -> Result<i64, TableError> {
        self.check_open()?;
        let mut storage = self.storage.write();
        match &mut *storage {
            Storage::Hash(map) => {
                let value = map.get_mut(key).ok_or(TableError::MissingKey)?;
                *value += delta;
                Ok(*value)
            }
            Storage::Ordered { entries, order } => {
                match entries.binary_search_by(|(k, _)| order(k, key)) {
                    Ok(idx) => {
                        entries[idx].1 += delta;
                        Ok(entries[idx].1)
                    }
                    Err(_) => Err(TableError::MissingKey),
                }
            }
            Storage::Bag(_) | Storage::DuplicateBag(_) => Err(self.wrong_type("update_counter")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_insert_replaces() {
        let t: Table<&str, i64> = Table::new(TableType::Set);
        t.insert("k", 1).unwrap();
        t.insert("k", 2).unwrap();
        assert_eq!(t.lookup(&"k").unwrap(), vec![2]);
        assert_eq!(t.size(), 1);
    }

    #[test]
    fn test_bag_pair_uniqueness() {
        let t: Table<&str, i64> = Table::new(TableType::Bag);
        t.insert("k", 1).unwrap();
        t.insert("k", 1).unwrap();
        t.insert("k", 2).unwrap();
        assert_eq!(t.lookup(&"k").unwrap(), vec![1, 2]);
        assert_eq!(t.size(), 2);
    }

    #[test]
    fn test_duplicate_bag_repeats() {
        let t: Table<&str, i64> = Table::new(TableType::DuplicateBag);
        t.insert("k", 1).unwrap();
        t.insert("k", 1).unwrap();
        assert_eq!(t.lookup(&"k").unwrap(), vec![1, 1]);
        assert_eq!(t.size(), 2);
    }

    #[test]
    fn test_duplicate_bag_delete_object_removes_first() {
        let t: Table<&str, i64> = Table::new(TableType::DuplicateBag);
        t.insert("k", 1).unwrap();
        t.insert("k", 1).unwrap();
        assert!(t.delete_object(&"k", &1).unwrap());
        assert_eq!(t.lookup(&"k").unwrap(), vec![1]);
    }

    #[test]
    fn test_set_delete_object_requires_equal_value() {
        let t: Table<&str, i64> = Table::new(TableType::Set);
        t.insert("k", 1).unwrap();
        assert!(!t.delete_object(&"k", &2).unwrap());
        assert!(t.delete_object(&"k", &1).unwrap());
        assert_eq!(t.get(&"k").unwrap(), None);
    }

    #[test]
    fn test_ordered_set_sorted_navigation() {
        let t: Table<i64, &str> = Table::new(TableType::OrderedSet);
        t.insert(3, "c").unwrap();
        t.insert(1, "a").unwrap();
        t.insert(2, "b").unwrap();

        assert_eq!(t.keys(), vec![1, 2, 3]);
        assert_eq!(t.first().unwrap(), Some(1));
        assert_eq!(t.last().unwrap(), Some(3));
        assert_eq!(t.next(&2).unwrap(), Some(3));
        assert_eq!(t.next(&3).unwrap(), None);
        assert_eq!(t.prev(&2).unwrap(), Some(1));
        assert_eq!(t.prev(&1).unwrap(), None);
    }

    #[test]
    fn test_ordered_set_next_between_keys() {
        let t: Table<i64, ()> = Table::new(TableType::OrderedSet);
        t.insert(10, ()).unwrap();
        t.insert(20, ()).unwrap();
        assert_eq!(t.next(&15).unwrap(), Some(20));
        assert_eq!(t.prev(&15).unwrap(), Some(10));
    }

    #[test]
    fn test_ordered_set_custom_comparator() {
        // Reverse numeric order.
        let t: Table<i64, ()> = Table::ordered_with(Arc::new(|a, b| b.cmp(a)));
        t.insert(1, ()).unwrap();
        t.insert(3, ()).unwrap();
        t.insert(2, ()).unwrap();
        assert_eq!(t.keys(), vec![3, 2, 1]);
        assert_eq!(t.first().unwrap(), Some(3));
    }

    #[test]
    fn test_navigation_rejected_on_unordered() {
        let t: Table<i64, ()> = Table::new(TableType::Set);
        assert!(matches!(
            t.first(),
            Err(TableError::WrongTableType { op: "first", .. })
        ));
    }

    #[test]
    fn test_update_counter() {
        let t: Table<&str, i64> = Table::new(TableType::Set);
        t.insert("hits", 10).unwrap();
        assert_eq!(t.update_counter(&"hits", 5).unwrap(), 15);
        assert_eq!(t.update_counter(&"hits", -20).unwrap(), -5);
    }

    #[test]
    fn test_update_counter_missing_key() {
        let t: Table<&str, i64> = Table::new(TableType::Set);
        assert_eq!(t.update_counter(&"nope", 1), Err(TableError::MissingKey));
    }

    #[test]
    fn test_update_counter_rejected_on_bag() {
        let t: Table<&str, i64> = Table::new(TableType::Bag);
        t.insert("k", 1).unwrap();
        assert!(matches!(
            t.update_counter(&"k", 1),
            Err(TableError::WrongTableType { .. })
        ));
    }

    #[test]
    fn test_close_rejects_operations() {
        let t: Table<&str, i64> = Table::new(TableType::Set);
        t.insert("k", 1).unwrap();
        t.close();
        assert!(t.is_closed());
        assert_eq!(t.insert("k", 2), Err(TableError::Closed));
        assert_eq!(t.lookup(&"k"), Err(TableError::Closed));
    }

    #[test]
    fn test_insert_then_lookup_round_trip() {
        let t: Table<i64, String> = Table::new(TableType::Set);
        t.insert(1, "one".to_string()).unwrap();
        assert_eq!(t.lookup(&1).unwrap(), vec!["one".to_string()]);
    }

    #[test]
    fn test_utf16_string_order_supplementary_plane() {
        // U+FFFD sorts after U+10000 in UTF-16 code-unit order (surrogates
        // start at 0xD800), while UTF-8 byte order says the opposite.
        let order = utf16_string_order();
        let bmp = "\u{FFFD}".to_string();
        let astral = "\u{10000}".to_string();
        assert_eq!(order(&astral, &bmp), CmpOrdering::Less);
        assert_eq!(bmp.cmp(&astral), CmpOrdering::Less);
    }

    #[test]
    fn test_delete_key_counts_entries() {
        let t: Table<&str, i64> = Table::new(TableType::DuplicateBag);
        t.insert("k", 1).unwrap();
        t.insert("k", 2).unwrap();
        assert_eq!(t.delete(&"k").unwrap(), 2);
        assert_eq!(t.size(), 0);
    }
}
