//! Table container semantics across the four types.

use std::sync::Arc;

use quorum_rt::table::{Table, TableType};

#[test]
fn bag_deduplicates_identical_pairs() {
    let bag: Table<&str, &str> = Table::new(TableType::Bag);
    bag.insert("k", "v").unwrap();
    bag.insert("k", "v").unwrap();
    assert_eq!(bag.lookup(&"k").unwrap(), vec!["v"]);
}

#[test]
fn duplicate_bag_keeps_identical_pairs() {
    let bag: Table<&str, &str> = Table::new(TableType::DuplicateBag);
    bag.insert("k", "v").unwrap();
    bag.insert("k", "v").unwrap();
    assert_eq!(bag.lookup(&"k").unwrap(), vec!["v", "v"]);
}

#[test]
fn ordered_set_with_numeric_comparator_sorts_keys() {
    let table: Table<i64, ()> = Table::ordered_with(Arc::new(|a, b| a.cmp(b)));
    table.insert(3, ()).unwrap();
    table.insert(1, ()).unwrap();
    table.insert(2, ()).unwrap();

    assert_eq!(table.keys(), vec![1, 2, 3]);
    assert_eq!(table.first().unwrap(), Some(1));
    assert_eq!(table.next(&2).unwrap(), Some(3));
}

#[test]
fn counters_accumulate_atomically_under_contention() {
    let table: Arc<Table<&'static str, i64>> = Arc::new(Table::new(TableType::Set));
    table.insert("n", 0).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let table = Arc::clone(&table);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    table.update_counter(&"n", 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.get(&"n").unwrap(), Some(8000));
}

#[test]
fn insert_lookup_round_trip_per_type() {
    let set: Table<i64, &str> = Table::new(TableType::Set);
    set.insert(1, "a").unwrap();
    assert_eq!(set.lookup(&1).unwrap(), vec!["a"]);

    let ordered: Table<i64, &str> = Table::new(TableType::OrderedSet);
    ordered.insert(1, "a").unwrap();
    assert_eq!(ordered.lookup(&1).unwrap(), vec!["a"]);

    let bag: Table<i64, &str> = Table::new(TableType::Bag);
    bag.insert(1, "a").unwrap();
    bag.insert(1, "b").unwrap();
    assert_eq!(bag.lookup(&1).unwrap(), vec!["a", "b"]);
}
