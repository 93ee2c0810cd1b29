//! Property-based tests for the persistent collections and scopes.
//!
//! Every operation is checked against a plain std model, and every older
//! snapshot is checked again after newer versions have been derived from it.

use parens::pscope::ScopeMap;
use parens::pvector::PersistentVector;
use parens::{Scope, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;

// ============================================================================
// Strategies for generating test inputs
// ============================================================================

#[derive(Debug, Clone)]
enum MapOp {
    Store(String, u32),
    Delete(String),
}

/// Small key space so stores overwrite and deletes hit
fn arb_key() -> impl Strategy<Value = String> {
    "[a-e][a-e0-9]{0,2}"
}

fn arb_map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        3 => (arb_key(), any::<u32>()).prop_map(|(k, v)| MapOp::Store(k, v)),
        1 => arb_key().prop_map(MapOp::Delete),
    ]
}

#[derive(Debug, Clone)]
enum VecOp {
    Append(Vec<u16>),
    Set(usize, u16),
}

fn arb_vec_op() -> impl Strategy<Value = VecOp> {
    prop_oneof![
        prop::collection::vec(any::<u16>(), 0..80).prop_map(VecOp::Append),
        (any::<usize>(), any::<u16>()).prop_map(|(i, v)| VecOp::Set(i, v)),
    ]
}

fn snapshot(map: &ScopeMap<u32>) -> BTreeMap<String, u32> {
    map.iter().map(|(k, v)| (k.to_owned(), *v)).collect()
}

fn assert_load_factor(map: &ScopeMap<u32>) {
    let load = map.len() as f64 / map.bucket_count() as f64;
    assert!(load <= 8.0, "load factor {load} above upper bound");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn map_matches_model(ops in prop::collection::vec(arb_map_op(), 0..300)) {
        let mut map = ScopeMap::new();
        let mut model = BTreeMap::new();
        let mut history = Vec::new();

        for op in ops {
            history.push((map.clone(), model.clone()));
            match op {
                MapOp::Store(k, v) => {
                    map = map.store(k.clone(), v);
                    model.insert(k, v);
                    assert_load_factor(&map);
                }
                MapOp::Delete(k) => {
                    map = map.delete(&k);
                    model.remove(&k);
                    if map.bucket_count() > 1 {
                        let load = map.len() as f64 / map.bucket_count() as f64;
                        prop_assert!(load >= 2.0, "load factor {load} below lower bound");
                    }
                }
            }
            prop_assert_eq!(map.len(), model.len());
        }

        assert_eq!(snapshot(&map), model);
        for (old_map, old_model) in history {
            assert_eq!(snapshot(&old_map), old_model);
        }
    }

    #[test]
    fn store_then_load_round_trips(key in arb_key(), value in any::<u32>(), seed in prop::collection::vec((arb_key(), any::<u32>()), 0..60)) {
        let map: ScopeMap<u32> = seed.into_iter().collect();
        let stored = map.store(key.clone(), value);
        prop_assert_eq!(stored.load(&key), Some(&value));
    }

    #[test]
    fn delete_of_absent_key_is_noop(seed in prop::collection::vec((arb_key(), any::<u32>()), 0..60)) {
        let map: ScopeMap<u32> = seed.into_iter().collect();
        let same = map.delete("zz-absent");
        prop_assert_eq!(same.len(), map.len());
        prop_assert_eq!(same.bucket_count(), map.bucket_count());
        assert_eq!(snapshot(&same), snapshot(&map));
    }

    #[test]
    fn vector_matches_model(ops in prop::collection::vec(arb_vec_op(), 0..40)) {
        let mut vector = PersistentVector::new();
        let mut model: Vec<u16> = Vec::new();
        let mut history = Vec::new();

        for op in ops {
            history.push((vector.clone(), model.clone()));
            match op {
                VecOp::Append(items) => {
                    vector = vector.append(items.iter().copied());
                    model.extend(items);
                }
                VecOp::Set(i, v) if !model.is_empty() => {
                    let i = i % model.len();
                    vector = vector.set(i, v).map_err(|e| TestCaseError::fail(e.to_string()))?;
                    model[i] = v;
                }
                VecOp::Set(i, v) => {
                    prop_assert!(vector.set(i, v).is_err());
                }
            }
            prop_assert_eq!(vector.len(), model.len());
        }

        assert_eq!(vector.iter().copied().collect::<Vec<_>>(), model);
        for (old_vector, old_model) in history {
            assert_eq!(old_vector.iter().copied().collect::<Vec<_>>(), old_model);
        }
    }

    #[test]
    fn scope_snapshots_survive_later_binds(names in prop::collection::vec(arb_key(), 1..50)) {
        let mut scope = Scope::new();
        let mut snapshots = Vec::new();

        for (i, name) in names.iter().enumerate() {
            scope = scope.bind(name.as_str(), Value::from(i as u32));
            snapshots.push((scope.clone(), name.clone(), i as u32));
        }

        for (snapshot, name, i) in snapshots {
            prop_assert_eq!(snapshot.get(&name).ok(), Some(Value::from(i)));
        }
    }
}
