// Property tests for ShardedMap kept inside the crate so they can reach
// partition routing directly.

use crate::map::ShardedMap;
use crate::snapshot::Iter;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Set(usize, i32),
    SetIfAbsent(usize, i32),
    Remove(usize),
    Pop(usize),
    Get(usize),
    Has(String),
    Add(usize, i32),
    MultiSet(Vec<(usize, i32)>),
    // `true` drains the buffered variant.
    Iterate(bool),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, usize, Vec<OpI>)> {
    let sizes = (proptest::collection::vec("[a-z]{0,5}", 1..=8), 1usize..=8);
    sizes.prop_flat_map(|(pool, shards)| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let value = || (idx.clone(), any::<i32>());
        // Has also asks about keys outside the pool.
        let lookup_key = prop_oneof![proptest::sample::select(pool.clone()), "[a-z]{0,5}"];
        let delta = (idx.clone(), -1000i32..1000);
        let batch = proptest::collection::vec(value(), 0..6);
        let op = prop_oneof![
            value().prop_map(|(i, v)| OpI::Set(i, v)),
            value().prop_map(|(i, v)| OpI::SetIfAbsent(i, v)),
            idx.clone().prop_map(OpI::Remove),
            idx.clone().prop_map(OpI::Pop),
            idx.clone().prop_map(OpI::Get),
            lookup_key.prop_map(OpI::Has),
            delta.prop_map(|(i, d)| OpI::Add(i, d)),
            batch.prop_map(OpI::MultiSet),
            any::<bool>().prop_map(OpI::Iterate),
        ];
        let ops = proptest::collection::vec(op, 1..60);
        ops.prop_map(move |ops| (pool.clone(), shards, ops))
    })
}

// Draining a snapshot yields each live entry exactly once.
fn check_snapshot(it: Iter<i32>, model: &HashMap<String, i32>) -> Result<(), TestCaseError> {
    let mut seen: BTreeMap<String, i32> = BTreeMap::new();
    for t in it {
        let fresh = seen.insert(t.key, t.value).is_none();
        prop_assert!(fresh, "duplicate key from iterator");
    }
    let expected: BTreeMap<String, i32> = model.iter().map(|(k, v)| (k.clone(), *v)).collect();
    prop_assert_eq!(seen, expected);
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - get/has/pop agree with the model; set_if_absent reports insertion.
// - update_or_insert sees `existed` iff the model has the key.
// - Each key is owned by exactly the routed partition.
// - Both iteration variants yield each live entry exactly once.
// - count/is_empty parity with the model after each op.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, shards, ops) in arb_scenario()) {
        let sut: ShardedMap<i32> = ShardedMap::with_shards(shards).unwrap();
        let mut model: HashMap<String, i32> = HashMap::new();

        for op in ops {
            match op {
                OpI::Set(i, v) => {
                    sut.set(pool[i].clone(), v);
                    model.insert(pool[i].clone(), v);
                }
                OpI::SetIfAbsent(i, v) => {
                    let inserted = sut.set_if_absent(pool[i].clone(), v);
                    prop_assert_eq!(inserted, !model.contains_key(&pool[i]));
                    model.entry(pool[i].clone()).or_insert(v);
                }
                OpI::Remove(i) => {
                    sut.remove(&pool[i]);
                    model.remove(&pool[i]);
                }
                OpI::Pop(i) => {
                    prop_assert_eq!(sut.pop(&pool[i]), model.remove(&pool[i]));
                }
                OpI::Get(i) => {
                    prop_assert_eq!(sut.get(&pool[i]), model.get(&pool[i]).copied());
                }
                OpI::Has(k) => {
                    prop_assert_eq!(sut.has(&k), model.contains_key(&k));
                }
                OpI::Add(i, d) => {
                    let expected_existed = model.contains_key(&pool[i]);
                    let mut seen_existed = None;
                    let res = sut.update_or_insert(pool[i].clone(), d, |existed, cur, cand| {
                        seen_existed = Some(existed);
                        match cur {
                            Some(c) => c.wrapping_add(cand),
                            None => cand,
                        }
                    });
                    prop_assert_eq!(seen_existed, Some(expected_existed));
                    let m = model.entry(pool[i].clone()).or_insert(0);
                    *m = if expected_existed { m.wrapping_add(d) } else { d };
                    prop_assert_eq!(res, *m);
                }
                OpI::MultiSet(entries) => {
                    let entries: Vec<(String, i32)> =
                        entries.into_iter().map(|(i, v)| (pool[i].clone(), v)).collect();
                    for (k, v) in &entries {
                        model.insert(k.clone(), *v);
                    }
                    sut.multi_set(entries);
                }
                OpI::Iterate(false) => check_snapshot(sut.iter(), &model)?,
                OpI::Iterate(true) => check_snapshot(sut.iter_buffered(), &model)?,
            }

            prop_assert_eq!(sut.count(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
        }

        // Ownership: every live key is present in its routed partition only.
        for key in model.keys() {
            let owner = sut.shard_index(key);
            for idx in 0..sut.shard_count() {
                prop_assert_eq!(sut.partition(idx).unwrap().has(key), idx == owner);
            }
        }

        let keys: BTreeSet<String> = sut.keys().into_iter().collect();
        let model_keys: BTreeSet<String> = model.keys().cloned().collect();
        prop_assert_eq!(keys, model_keys);
    }
}
