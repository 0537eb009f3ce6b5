#![cfg(test)]

// Property tests for Table and its enumerators, kept inside the crate so
// they can check internal counters alongside the public surface.

use crate::{Enumerator, Finalized, Param, Seek, Table};
use core::hash::{BuildHasher, Hasher};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

const MAX_OPEN: usize = 3;

// Pool-indexed operations so shrinking moves towards earlier keys and
// shorter programs.
#[derive(Clone, Debug)]
enum Op {
    Open,
    Close(usize),
    Seek(usize, usize, u32, Vec<u8>),
    Next(usize),
    Delete(usize),
    Lookup(usize),
    Rehash(usize),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let cursor = 0usize..MAX_OPEN;
        let op = prop_oneof![
            Just(Op::Open),
            cursor.clone().prop_map(Op::Close),
            (
                cursor.clone(),
                idx.clone(),
                any::<u32>(),
                proptest::collection::vec(any::<u8>(), 0..4)
            )
                .prop_map(|(c, i, v, ext)| Op::Seek(c, i, v, ext)),
            cursor.clone().prop_map(Op::Next),
            cursor.clone().prop_map(Op::Delete),
            idx.clone().prop_map(Op::Lookup),
            (0usize..64).prop_map(Op::Rehash),
            Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn counting_table<S: BuildHasher>(hasher: S, finalized: Rc<Cell<usize>>) -> Table<u32, S> {
    Table::with_hasher(
        Param::new().finalize(move |_: Finalized<'_, u32>| finalized.set(finalized.get() + 1)),
        hasher,
    )
}

// Invariants exercised across random programs:
// - `seek` reports Inserted exactly when the model lacks the key, and the
//   stored extension bytes are the ones given at insertion.
// - `delete` removes the key from lookups immediately, whichever cursor
//   does it and wherever the others are parked.
// - `len` equals the model size after every step.
// - Nothing is pending once every enumerator is closed, and
//   live + pending + finalized always equals the number of insertions.
// - Dropping the table finalizes every remaining entry exactly once.
fn run_scenario<S: BuildHasher>(
    hasher: S,
    pool: &[String],
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let finalized = Rc::new(Cell::new(0usize));
    let mut sut = counting_table(hasher, finalized.clone());
    let mut model: HashMap<Vec<u8>, (u32, Vec<u8>)> = HashMap::new();
    let mut open: Vec<Enumerator> = Vec::new();
    let mut inserted = 0usize;

    for op in ops {
        match op {
            Op::Open => {
                if open.len() < MAX_OPEN {
                    open.push(sut.enumerator());
                }
            }
            Op::Close(c) => {
                if !open.is_empty() {
                    let mut e = open.remove(c % open.len());
                    prop_assert!(sut.end(&mut e).is_ok());
                }
            }
            Op::Seek(c, i, v, ext) => {
                let key = pool[i].as_bytes();
                let mut temp = None;
                let e = if open.is_empty() {
                    temp.insert(sut.enumerator())
                } else {
                    let n = open.len();
                    &mut open[c % n]
                };
                let res = sut.seek(e, key, &ext).expect("seek succeeds");
                match model.get(key) {
                    Some((mv, mext)) => {
                        prop_assert_eq!(res, Seek::Existing);
                        prop_assert_eq!(e.data(&sut), Some(mv));
                        prop_assert_eq!(e.ext(&sut), Some(&mext[..]));
                    }
                    None => {
                        prop_assert_eq!(res, Seek::Inserted);
                        prop_assert_eq!(e.data(&sut), Some(&0));
                        *e.data_mut(&mut sut).expect("positioned") = v;
                        model.insert(key.to_vec(), (v, ext.clone()));
                        inserted += 1;
                    }
                }
                prop_assert_eq!(e.key(&sut), Some(key));
                if let Some(mut tmp) = temp {
                    prop_assert!(sut.end(&mut tmp).is_ok());
                }
            }
            Op::Next(c) => {
                if !open.is_empty() {
                    let n = open.len();
                    let e = &mut open[c % n];
                    let more = sut.next(e).expect("valid enumerator");
                    prop_assert_eq!(more, e.is_positioned());
                    if let Some(k) = e.key(&sut) {
                        prop_assert!(model.contains_key(k), "next lands on live entries only");
                    }
                }
            }
            Op::Delete(c) => {
                if !open.is_empty() {
                    let n = open.len();
                    let e = &mut open[c % n];
                    // A cursor parked on an entry deleted elsewhere only
                    // advances; the key may since have been re-inserted.
                    let live = e.is_live(&sut);
                    match e.key(&sut).map(<[u8]>::to_vec) {
                        Some(k) => {
                            prop_assert!(sut.delete(e).is_ok());
                            if live {
                                prop_assert!(model.remove(&k).is_some());
                            }
                            prop_assert_eq!(sut.contains_key(&k), model.contains_key(&k));
                        }
                        None => prop_assert!(sut.delete(e).is_err()),
                    }
                }
            }
            Op::Lookup(i) => {
                let key = pool[i].as_bytes();
                prop_assert_eq!(sut.lookup(key), model.get(key).map(|(v, _)| v));
                prop_assert_eq!(
                    sut.lookup_ext(key),
                    model.get(key).map(|(_, x)| &x[..])
                );
            }
            Op::Rehash(n) => {
                let before = sut.n_buckets();
                prop_assert!(sut.rehash(n).is_ok());
                if !open.is_empty() {
                    prop_assert_eq!(sut.n_buckets(), before);
                }
            }
            Op::Iterate => {
                let s_keys: BTreeSet<Vec<u8>> = sut.iter().map(|(k, _, _)| k.to_vec()).collect();
                let m_keys: BTreeSet<Vec<u8>> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
            }
        }

        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.open_enumerators(), open.len());
        if open.is_empty() {
            prop_assert_eq!(sut.pending(), 0);
        }
        prop_assert_eq!(sut.len() + sut.pending() + finalized.get(), inserted);
    }

    for mut e in open.drain(..) {
        prop_assert!(sut.end(&mut e).is_ok());
    }
    prop_assert_eq!(sut.pending(), 0);
    drop(sut);
    prop_assert_eq!(finalized.get(), inserted);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(hashbrown::hash_map::DefaultHashBuilder::default(), &pool, ops)?;
    }
}

// Stale cursor deleting after its key was re-inserted through another one.
#[test]
fn stale_delete_after_reinsert_keeps_new_entry() {
    let pool = vec!["q".to_string()];
    let ops = vec![
        Op::Seek(0, 0, 1, Vec::new()),
        Op::Open,
        Op::Open,
        Op::Open,
        Op::Open,
        Op::Delete(0),
        Op::Seek(0, 0, 2, Vec::new()),
        Op::Delete(1),
    ];
    run_scenario(hashbrown::hash_map::DefaultHashBuilder::default(), &pool, ops.clone())
        .expect("default hasher");
    run_scenario(ConstBuildHasher, &pool, ops).expect("constant hasher");
}

// Collision variant using a constant hasher so every key shares one chain.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(ConstBuildHasher, &pool, ops)?;
    }
}

// Property: a sweep that deletes a random subset while a second enumerator
// is parked somewhere in the table visits every entry exactly once, and the
// parked enumerator can finish its own walk without seeing deleted entries.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_sweep_delete_with_parked_cursor(
        n in 1usize..200,
        park in 0usize..200,
        mask in proptest::collection::vec(any::<bool>(), 200),
    ) {
        let finalized = Rc::new(Cell::new(0usize));
        let mut t = counting_table(hashbrown::hash_map::DefaultHashBuilder::default(), finalized.clone());
        {
            let mut e = t.enumerator();
            for i in 0..n {
                t.seek(&mut e, &(i as u32).to_le_bytes(), b"").expect("insert");
            }
            t.end(&mut e).expect("end");
        }

        let mut parked = t.enumerator();
        for _ in 0..(park % n) {
            t.next(&mut parked).expect("next");
        }

        let mut sweep = t.enumerator();
        let mut seen = BTreeSet::new();
        let mut deleted = BTreeSet::new();
        while sweep.is_positioned() {
            let k = sweep.key(&t).expect("positioned").to_vec();
            prop_assert!(seen.insert(k.clone()), "entry visited twice");
            let idx = u32::from_le_bytes(k[..4].try_into().expect("4-byte key")) as usize;
            if mask[idx] {
                t.delete(&mut sweep).expect("delete");
                deleted.insert(k);
            } else {
                t.next(&mut sweep).expect("next");
            }
        }
        prop_assert_eq!(seen.len(), n);
        prop_assert_eq!(t.len(), n - deleted.len());
        t.end(&mut sweep).expect("end");
        prop_assert_eq!(finalized.get(), 0, "parked cursor keeps deleted entries alive");

        while t.next(&mut parked).expect("next") {
            let k = parked.key(&t).expect("positioned");
            prop_assert!(!deleted.contains(k));
        }
        t.end(&mut parked).expect("end");
        prop_assert_eq!(finalized.get(), deleted.len());
        prop_assert_eq!(t.pending(), 0);
    }
}
