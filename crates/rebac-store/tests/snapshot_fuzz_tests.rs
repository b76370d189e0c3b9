//! Snapshot isolation fuzzing tests
//!
//! Random batches of touches and deletes are applied to a fresh store while a
//! plain set tracks the expected contents after each batch. Every revision the
//! store handed out must keep returning exactly the contents recorded for it.
//!
//! One tokio runtime is created per test function and reused across all
//! proptest iterations.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::BTreeSet;

use proptest::{prelude::*, test_runner::TestRunner};
use rebac_store::{MemoryBackend, TupleStore};
use rebac_test_fixtures::proptest_config::proptest_config;
use rebac_types::{ObjectRef, RelationTuple, Revision, Subject, TupleUpdate};

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("failed to create tokio runtime")
}

/// Tuples drawn from a small universe so that batches collide often
fn arb_tuple() -> impl Strategy<Value = RelationTuple> {
    (0..3u8, prop::sample::select(vec!["viewer", "editor"]), 0..4u8).prop_map(
        |(object, relation, user)| {
            RelationTuple::new(
                ObjectRef::new("doc", object.to_string()),
                relation,
                Subject::new("user", format!("u{user}")),
            )
        },
    )
}

fn arb_update() -> impl Strategy<Value = TupleUpdate> {
    prop_oneof![
        3 => arb_tuple().prop_map(TupleUpdate::Touch),
        1 => arb_tuple().prop_map(TupleUpdate::Delete),
    ]
}

fn arb_batches() -> impl Strategy<Value = Vec<Vec<TupleUpdate>>> {
    prop::collection::vec(prop::collection::vec(arb_update(), 1..6), 1..8)
}

async fn read_all(store: &MemoryBackend, revision: Revision) -> BTreeSet<RelationTuple> {
    let mut all = BTreeSet::new();
    for object in 0..3u8 {
        let tuples =
            store.read_tuples_by_prefix("doc", &object.to_string(), "", revision).await.unwrap();
        all.extend(tuples);
    }
    all
}

#[test]
fn fuzz_reads_observe_their_snapshot() {
    let rt = create_runtime();
    let mut runner = TestRunner::new(proptest_config());

    runner
        .run(&arb_batches(), |batches| {
            rt.block_on(async {
                let store = MemoryBackend::new();
                let mut expected = BTreeSet::new();
                let mut history: Vec<(Revision, BTreeSet<RelationTuple>)> = Vec::new();

                for batch in batches {
                    for update in &batch {
                        match update {
                            TupleUpdate::Touch(t) => {
                                expected.insert(t.clone());
                            },
                            TupleUpdate::Delete(t) => {
                                expected.remove(t);
                            },
                        }
                    }
                    let revision = store.write_tuples(batch).await.unwrap();
                    history.push((revision, expected.clone()));
                }

                for window in history.windows(2) {
                    assert!(window[0].0 < window[1].0, "revisions must strictly increase");
                }

                for (revision, contents) in &history {
                    assert_eq!(&read_all(&store, *revision).await, contents);
                }
            });
            Ok(())
        })
        .unwrap();
}

#[test]
fn fuzz_exact_reads_match_prefix_reads() {
    let rt = create_runtime();
    let mut runner = TestRunner::new(proptest_config());

    runner
        .run(&arb_batches(), |batches| {
            rt.block_on(async {
                let store = MemoryBackend::new();
                let mut revision = Revision::zero();
                for batch in batches {
                    revision = store.write_tuples(batch).await.unwrap();
                }

                for object in 0..3u8 {
                    let object = object.to_string();
                    for relation in ["viewer", "editor"] {
                        let mut exact =
                            store.read_tuples("doc", &object, relation, revision).await.unwrap();
                        exact.sort();
                        let prefixed = store
                            .read_tuples_by_prefix("doc", &object, relation, revision)
                            .await
                            .unwrap();
                        assert_eq!(exact, prefixed);
                    }
                }
            });
            Ok(())
        })
        .unwrap();
}
