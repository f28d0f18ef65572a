// Add/remove invariants of the tracked-workflow set, exercised through the
// public mutation API against in-memory and on-disk stores

mod fixtures;

use fixtures::{engine_over, seeded_store, stored_keys, ContendedStore};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use workflow_hub::store::{FileBlobStore, MemoryBlobStore};
use workflow_hub::workflows::{ConfigStore, WorkflowKey};
use workflow_hub::{ErrorBody, ErrorKind, MutationEngine, VersionedBlobStore, WorkflowError};

#[tokio::test]
async fn test_add_assigns_fresh_unique_ids() {
    let blob = Arc::new(MemoryBlobStore::new());
    let engine = engine_over(blob.clone(), 3);

    let mut ids = HashSet::new();
    for workflow in ["ci.yml", "release.yml", "nightly.yml"] {
        let record = engine.add_workflow("acme/api", workflow, "Build").await.unwrap();
        assert!(ids.insert(record.id), "id reused for {workflow}");
    }

    let set = ConfigStore::new(blob).read().await.unwrap();
    let stored: HashSet<_> = set.records.iter().map(|r| r.id).collect();
    assert_eq!(stored, ids);
}

#[tokio::test]
async fn test_duplicate_add_is_conflict_and_leaves_set_unchanged() {
    let blob = seeded_store(&[("acme", "api", "ci.yml")]);
    let before = blob.snapshot().unwrap();
    let engine = engine_over(blob.clone(), 3);

    let err = engine.add_workflow("acme/api", "ci.yml", "Again").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Duplicate(_)));
    assert_eq!(err.status_code(), 409);
    assert_eq!(ErrorBody::from(&err).error, ErrorKind::DuplicateError);

    assert_eq!(blob.snapshot().unwrap(), before);
    assert_eq!(blob.write_count(), 0);
}

#[tokio::test]
async fn test_identity_is_case_sensitive() {
    let blob = seeded_store(&[("acme", "api", "ci.yml")]);
    let engine = engine_over(blob.clone(), 3);

    engine.add_workflow("Acme/api", "ci.yml", "Upper").await.unwrap();
    assert_eq!(stored_keys(blob).await.len(), 2);
}

#[tokio::test]
async fn test_remove_absent_is_not_found_and_leaves_set_unchanged() {
    let blob = seeded_store(&[("acme", "api", "ci.yml")]);
    let before = blob.snapshot().unwrap();
    let engine = engine_over(blob.clone(), 3);

    let err = engine.remove_workflow("acme/api", "deploy.yml").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFoundError);
    assert_eq!(err.status_code(), 404);
    assert_eq!(blob.snapshot().unwrap(), before);
}

#[tokio::test]
async fn test_add_then_remove_restores_identity_set() {
    let blob = seeded_store(&[("acme", "api", "ci.yml"), ("acme", "web", "ci.yml")]);
    let engine = engine_over(blob.clone(), 3);
    let before = stored_keys(blob.clone()).await;

    let added = engine.add_workflow("acme/docs", "pages.yml", "Docs").await.unwrap();
    let removed = engine.remove_workflow("acme/docs", "pages.yml").await.unwrap();

    assert_eq!(removed, added);
    assert_eq!(stored_keys(blob).await, before);
}

#[tokio::test]
async fn test_invalid_input_never_reaches_the_store() {
    let blob = Arc::new(MemoryBlobStore::new());
    let engine = engine_over(blob.clone(), 3);

    for (repo, workflow, label) in [
        ("acme", "ci.yml", "CI"),
        ("acme/api/extra", "ci.yml", "CI"),
        ("/api", "ci.yml", "CI"),
        ("acme/api", "  ", "CI"),
        ("acme/api", "ci.yml", ""),
        ("acme/api", "ci.yml#x", "CI"),
        ("acme/api", "ci.yml?ref=main", "CI"),
        ("acme/api", ".github/workflows/ci.yml", "CI"),
    ] {
        let err = engine.add_workflow(repo, workflow, label).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError, "{repo} {workflow} {label:?}");
        assert_eq!(err.status_code(), 400);
    }
    assert_eq!(blob.write_count(), 0);
}

#[tokio::test]
async fn test_conflicts_within_budget_are_retried() {
    let inner = Arc::new(MemoryBlobStore::new());
    let engine = engine_over(Arc::new(ContendedStore::new(inner.clone(), 2)), 3);

    engine.add_workflow("acme/api", "ci.yml", "CI").await.unwrap();
    assert_eq!(inner.write_count(), 1);
}

#[tokio::test]
async fn test_conflicts_beyond_budget_exhaust() {
    let inner = Arc::new(MemoryBlobStore::new());
    let engine = engine_over(Arc::new(ContendedStore::new(inner.clone(), 3)), 3);

    let err = engine.add_workflow("acme/api", "ci.yml", "CI").await.unwrap_err();
    assert!(matches!(err, WorkflowError::ConflictExhausted { attempts: 3 }));
    assert_eq!(err.status_code(), 409);
    assert!(inner.snapshot().is_none());
}

/// Independent engines sharing one store, as separate invocations would
fn contenders(blob: Arc<dyn VersionedBlobStore>, count: usize) -> Vec<Arc<MutationEngine>> {
    (0..count)
        .map(|_| {
            Arc::new(
                MutationEngine::new(ConfigStore::new(blob.clone()))
                    .with_max_attempts(50)
                    .with_backoff(Duration::from_millis(1)),
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_of_same_triple_track_it_once() {
    let blob: Arc<dyn VersionedBlobStore> = Arc::new(MemoryBlobStore::new());

    let handles: Vec<_> = contenders(blob.clone(), 8)
        .into_iter()
        .map(|engine| {
            tokio::spawn(async move { engine.add_workflow("acme/api", "ci.yml", "CI").await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(WorkflowError::Duplicate(_)) | Err(WorkflowError::ConflictExhausted { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(
        stored_keys(blob).await,
        vec![WorkflowKey::new("acme", "api", "ci.yml")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_of_distinct_triples_all_land_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let blob: Arc<dyn VersionedBlobStore> =
        Arc::new(FileBlobStore::new(dir.path().join("workflows.json")));

    let handles: Vec<_> = contenders(blob.clone(), 6)
        .into_iter()
        .enumerate()
        .map(|(i, engine)| {
            tokio::spawn(async move {
                engine
                    .add_workflow("acme/api", &format!("job{i}.yml"), "Job")
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let keys = stored_keys(blob).await;
    assert_eq!(keys.len(), 6);
    let unique: HashSet<_> = keys.iter().collect();
    assert_eq!(unique.len(), 6);
}

#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    Remove(usize),
}

const REPOS: [&str; 3] = ["acme/api", "acme/web", "Acme/api"];
const WORKFLOWS: [&str; 2] = ["ci.yml", "release.yml"];

fn target(index: usize) -> (&'static str, &'static str) {
    (REPOS[index % REPOS.len()], WORKFLOWS[index / REPOS.len()])
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let slots = REPOS.len() * WORKFLOWS.len();
    prop_oneof![
        (0..slots).prop_map(Op::Add),
        (0..slots).prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_mutations_match_set_model(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let blob = Arc::new(MemoryBlobStore::new());
            let engine = engine_over(blob.clone(), 3);
            let mut model: Vec<(&str, &str)> = Vec::new();

            for op in &ops {
                match op {
                    Op::Add(i) => {
                        let (repo, workflow) = target(*i);
                        let outcome = engine.add_workflow(repo, workflow, "Label").await;
                        if model.contains(&(repo, workflow)) {
                            assert!(matches!(outcome, Err(WorkflowError::Duplicate(_))));
                        } else {
                            assert!(outcome.is_ok());
                            model.push((repo, workflow));
                        }
                    }
                    Op::Remove(i) => {
                        let (repo, workflow) = target(*i);
                        let outcome = engine.remove_workflow(repo, workflow).await;
                        match model.iter().position(|entry| *entry == (repo, workflow)) {
                            Some(position) => {
                                assert!(outcome.is_ok());
                                model.remove(position);
                            }
                            None => assert!(matches!(outcome, Err(WorkflowError::NotFound(_)))),
                        }
                    }
                }
            }

            let set = ConfigStore::new(blob).read().await.unwrap();
            let stored: Vec<(String, String)> = set
                .records
                .iter()
                .map(|r| (format!("{}/{}", r.owner, r.repo), r.workflow.clone()))
                .collect();
            let expected: Vec<(String, String)> = model
                .iter()
                .map(|(repo, workflow)| (repo.to_string(), workflow.to_string()))
                .collect();
            assert_eq!(stored, expected);

            let ids: HashSet<_> = set.records.iter().map(|r| r.id).collect();
            assert_eq!(ids.len(), set.records.len());
        });
    }
}
