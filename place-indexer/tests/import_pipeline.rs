//! Integration tests for the full import pipeline.
//!
//! These tests use the real pipelines but in-memory gazetteer and index implementations.

mod common;

use std::sync::atomic::Ordering;

use common::{munich, names, Harness, MockIndex};
use place_indexer::errors::PipelineError;
use place_indexer::orchestrator::{ImportState, IndexReadiness};
use place_indexer::{Dependencies, RunMode};
use place_indexer_shared::UpdateMarker;

#[tokio::test]
async fn test_import_builds_every_place() {
    let gazetteer = munich(3);
    gazetteer.update(common::place(2, "Bayern", "boundary", "administrative", 8));
    let harness = Harness::new(gazetteer, MockIndex::new(), 2);

    let report = harness.runner.run_import().await.unwrap();

    assert_eq!(report.documents, 7);
    assert_eq!(report.batches, 4);
    assert_eq!(report.skipped_places, 0);
    assert_eq!(report.marker, UpdateMarker(1));
    assert_eq!(harness.index.ids(), vec![1, 2, 3, 4, 10, 11, 12]);

    let building = harness.index.document(11).unwrap();
    assert_eq!(building.house_number.as_deref(), Some("2"));
    assert_eq!(building.street, Some(names("Leopoldstraße")));
    assert_eq!(building.city, Some(names("Munich")));
    assert_eq!(building.state, Some(names("Bayern")));
    assert_eq!(building.country, Some(names("Germany")));

    let import = harness.runner.import_pipeline();
    assert_eq!(import.state(), ImportState::Idle);
    assert_eq!(import.readiness(), IndexReadiness::Ready);
    assert_eq!(harness.index.stored_marker(), Some(UpdateMarker(1)));
    assert_eq!(harness.index.drops.load(Ordering::SeqCst), 1);
    assert_eq!(harness.index.creates.load(Ordering::SeqCst), 1);
    assert!(harness.index.refreshes.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_import_hands_marker_to_updates() {
    let gazetteer = munich(1);
    gazetteer.update(common::place(3, "München", "place", "city", 16));
    gazetteer.update(common::place(3, "Munich", "place", "city", 16));
    let harness = Harness::new(gazetteer, MockIndex::new().with_marker(UpdateMarker(0)), 10);

    harness.runner.run_import().await.unwrap();

    let update = harness.runner.update_pipeline();
    assert_eq!(update.marker().await, Some(UpdateMarker(2)));

    let report = harness.runner.run_update().await.unwrap();
    assert!(report.is_noop());
}

#[tokio::test]
async fn test_import_replaces_stale_documents() {
    let harness = Harness::new(munich(1), MockIndex::new(), 10);
    harness.runner.run_import().await.unwrap();

    harness.gazetteer.remove(10);
    harness.runner.run_import().await.unwrap();

    assert_eq!(harness.index.ids(), vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_import_failure_after_three_of_ten_batches() {
    // 4 areas + 36 buildings in batches of 4 = 10 batches.
    let harness = Harness::new(munich(36), MockIndex::new(), 4);
    harness.index.fail_upserts_after(3);

    let err = harness.runner.run_import().await.unwrap_err();

    assert!(err.is_connectivity() || matches!(err, PipelineError::LoaderError { .. }));
    let import = harness.runner.import_pipeline();
    assert_eq!(import.state(), ImportState::Failed);
    assert_eq!(import.readiness(), IndexReadiness::Incomplete);

    assert!(harness.index.exists());
    assert_eq!(harness.index.ids().len(), 12);
    assert_eq!(harness.index.stored_marker(), None);
    assert_eq!(harness.runner.stats().imports_failed, 1);
}

#[tokio::test]
async fn test_gazetteer_failure_mid_import() {
    let harness = Harness::new(munich(6), MockIndex::new(), 2);
    harness.gazetteer.fail_reads_after(2);

    let err = harness.runner.run_import().await.unwrap_err();

    assert!(matches!(err, PipelineError::GazetteerError(_)));
    let import = harness.runner.import_pipeline();
    assert_eq!(import.state(), ImportState::Failed);
    assert_eq!(import.readiness(), IndexReadiness::Incomplete);
    assert_eq!(harness.index.ids().len(), 4);
}

#[tokio::test]
async fn test_failed_import_can_be_rerun() {
    let harness = Harness::new(munich(2), MockIndex::new(), 2);
    harness.gazetteer.fail_reads_after(1);
    assert!(harness.runner.run_import().await.is_err());

    harness.gazetteer.fail_reads_after(usize::MAX);
    let report = harness.runner.run_import().await.unwrap();

    assert_eq!(report.documents, 6);
    assert_eq!(
        harness.runner.import_pipeline().readiness(),
        IndexReadiness::Ready
    );
}

#[tokio::test]
async fn test_unnamed_places_without_address_are_skipped() {
    let gazetteer = munich(0);
    gazetteer.insert(common::place(50, "", "natural", "tree", 30), &[3, 2, 1]);
    let harness = Harness::new(gazetteer, MockIndex::new(), 10);

    let report = harness.runner.run_import().await.unwrap();

    assert_eq!(report.skipped_places, 1);
    assert!(harness.index.document(50).is_none());
}

#[tokio::test]
async fn test_undecodable_row_on_last_page_is_skipped() {
    // pages [1, 2], [3, 4], [10, 11], [12]
    let harness = Harness::new(munich(3), MockIndex::new(), 2);
    harness.gazetteer.corrupt(12);

    let report = harness.runner.run_import().await.unwrap();

    assert_eq!(report.documents, 6);
    assert_eq!(report.skipped_rows, 1);
    assert_eq!(report.batches, 4);
    assert!(harness.index.document(12).is_none());
    assert_eq!(
        harness.runner.import_pipeline().readiness(),
        IndexReadiness::Ready
    );
}

#[tokio::test]
async fn test_place_with_undecodable_ancestor_is_skipped() {
    let harness = Harness::new(munich(2), MockIndex::new(), 10);
    harness.gazetteer.corrupt_ancestor(3);

    let report = harness.runner.run_import().await.unwrap();

    // the street and both buildings sit below Munich
    assert_eq!(report.skipped_rows, 3);
    assert_eq!(harness.index.ids(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_unfinished_import_is_not_ready_after_restart() {
    let harness = Harness::new(munich(4), MockIndex::new().with_marker(UpdateMarker(5)), 2);
    harness.index.fail_upserts_after(1);
    assert!(harness.runner.run_import().await.is_err());

    assert!(harness.index.rebuild_flagged());
    assert_eq!(harness.index.stored_marker(), None);
    let readiness = Dependencies::initial_readiness(harness.index.as_ref(), RunMode::UpdateLoop)
        .await
        .unwrap();
    assert_eq!(readiness, IndexReadiness::Incomplete);

    harness.index.accept_all();
    harness.runner.run_import().await.unwrap();

    assert!(!harness.index.rebuild_flagged());
    let readiness = Dependencies::initial_readiness(harness.index.as_ref(), RunMode::UpdateLoop)
        .await
        .unwrap();
    assert_eq!(readiness, IndexReadiness::Ready);
}

#[tokio::test]
async fn test_recreate_index_leaves_index_empty() {
    let harness = Harness::new(munich(1), MockIndex::new(), 10);
    harness.runner.run_import().await.unwrap();

    harness.runner.run_recreate().await.unwrap();

    assert!(harness.index.exists());
    assert!(harness.index.ids().is_empty());
    assert!(harness.index.rebuild_flagged());
    assert_eq!(harness.index.stored_marker(), None);
    assert_eq!(
        harness.runner.import_pipeline().readiness(),
        IndexReadiness::Incomplete
    );
}

#[tokio::test]
async fn test_recreate_waits_for_running_import() {
    let harness = Harness::new(munich(2), MockIndex::new(), 10);

    let import = harness.runner.trigger_import().unwrap();
    harness.runner.run_recreate().await.unwrap();
    import.await.unwrap();

    assert_eq!(harness.runner.stats().imports_completed, 1);
    assert!(harness.index.ids().is_empty());
    assert_eq!(harness.index.drops.load(Ordering::SeqCst), 2);
    assert_eq!(
        harness.runner.import_pipeline().readiness(),
        IndexReadiness::Incomplete
    );
}
