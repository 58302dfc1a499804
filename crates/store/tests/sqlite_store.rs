#![forbid(unsafe_code)]

use bdc_core::config::CanvasConfig;
use bdc_core::geometry::Point;
use bdc_core::model::{NewEdge, NewIdea};
use bdc_core::placement::Anchor;
use bdc_store::{CanvasStore, HistoryOutcome, PersistError, SqliteBackend, StoreError};
use std::path::PathBuf;
use std::sync::Arc;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("bdc_store_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn config() -> CanvasConfig {
    CanvasConfig {
        enrich_on_create: false,
        ..CanvasConfig::default()
    }
}

#[tokio::test]
async fn canvas_survives_a_reopen() {
    let storage_dir = temp_dir("canvas_survives_a_reopen");
    let backend = Arc::new(SqliteBackend::open(&storage_dir).expect("open backend"));
    let canvas = backend.create_brain_dump("Roadmap").expect("brain dump");

    let store = CanvasStore::new(config(), backend.clone());
    store.load_canvas(&canvas.id).await.expect("load canvas");
    let a = store
        .add_idea(NewIdea::new("ship it", Anchor::At(Point::new(10.0, 20.0))))
        .expect("add idea")
        .settle()
        .await
        .expect("settle idea");
    let b = store
        .add_idea(NewIdea::new("test it", Anchor::At(Point::new(400.0, 20.0))))
        .expect("add idea")
        .settle()
        .await
        .expect("settle idea");
    let edge = store
        .add_edge(NewEdge::new(a.clone(), b.clone(), "depends_on"))
        .expect("add edge")
        .settle()
        .await
        .expect("settle edge");
    drop(store);
    drop(backend);

    let backend = Arc::new(SqliteBackend::open(&storage_dir).expect("reopen backend"));
    let store = CanvasStore::new(config(), backend);
    store.load_canvas(&canvas.id).await.expect("reload canvas");

    let ideas = store.ideas();
    assert_eq!(ideas.len(), 2);
    let first = store.idea(&a).expect("first idea");
    assert_eq!(first.text, "ship it");
    assert_eq!(first.position(), Point::new(10.0, 20.0));
    assert_eq!(store.idea(&b).expect("second idea").text, "test it");

    let edges = store.edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].id, edge);
    assert_eq!(edges[0].parent_id, a);
    assert_eq!(edges[0].edge_type, "depends_on");
    assert_eq!(store.edge_types().len(), 4);
    // History does not outlive the session.
    assert!(!store.can_undo());
}

#[tokio::test]
async fn undo_of_a_delete_restores_rows_under_their_old_ids() {
    let backend = Arc::new(SqliteBackend::open_in_memory().expect("open backend"));
    let canvas = backend.create_brain_dump("Scratch").expect("brain dump");
    let store = CanvasStore::new(config(), backend.clone());
    store.load_canvas(&canvas.id).await.expect("load canvas");

    let a = store
        .add_idea(NewIdea::new("a", Anchor::At(Point::new(0.0, 0.0))))
        .expect("add idea")
        .settle()
        .await
        .expect("settle idea");
    let b = store
        .add_idea(NewIdea::new("b", Anchor::At(Point::new(400.0, 0.0))))
        .expect("add idea")
        .settle()
        .await
        .expect("settle idea");
    store
        .add_edge(NewEdge::new(a.clone(), b.clone(), "related_to"))
        .expect("add edge")
        .settle()
        .await
        .expect("settle edge");

    store
        .delete_idea(&a)
        .expect("delete")
        .settle()
        .await
        .expect("settle delete");
    assert_eq!(store.undo().await.expect("undo"), HistoryOutcome::Applied);

    let reloaded = CanvasStore::new(config(), backend);
    reloaded.load_canvas(&canvas.id).await.expect("reload");
    assert_eq!(reloaded.idea(&a).expect("restored idea").text, "a");
    assert_eq!(reloaded.edges_for_idea(&a).len(), 1);
}

#[tokio::test]
async fn archived_canvases_cannot_be_loaded() {
    let backend = Arc::new(SqliteBackend::open_in_memory().expect("open backend"));
    let canvas = backend.create_brain_dump("Old").expect("brain dump");
    backend.archive_brain_dump(&canvas.id).expect("archive");

    let store = CanvasStore::new(config(), backend);
    let err = store.load_canvas(&canvas.id).await.expect_err("archived");
    assert!(matches!(
        err,
        StoreError::Persistence(PersistError::NotFound(_))
    ));
    assert!(store.active_canvas().is_none());
}
