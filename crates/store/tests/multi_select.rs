#![forbid(unsafe_code)]

use bdc_core::ValidationError;
use bdc_core::config::CanvasConfig;
use bdc_core::geometry::Point;
use bdc_core::ids::IdeaId;
use bdc_core::model::{NewEdge, NewIdea};
use bdc_core::placement::Anchor;
use bdc_store::{CanvasStore, FailPoint, HistoryOutcome, MemoryBackend, StoreError};
use std::sync::Arc;

async fn setup() -> (Arc<MemoryBackend>, CanvasStore) {
    let backend = Arc::new(MemoryBackend::new());
    let canvas = backend.add_brain_dump("Board").expect("brain dump");
    let config = CanvasConfig {
        enrich_on_create: false,
        ..CanvasConfig::default()
    };
    let store = CanvasStore::new(config, backend.clone());
    store.load_canvas(&canvas.id).await.expect("load canvas");
    (backend, store)
}

async fn three_ideas(store: &CanvasStore) -> [IdeaId; 3] {
    let mut out = Vec::new();
    for (n, text) in ["a", "b", "c"].into_iter().enumerate() {
        let id = store
            .add_idea(NewIdea::new(text, Anchor::At(Point::new(n as f64 * 400.0, 0.0))))
            .expect("add idea")
            .settle()
            .await
            .expect("settle idea");
        out.push(id);
    }
    let [a, b, c]: [IdeaId; 3] = out.try_into().expect("three ids");
    [a, b, c]
}

#[tokio::test]
async fn shared_edges_survive_a_delete_undo_round_trip() {
    let (backend, store) = setup().await;
    let [a, b, c] = three_ideas(&store).await;
    for (parent, child) in [(&a, &b), (&b, &c), (&a, &c)] {
        store
            .add_edge(NewEdge::new(parent.clone(), child.clone(), "related_to"))
            .expect("add edge")
            .settle()
            .await
            .expect("settle edge");
    }

    store
        .delete_ideas(&[a.clone(), b.clone()])
        .expect("delete")
        .settle()
        .await
        .expect("settle");
    assert_eq!(store.ideas().len(), 1);
    assert!(store.edges().is_empty());

    assert_eq!(store.undo().await.expect("undo"), HistoryOutcome::Applied);
    assert_eq!(store.ideas().len(), 3);
    assert_eq!(store.edges().len(), 3);
    assert_eq!(backend.stored_edges().len(), 3);
}

#[tokio::test]
async fn unknown_ids_abort_the_whole_selection() {
    let (_, store) = setup().await;
    let [a, b, _] = three_ideas(&store).await;
    let missing = IdeaId::try_new("idea-404").expect("id");

    let err = store
        .delete_ideas(&[a, missing, b])
        .expect_err("unknown id");
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::UnknownIdea(_))
    ));
    assert_eq!(store.ideas().len(), 3);
}

#[tokio::test]
async fn moves_are_undone_together() {
    let (_, store) = setup().await;
    let [a, b, c] = three_ideas(&store).await;

    store
        .move_ideas(&[
            (a.clone(), Point::new(0.0, 500.0)),
            (b.clone(), Point::new(400.0, 500.0)),
        ])
        .expect("move")
        .settle()
        .await
        .expect("settle");
    assert_eq!(store.idea(&b).expect("b").position(), Point::new(400.0, 500.0));

    store.undo().await.expect("undo");
    assert_eq!(store.idea(&a).expect("a").position(), Point::new(0.0, 0.0));
    assert_eq!(store.idea(&b).expect("b").position(), Point::new(400.0, 0.0));
    assert_eq!(store.idea(&c).expect("c").position(), Point::new(800.0, 0.0));
}

#[tokio::test]
async fn duplicates_copy_ideas_and_their_internal_edges() {
    let (backend, store) = setup().await;
    let [a, b, c] = three_ideas(&store).await;
    for (parent, child) in [(&a, &b), (&b, &c)] {
        store
            .add_edge(NewEdge::new(parent.clone(), child.clone(), "depends_on"))
            .expect("add edge")
            .settle()
            .await
            .expect("settle edge");
    }

    let pending = store
        .duplicate_ideas(&[a.clone(), b.clone()], Point::new(0.0, 400.0))
        .expect("duplicate");
    assert!(pending.id().iter().all(IdeaId::is_temporary));
    let copies = pending.settle().await.expect("settle");
    assert_eq!(copies.len(), 2);
    assert!(copies.iter().all(|id| !id.is_temporary()));

    let copy_a = store.idea(&copies[0]).expect("copy of a");
    assert_eq!(copy_a.text, "a");
    assert_eq!(copy_a.position(), Point::new(0.0, 400.0));

    // Only the a -> b edge lies inside the selection.
    let copied_edges = store.edges_for_idea(&copies[0]);
    assert_eq!(copied_edges.len(), 1);
    assert_eq!(copied_edges[0].child_id, copies[1]);
    assert_eq!(store.edges().len(), 3);
    assert_eq!(backend.stored_edges().len(), 3);

    store.undo().await.expect("undo");
    assert_eq!(store.ideas().len(), 3);
    assert_eq!(store.edges().len(), 2);
}

#[tokio::test]
async fn one_failed_delete_rolls_back_only_itself() {
    let (backend, store) = setup().await;
    let [a, b, c] = three_ideas(&store).await;

    backend.fail_next(FailPoint::DeleteIdea);
    let err = store
        .delete_ideas(&[a.clone(), b.clone(), c.clone()])
        .expect("delete")
        .settle()
        .await
        .expect_err("first delete fails");
    assert!(matches!(err, StoreError::Persistence(_)));

    let left = store.ideas();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, a);
    assert_eq!(backend.stored_ideas().len(), 1);

    // The surviving part of the batch is still one undo step.
    store.undo().await.expect("undo");
    assert_eq!(store.ideas().len(), 3);
}
