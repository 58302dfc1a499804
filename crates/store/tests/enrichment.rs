#![forbid(unsafe_code)]

use async_trait::async_trait;
use bdc_core::config::CanvasConfig;
use bdc_core::geometry::Point;
use bdc_core::ids::IdeaId;
use bdc_core::model::{IdeaState, NewIdea};
use bdc_core::placement::Anchor;
use bdc_store::{CanvasStore, HistoryOutcome, IdeaEnricher, MemoryBackend, PersistError};
use std::sync::Arc;

struct KeywordEnricher;

#[async_trait]
impl IdeaEnricher for KeywordEnricher {
    async fn summarize(&self, text: &str) -> Result<String, PersistError> {
        Ok(format!("about {}", text.split_whitespace().next().unwrap_or("nothing")))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PersistError> {
        if text.contains("rust") {
            Ok(vec![1.0, 0.1])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
}

struct OfflineEnricher;

#[async_trait]
impl IdeaEnricher for OfflineEnricher {
    async fn summarize(&self, _text: &str) -> Result<String, PersistError> {
        Err(PersistError::Unavailable("model offline".to_string()))
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, PersistError> {
        Ok(vec![1.0])
    }
}

async fn setup(enricher: Arc<dyn IdeaEnricher>) -> (Arc<MemoryBackend>, CanvasStore) {
    let backend = Arc::new(MemoryBackend::new());
    let canvas = backend.add_brain_dump("Board").expect("brain dump");
    let store = CanvasStore::new(CanvasConfig::default(), backend.clone()).with_enricher(enricher);
    store.load_canvas(&canvas.id).await.expect("load canvas");
    (backend, store)
}

async fn generated(store: &CanvasStore, text: &str, at: Point) -> IdeaId {
    let pending = store
        .add_idea(NewIdea::new(text, Anchor::At(at)))
        .expect("add idea");
    assert_eq!(
        store.idea(pending.id()).expect("local idea").state,
        IdeaState::Generating
    );
    let id = pending.settle().await.expect("settle");
    while store.idea(&id).expect("idea").state == IdeaState::Generating {
        tokio::task::yield_now().await;
    }
    id
}

#[tokio::test]
async fn created_ideas_are_summarized_and_embedded() {
    let (backend, store) = setup(Arc::new(KeywordEnricher)).await;
    let id = generated(&store, "rust ownership", Point::new(0.0, 0.0)).await;

    let idea = store.idea(&id).expect("idea");
    assert_eq!(idea.state, IdeaState::Ready);
    assert_eq!(idea.summary.as_deref(), Some("about rust"));
    assert_eq!(idea.embedding, Some(vec![1.0, 0.1]));

    while backend.stored_ideas()[0].state != IdeaState::Ready {
        tokio::task::yield_now().await;
    }
    let stored = backend.stored_ideas();
    assert_eq!(stored[0].summary.as_deref(), Some("about rust"));

    // Enrichment is not an edit the user can undo.
    store.undo().await.expect("undo create");
    assert!(!store.can_undo());
    assert!(store.ideas().is_empty());
}

#[tokio::test]
async fn undo_then_redo_keeps_the_enriched_idea() {
    let (backend, store) = setup(Arc::new(KeywordEnricher)).await;
    let id = generated(&store, "rust macros", Point::new(0.0, 0.0)).await;
    while backend.stored_ideas()[0].state != IdeaState::Ready {
        tokio::task::yield_now().await;
    }
    let enriched = store.ideas();

    assert_eq!(store.undo().await.expect("undo"), HistoryOutcome::Applied);
    assert!(store.idea(&id).is_none());
    assert_eq!(store.redo().await.expect("redo"), HistoryOutcome::Applied);

    assert_eq!(store.ideas(), enriched);
    let stored = backend.stored_ideas();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].state, IdeaState::Ready);
    assert_eq!(stored[0].summary.as_deref(), Some("about rust"));
    assert_eq!(stored[0].embedding, Some(vec![1.0, 0.1]));
}

#[tokio::test]
async fn enrichment_failures_mark_the_idea() {
    let (_, store) = setup(Arc::new(OfflineEnricher)).await;
    let id = generated(&store, "anything", Point::new(0.0, 0.0)).await;

    let idea = store.idea(&id).expect("idea");
    assert_eq!(idea.state, IdeaState::Error);
    assert_eq!(idea.summary, None);
    assert_eq!(idea.embedding, None);
}

#[tokio::test]
async fn similar_ideas_rank_by_embedding() {
    let (_, store) = setup(Arc::new(KeywordEnricher)).await;
    let a = generated(&store, "rust traits", Point::new(0.0, 0.0)).await;
    let b = generated(&store, "rust lifetimes", Point::new(400.0, 0.0)).await;
    generated(&store, "gardening", Point::new(800.0, 0.0)).await;

    let similar = store.similar_ideas(&a, 5, 0.9).await.expect("similar");
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].idea_id, b);
}

#[tokio::test]
async fn enrichment_can_be_switched_off() {
    let backend = Arc::new(MemoryBackend::new());
    let canvas = backend.add_brain_dump("Board").expect("brain dump");
    let config = CanvasConfig {
        enrich_on_create: false,
        ..CanvasConfig::default()
    };
    let store = CanvasStore::new(config, backend).with_enricher(Arc::new(KeywordEnricher));
    store.load_canvas(&canvas.id).await.expect("load canvas");

    let id = store
        .add_idea(NewIdea::new("rust", Anchor::ViewportCenter))
        .expect("add idea")
        .settle()
        .await
        .expect("settle");
    tokio::task::yield_now().await;
    let idea = store.idea(&id).expect("idea");
    assert_eq!(idea.state, IdeaState::Ready);
    assert_eq!(idea.summary, None);
}
