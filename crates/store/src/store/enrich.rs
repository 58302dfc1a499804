#![forbid(unsafe_code)]

//! Background summary and embedding for freshly created ideas.

use super::CanvasStore;
use crate::backend::IdeaEnricher;
use bdc_core::ids::IdeaId;
use bdc_core::model::{IdeaPatch, IdeaState};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

impl CanvasStore {
    pub(crate) fn spawn_enrichment(&self, id: IdeaId) {
        let Some(enricher) = self.enricher() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!(idea_id = %id, "no runtime available; idea left without enrichment");
            return;
        };
        let store = self.clone();
        handle.spawn(async move { store.enrich(enricher, id).await });
    }

    async fn enrich(&self, enricher: Arc<dyn IdeaEnricher>, id: IdeaId) {
        let Some(text) = self.idea(&id).map(|idea| idea.text) else {
            debug!(idea_id = %id, "idea gone before enrichment");
            return;
        };

        let summary = enricher.summarize(&text).await;
        let embedding = enricher.embed(&text).await;
        let patch = match (summary, embedding) {
            (Ok(summary), Ok(embedding)) => IdeaPatch {
                summary: Some(Some(summary)),
                embedding: Some(Some(embedding)),
                state: Some(IdeaState::Ready),
                ..IdeaPatch::default()
            },
            (Err(err), _) | (_, Err(err)) => {
                warn!(idea_id = %id, error = %err, "enrichment failed");
                IdeaPatch {
                    state: Some(IdeaState::Error),
                    ..IdeaPatch::default()
                }
            }
        };

        let pending = match self.update_idea_unrecorded(&id, patch) {
            Ok(pending) => pending,
            Err(err) => {
                debug!(idea_id = %id, error = %err, "enrichment result discarded");
                return;
            }
        };
        if let Err(err) = pending.settle().await {
            warn!(idea_id = %id, error = %err, "enrichment result not persisted");
        }
    }
}
