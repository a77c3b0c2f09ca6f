use crate::canvas::{DragController, LayerStore};
use crate::core::error::{StudioError, StudioResult};
use crate::core::events::EventBus;
use crate::core::models::{
    CharacterTemplateId, GenerationContext, Layer, LayerId, LayerOrder, LayerPatch, NewLayer,
    ProjectId,
};
use crate::services::api::StudioApi;
use crate::services::generation::GenerationTracker;
use crate::services::storyboard::StoryboardWorkflow;
use log::{info, warn};
use std::sync::Arc;

/// Everything open for one project: the layer store and the components
/// that mutate it.
pub struct EditorSession {
    project_id: ProjectId,
    api: Arc<dyn StudioApi>,
    store: Arc<LayerStore>,
    tracker: GenerationTracker,
    drag: DragController,
    storyboard: StoryboardWorkflow,
}

impl EditorSession {
    /// Build the session and load its layers and any saved storyboard.
    /// Load failures are recorded on the store rather than aborting.
    pub async fn open(api: Arc<dyn StudioApi>, events: EventBus, project_id: ProjectId) -> Self {
        let store = Arc::new(LayerStore::new());
        let session = Self {
            project_id,
            tracker: GenerationTracker::new(api.clone(), store.clone(), events.clone()),
            drag: DragController::new(store.clone(), api.clone(), events.clone()),
            storyboard: StoryboardWorkflow::new(api.clone(), store.clone(), events),
            api,
            store,
        };

        match session.refresh_layers().await {
            Ok(count) => info!("Project {}: {} layers loaded", project_id, count),
            Err(e) => warn!("Project {}: {}", project_id, e),
        }
        if let Err(e) = session.storyboard.fetch_existing(project_id).await {
            warn!("Project {}: {}", project_id, e);
        }
        session
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn store(&self) -> &Arc<LayerStore> {
        &self.store
    }

    pub fn tracker(&self) -> &GenerationTracker {
        &self.tracker
    }

    pub fn drag(&mut self) -> &mut DragController {
        &mut self.drag
    }

    pub fn storyboard(&self) -> &StoryboardWorkflow {
        &self.storyboard
    }

    /// Target for a prompt generation, optionally drawn as a saved character.
    pub fn generation_context(&self, character: Option<CharacterTemplateId>) -> GenerationContext {
        let context = GenerationContext::for_project(self.project_id);
        match character {
            Some(template_id) => context.with_character(template_id),
            None => context,
        }
    }

    fn record(&self, err: StudioError) -> StudioError {
        warn!("{}", err);
        self.store.set_error(err.user_message());
        err
    }

    // --- Layer operations ---

    pub async fn refresh_layers(&self) -> StudioResult<usize> {
        match self.api.list_layers(self.project_id).await {
            Ok(layers) => {
                let count = layers.len();
                self.store.replace_all(layers);
                Ok(count)
            }
            Err(e) => Err(self.record(StudioError::api("failed to load comic images", e))),
        }
    }

    pub async fn create_layer(&self, layer: NewLayer) -> StudioResult<Layer> {
        match self.api.create_layer(&layer).await {
            Ok(created) => {
                self.store.push(created.clone());
                Ok(created)
            }
            Err(e) => Err(self.record(StudioError::api("failed to create comic image", e))),
        }
    }

    pub async fn update_layer(&self, id: LayerId, patch: LayerPatch) -> StudioResult<Layer> {
        if self.store.get(id).is_none() {
            return Err(StudioError::UnknownLayer(id));
        }
        match self.api.update_layer(id, &patch).await {
            Ok(saved) => {
                self.store.merge(saved.clone());
                Ok(saved)
            }
            Err(e) => Err(self.record(StudioError::api("failed to update comic image", e))),
        }
    }

    pub async fn delete_layer(&self, id: LayerId) -> StudioResult<()> {
        if self.store.get(id).is_none() {
            return Err(StudioError::UnknownLayer(id));
        }
        match self.api.delete_layer(id).await {
            Ok(()) => {
                self.store.remove(id);
                Ok(())
            }
            Err(e) => Err(self.record(StudioError::api("failed to delete comic image", e))),
        }
    }

    pub async fn reorder_layers(&self, orders: Vec<LayerOrder>) -> StudioResult<()> {
        match self.api.reorder_layers(self.project_id, &orders).await {
            Ok(()) => {
                self.store.apply_order(&orders);
                Ok(())
            }
            Err(e) => Err(self.record(StudioError::api("failed to reorder comic images", e))),
        }
    }

    /// Stop background polling. Pending drag writes still land.
    pub fn close(&self) {
        if self.tracker.cancel() {
            info!("Project {}: generation polling stopped", self.project_id);
        }
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.close();
    }
}
