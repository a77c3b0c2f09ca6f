use crate::canvas::layers::LayerStore;
use crate::core::error::{StudioError, StudioResult};
use crate::core::events::{EventBus, StudioEvent};
use crate::core::models::{ProjectId, Scene, SceneEdit, WorkflowStep};
use crate::services::api::StudioApi;
use futures_util::future;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct BoardState {
    scenes: Vec<Scene>,
    step: WorkflowStep,
    analyzing: bool,
    generating: bool,
    error: Option<String>,
}

/// Clears the `generating` flag however the batch future ends.
struct BatchGuard<'a>(&'a Mutex<BoardState>);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).generating = false;
    }
}

/// Story text → editable scene list → rendered results.
pub struct StoryboardWorkflow {
    api: Arc<dyn StudioApi>,
    layers: Arc<LayerStore>,
    events: EventBus,
    state: Mutex<BoardState>,
}

impl StoryboardWorkflow {
    pub fn new(api: Arc<dyn StudioApi>, layers: Arc<LayerStore>, events: EventBus) -> Self {
        Self {
            api,
            layers,
            events,
            state: Mutex::new(BoardState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, err: StudioError) -> StudioError {
        warn!("Storyboard: {}", err);
        self.lock().error = Some(err.user_message());
        err
    }

    // --- Observable state ---

    pub fn step(&self) -> WorkflowStep {
        self.lock().step
    }

    pub fn scenes(&self) -> Vec<Scene> {
        self.lock().scenes.clone()
    }

    pub fn is_analyzing(&self) -> bool {
        self.lock().analyzing
    }

    pub fn is_generating(&self) -> bool {
        self.lock().generating
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    // --- Navigation ---

    /// `Edit → Input` or `Result → Edit`. Never touches scenes or layers.
    pub fn back(&self) -> bool {
        let mut state = self.lock();
        match state.step.previous() {
            Some(step) => {
                state.step = step;
                true
            }
            None => false,
        }
    }

    pub fn forward(&self) -> bool {
        let mut state = self.lock();
        match state.step.next() {
            Some(step) if !state.scenes.is_empty() => {
                state.step = step;
                true
            }
            _ => false,
        }
    }

    /// Direct jump from the step tabs.
    pub fn go_to(&self, step: WorkflowStep) {
        self.lock().step = step;
    }

    pub fn reset(&self) -> StudioResult<()> {
        let mut state = self.lock();
        if state.generating {
            return Err(StudioError::BatchInProgress);
        }
        *state = BoardState::default();
        Ok(())
    }

    // --- Operations ---

    /// Split a story into scenes. Replaces the scene list and moves to `Edit`.
    pub async fn analyze(&self, story_text: &str) -> StudioResult<usize> {
        if story_text.trim().is_empty() {
            return Err(StudioError::EmptyStory);
        }
        {
            let mut state = self.lock();
            state.analyzing = true;
            state.error = None;
        }

        let result = self.api.analyze_story(story_text).await;
        let mut state = self.lock();
        state.analyzing = false;
        match result {
            Ok(mut scenes) => {
                number_scenes(&mut scenes);
                let count = scenes.len();
                info!("Story analyzed into {} scenes", count);
                state.scenes = scenes;
                state.step = WorkflowStep::Edit;
                Ok(count)
            }
            Err(e) => {
                drop(state);
                Err(self.record_error(StudioError::api("failed to analyze story", e)))
            }
        }
    }

    /// In-memory edit of one scene field; nothing is sent until a save.
    pub fn edit_field(&self, index: usize, edit: SceneEdit) -> StudioResult<()> {
        let mut state = self.lock();
        if state.step != WorkflowStep::Edit {
            return Err(StudioError::WrongStep {
                expected: WorkflowStep::Edit,
                actual: state.step,
            });
        }
        let scene = state
            .scenes
            .get_mut(index)
            .ok_or(StudioError::SceneOutOfRange(index))?;
        scene.set(edit);
        Ok(())
    }

    /// Persist the scene list as currently edited.
    pub async fn save(&self, project_id: ProjectId) -> StudioResult<()> {
        let scenes = {
            let state = self.lock();
            if state.generating {
                return Err(StudioError::BatchInProgress);
            }
            state.scenes.clone()
        };
        self.persist(project_id, &scenes).await
    }

    async fn persist(&self, project_id: ProjectId, scenes: &[Scene]) -> StudioResult<()> {
        match self.api.save_storyboard(project_id, scenes).await {
            Ok(saved) => {
                debug!("Saved {} scenes for project {}", saved.len(), project_id);
                self.adopt_ids(&saved);
                Ok(())
            }
            Err(e) => Err(self.record_error(StudioError::api("failed to save storyboard", e))),
        }
    }

    /// Carry server-assigned ids onto the local scenes, matched by sequence.
    fn adopt_ids(&self, saved: &[Scene]) {
        let mut state = self.lock();
        for scene in state.scenes.iter_mut() {
            if let Some(remote) = saved.iter().find(|s| s.sequence == scene.sequence) {
                if remote.id.is_some() {
                    scene.id = remote.id;
                }
            }
        }
    }

    /// Save the latest edits, render every scene, then reload layers and
    /// scenes from the server. Returns how many images were produced.
    pub async fn generate_all(&self, project_id: ProjectId) -> StudioResult<usize> {
        let scenes = {
            let mut state = self.lock();
            if state.generating {
                return Err(StudioError::BatchInProgress);
            }
            state.generating = true;
            state.error = None;
            state.scenes.clone()
        };
        let _guard = BatchGuard(&self.state);

        self.persist(project_id, &scenes).await?;

        let images = match self.api.generate_all(project_id).await {
            Ok(images) => images,
            Err(e) => return Err(self.record_error(StudioError::api("batch generation failed", e))),
        };
        let count = images.len();
        info!("Batch generation produced {} images", count);
        self.lock().step = WorkflowStep::Result;
        self.events.publish(StudioEvent::BatchGenerated { count });

        // The batch response is not guaranteed to line up with scenes, so
        // both collections are reloaded instead of matched positionally.
        let (layers, scenes) = future::join(
            self.api.list_layers(project_id),
            self.api.list_storyboard(project_id),
        )
        .await;
        match layers {
            Ok(layers) => self.layers.replace_all(layers),
            Err(e) => {
                self.record_error(StudioError::api("failed to load comic images", e));
            }
        }
        match scenes {
            Ok(scenes) => self.lock().scenes = scenes,
            Err(e) => {
                self.record_error(StudioError::api("failed to load storyboard", e));
            }
        }
        Ok(count)
    }

    /// Load saved scenes. Jumps to `Result` if any already has an image,
    /// otherwise to `Edit`; an empty list changes nothing.
    pub async fn fetch_existing(&self, project_id: ProjectId) -> StudioResult<usize> {
        let scenes = match self.api.list_storyboard(project_id).await {
            Ok(scenes) => scenes,
            Err(e) => return Err(self.record_error(StudioError::api("failed to load storyboard", e))),
        };
        let count = scenes.len();
        if count == 0 {
            return Ok(0);
        }
        let mut state = self.lock();
        state.step = if scenes.iter().any(Scene::has_image) {
            WorkflowStep::Result
        } else {
            WorkflowStep::Edit
        };
        state.scenes = scenes;
        Ok(count)
    }
}

/// Analysis normally numbers scenes; fill in any it left at zero.
fn number_scenes(scenes: &mut [Scene]) {
    if scenes.iter().any(|s| s.sequence == 0) {
        for (i, scene) in scenes.iter_mut().enumerate() {
            scene.sequence = i as u32 + 1;
        }
    }
}
