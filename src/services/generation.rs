use crate::canvas::layers::LayerStore;
use crate::core::error::{StudioError, StudioResult};
use crate::core::events::{EventBus, StudioEvent};
use crate::core::models::{
    GenerationContext, GenerationTask, NewLayer, PromptSnapshot, RemoteTaskStatus, TaskPoll,
    TaskStatus, GENERATED_LAYER_SIZE,
};
use crate::services::api::StudioApi;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Fixed status-check cadence for an outstanding generation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

const FALLBACK_FAILURE: &str = "unknown error";

#[derive(Default)]
struct TrackerState {
    /// Bumped on every submission; stale poll loops compare against it.
    epoch: u64,
    busy: bool,
    task: Option<GenerationTask>,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

type SharedState = Arc<Mutex<TrackerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, TrackerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the single outstanding prompt-to-image request of an editing
/// session: submission, the 2 s polling task, and the hand-off of a
/// finished image into the [`LayerStore`].
pub struct GenerationTracker {
    api: Arc<dyn StudioApi>,
    store: Arc<LayerStore>,
    events: EventBus,
    state: SharedState,
}

impl GenerationTracker {
    pub fn new(api: Arc<dyn StudioApi>, store: Arc<LayerStore>, events: EventBus) -> Self {
        Self {
            api,
            store,
            events,
            state: Arc::new(Mutex::new(TrackerState::default())),
        }
    }

    /// True from submission until the task reaches a terminal status or is
    /// cancelled. The generate button should be disabled meanwhile.
    pub fn is_busy(&self) -> bool {
        lock(&self.state).busy
    }

    pub fn current(&self) -> Option<GenerationTask> {
        lock(&self.state).task.clone()
    }

    /// Forget a finished task so the UI stops showing its result.
    pub fn clear_result(&self) {
        let mut state = lock(&self.state);
        if !state.busy {
            state.task = None;
        }
    }

    pub async fn submit(&self, prompt: &str, context: GenerationContext) -> StudioResult<GenerationTask> {
        if prompt.trim().is_empty() {
            return Err(StudioError::EmptyPrompt);
        }
        let epoch = {
            let mut state = lock(&self.state);
            if state.busy {
                return Err(StudioError::GenerationInProgress);
            }
            state.busy = true;
            state.epoch += 1;
            state.task = None;
            state.epoch
        };

        let snapshot = PromptSnapshot::capture(prompt);
        let submitted = match self.api.submit_generation(snapshot.as_str(), &context).await {
            Ok(submitted) => submitted,
            Err(e) => {
                warn!("Generation submit failed: {}", e);
                let mut state = lock(&self.state);
                if state.epoch == epoch {
                    state.busy = false;
                }
                return Err(StudioError::api("failed to submit generation", e));
            }
        };
        info!("Generation task {} submitted", submitted.task_id);

        let task = GenerationTask {
            task_id: submitted.task_id.clone(),
            prompt: snapshot,
            context,
            status: TaskStatus::Submitted,
            image_url: None,
            error_message: None,
        };
        let mut state = lock(&self.state);
        if state.epoch != epoch {
            info!("Task {} was cancelled before polling started", task.task_id);
            return Err(StudioError::GenerationCancelled);
        }
        let cancel = CancellationToken::new();
        let job = PollJob {
            api: self.api.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            epoch,
            task: task.clone(),
        };

        state.task = Some(task.clone());
        state.cancel = Some(cancel.clone());
        self.events.publish(StudioEvent::GenerationSubmitted {
            task_id: task.task_id.clone(),
        });
        state.handle = Some(tokio::spawn(job.run(cancel)));
        Ok(task)
    }

    /// Stop the current task, whether it is still being submitted or
    /// already polling. Returns whether anything was in flight.
    pub fn cancel(&self) -> bool {
        let mut state = lock(&self.state);
        let was_busy = std::mem::replace(&mut state.busy, false);
        // A submission still awaiting its task id sees the new epoch and
        // never starts a poll loop.
        state.epoch += 1;
        if let Some(token) = state.cancel.take() {
            token.cancel();
            debug!("generation polling cancelled");
        }
        was_busy
    }

    /// Wait for the current poll task to exit.
    pub async fn finished(&self) {
        let handle = lock(&self.state).handle.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Generation poll task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for GenerationTracker {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.state).cancel.take() {
            token.cancel();
        }
    }
}

struct PollJob {
    api: Arc<dyn StudioApi>,
    store: Arc<LayerStore>,
    events: EventBus,
    state: SharedState,
    epoch: u64,
    task: GenerationTask,
}

impl PollJob {
    async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.update(|task| task.status = TaskStatus::Polling);

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.api.poll_generation(&self.task.task_id) => result,
            };
            match result {
                Ok(poll) => {
                    let status = poll.status;
                    match status {
                        RemoteTaskStatus::Completed => {
                            self.complete(poll).await;
                            break;
                        }
                        RemoteTaskStatus::Failed => {
                            self.fail(poll.error);
                            break;
                        }
                        RemoteTaskStatus::Pending => {
                            debug!("task {} pending ({:?}%)", self.task.task_id, poll.progress);
                        }
                    }
                }
                // Transient; retried on the next tick.
                Err(e) => warn!("Status check for task {} failed, retrying: {}", self.task.task_id, e),
            }
        }

        let mut state = lock(&self.state);
        if state.epoch == self.epoch {
            state.busy = false;
            state.cancel = None;
        }
    }

    fn update(&self, f: impl FnOnce(&mut GenerationTask)) {
        let mut state = lock(&self.state);
        if state.epoch != self.epoch {
            return;
        }
        if let Some(task) = state.task.as_mut() {
            f(task);
        }
    }

    async fn complete(&self, poll: TaskPoll) {
        let Some(image_url) = poll.image_url.filter(|u| !u.is_empty()) else {
            self.fail(Some("generation finished without an image".to_string()));
            return;
        };
        let task_id = if poll.task_id.is_empty() {
            self.task.task_id.clone()
        } else {
            poll.task_id
        };
        self.update(|task| {
            task.status = TaskStatus::Completed;
            task.image_url = Some(image_url.clone());
        });

        let new_layer = NewLayer {
            project_id: self.task.context.project_id,
            prompt: self.task.prompt.to_string(),
            character_template_id: self.task.context.character_template_id,
            image_url: Some(image_url),
            task_id: Some(task_id),
            position_x: 0.0,
            position_y: 0.0,
            width: GENERATED_LAYER_SIZE,
            height: GENERATED_LAYER_SIZE,
            layer_order: self.store.next_layer_order(),
        };
        match self.api.create_layer(&new_layer).await {
            Ok(layer) => {
                info!("Generated image added to canvas as layer {}", layer.id);
                self.store.push(layer.clone());
                self.events.publish(StudioEvent::GenerationCompleted { layer });
            }
            Err(e) => {
                warn!("Failed to save generated layer: {}", e);
                let message = format!("failed to create comic image: {}", e.user_message());
                self.store.set_error(message.clone());
                self.events.publish(StudioEvent::PersistFailed {
                    layer_id: None,
                    message,
                });
            }
        }
    }

    fn fail(&self, error: Option<String>) {
        let reason = error
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_FAILURE.to_string());
        let message = format!("generation failed: {}", reason);
        warn!("Task {}: {}", self.task.task_id, message);
        self.update(|task| {
            task.status = TaskStatus::Failed;
            task.error_message = Some(message.clone());
        });
        self.events.publish(StudioEvent::GenerationFailed {
            task_id: self.task.task_id.clone(),
            message,
        });
    }
}
