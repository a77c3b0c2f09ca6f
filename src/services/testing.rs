//! In-memory stand-in for the data service, recording every call.

use crate::core::error::ApiError;
use crate::core::models::{
    GenerationContext, Layer, LayerId, LayerOrder, LayerPatch, NewLayer, ProjectId,
    RemoteTaskStatus, Scene, SubmittedTask, TaskPoll,
};
use crate::services::api::{ApiResult, StudioApi};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListLayers(ProjectId),
    CreateLayer(NewLayer),
    UpdateLayer(LayerId, LayerPatch),
    DeleteLayer(LayerId),
    Reorder(Vec<LayerOrder>),
    Submit(String, GenerationContext),
    Poll(String),
    Analyze(String),
    Save(Vec<Scene>),
    GenerateAll(ProjectId),
    ListStoryboard(ProjectId),
}

#[derive(Default)]
pub struct MockStudioApi {
    pub calls: Mutex<Vec<Call>>,
    pub layers: Mutex<Vec<Layer>>,
    pub storyboard: Mutex<Vec<Scene>>,
    pub analysis: Mutex<Vec<Scene>>,
    /// Scripted poll answers; `Err` is a transient failure. Empty means pending.
    pub polls: Mutex<VecDeque<Result<TaskPoll, String>>>,
    failing: Mutex<HashSet<&'static str>>,
    /// When set, `generate_all` waits for a notification before answering.
    pub generate_gate: Mutex<Option<Arc<Notify>>>,
    /// One-shot: the next `submit_generation` waits for a notification.
    pub submit_gate: Mutex<Option<Arc<Notify>>>,
    /// One-shot: the next `update_layer` waits for a notification.
    pub update_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockStudioApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_layers(layers: Vec<Layer>) -> Arc<Self> {
        let api = Self::default();
        *api.layers.lock().unwrap() = layers;
        Arc::new(api)
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    pub fn script_polls(&self, polls: Vec<Result<TaskPoll, String>>) {
        self.polls.lock().unwrap().extend(polls);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: &'static str) -> ApiResult<()> {
        if self.failing.lock().unwrap().contains(op) {
            Err(ApiError::Status {
                status: 500,
                message: format!("{} rejected", op),
            })
        } else {
            Ok(())
        }
    }
}

pub fn sample_layer(id: LayerId, order: i64) -> Layer {
    Layer {
        id,
        project_id: Some(1),
        character_template_id: None,
        prompt: Some(format!("layer {}", id)),
        image_url: Some(format!("http://img/{}.png", id)),
        task_id: None,
        status: Some("ready".to_string()),
        position_x: 0.0,
        position_y: 0.0,
        width: 200.0,
        height: 200.0,
        layer_order: order,
    }
}

pub fn scene(sequence: u32, image_url: Option<&str>) -> Scene {
    Scene {
        sequence,
        camera: Some("medium shot".to_string()),
        description: format!("scene {}", sequence),
        image_url: image_url.map(str::to_string),
        ..Default::default()
    }
}

pub fn poll(task_id: &str, status: RemoteTaskStatus) -> Result<TaskPoll, String> {
    Ok(TaskPoll {
        task_id: task_id.to_string(),
        status,
        image_url: match status {
            RemoteTaskStatus::Completed => Some(format!("http://img/{}.png", task_id)),
            _ => None,
        },
        error: None,
        progress: None,
    })
}

#[async_trait]
impl StudioApi for MockStudioApi {
    async fn list_layers(&self, project_id: ProjectId) -> ApiResult<Vec<Layer>> {
        self.record(Call::ListLayers(project_id));
        self.check("list_layers")?;
        Ok(self.layers.lock().unwrap().clone())
    }

    async fn create_layer(&self, layer: &NewLayer) -> ApiResult<Layer> {
        self.record(Call::CreateLayer(layer.clone()));
        self.check("create_layer")?;
        let mut layers = self.layers.lock().unwrap();
        let id = layers.iter().map(|l| l.id).max().unwrap_or(0) + 1;
        let created = Layer {
            id,
            project_id: Some(layer.project_id),
            character_template_id: layer.character_template_id,
            prompt: Some(layer.prompt.clone()),
            image_url: layer.image_url.clone(),
            task_id: layer.task_id.clone(),
            status: Some("pending".to_string()),
            position_x: layer.position_x,
            position_y: layer.position_y,
            width: layer.width,
            height: layer.height,
            layer_order: layer.layer_order,
        };
        layers.push(created.clone());
        Ok(created)
    }

    async fn update_layer(&self, id: LayerId, patch: &LayerPatch) -> ApiResult<Layer> {
        self.record(Call::UpdateLayer(id, patch.clone()));
        let gate = self.update_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check("update_layer")?;
        let mut layers = self.layers.lock().unwrap();
        let layer = layers.iter_mut().find(|l| l.id == id).ok_or(ApiError::Status {
            status: 404,
            message: "not found".to_string(),
        })?;
        layer.apply(patch);
        Ok(layer.clone())
    }

    async fn delete_layer(&self, id: LayerId) -> ApiResult<()> {
        self.record(Call::DeleteLayer(id));
        self.check("delete_layer")?;
        self.layers.lock().unwrap().retain(|l| l.id != id);
        Ok(())
    }

    async fn reorder_layers(&self, _project_id: ProjectId, orders: &[LayerOrder]) -> ApiResult<()> {
        self.record(Call::Reorder(orders.to_vec()));
        self.check("reorder_layers")?;
        Ok(())
    }

    async fn submit_generation(
        &self,
        prompt: &str,
        context: &GenerationContext,
    ) -> ApiResult<SubmittedTask> {
        self.record(Call::Submit(prompt.to_string(), context.clone()));
        let gate = self.submit_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check("submit_generation")?;
        Ok(SubmittedTask {
            task_id: "task-1".to_string(),
            status: Some("pending".to_string()),
            message: None,
        })
    }

    async fn poll_generation(&self, task_id: &str) -> ApiResult<TaskPoll> {
        self.record(Call::Poll(task_id.to_string()));
        match self.polls.lock().unwrap().pop_front() {
            Some(Ok(poll)) => Ok(poll),
            Some(Err(message)) => Err(ApiError::Status { status: 503, message }),
            None => Ok(TaskPoll {
                task_id: task_id.to_string(),
                status: RemoteTaskStatus::Pending,
                image_url: None,
                error: None,
                progress: Some(50),
            }),
        }
    }

    async fn analyze_story(&self, story_text: &str) -> ApiResult<Vec<Scene>> {
        self.record(Call::Analyze(story_text.to_string()));
        self.check("analyze_story")?;
        Ok(self.analysis.lock().unwrap().clone())
    }

    async fn save_storyboard(&self, _project_id: ProjectId, scenes: &[Scene]) -> ApiResult<Vec<Scene>> {
        self.record(Call::Save(scenes.to_vec()));
        self.check("save_storyboard")?;
        *self.storyboard.lock().unwrap() = scenes.to_vec();
        Ok(scenes.to_vec())
    }

    async fn generate_all(&self, project_id: ProjectId) -> ApiResult<Vec<Layer>> {
        self.record(Call::GenerateAll(project_id));
        let gate = self.generate_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check("generate_all")?;

        let mut storyboard = self.storyboard.lock().unwrap();
        let mut layers = self.layers.lock().unwrap();
        let mut created = Vec::new();
        for scene in storyboard.iter_mut() {
            let id = layers.iter().map(|l| l.id).max().unwrap_or(0) + 1;
            let mut layer = sample_layer(id, i64::from(scene.sequence));
            layer.prompt = Some(scene.description.clone());
            scene.image_url = layer.image_url.clone();
            scene.comic_image_id = Some(id);
            layers.push(layer.clone());
            created.push(layer);
        }
        // Batch order is not guaranteed to match the scene order.
        created.reverse();
        Ok(created)
    }

    async fn list_storyboard(&self, project_id: ProjectId) -> ApiResult<Vec<Scene>> {
        self.record(Call::ListStoryboard(project_id));
        self.check("list_storyboard")?;
        Ok(self.storyboard.lock().unwrap().clone())
    }
}
