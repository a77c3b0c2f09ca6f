use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type ProjectId = i64;
pub type LayerId = i64;
pub type CharacterTemplateId = i64;

// --- Layers ---

pub const GENERATED_LAYER_SIZE: f64 = 512.0;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub character_template_id: Option<CharacterTemplateId>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, rename = "midjourney_task_id")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub layer_order: i64,
}

impl Layer {
    pub fn position(&self) -> Point {
        Point::new(self.position_x, self.position_y)
    }

    /// Label used by the layer panel: the prompt, or a numbered fallback.
    pub fn label(&self) -> String {
        match self.prompt.as_deref() {
            Some(p) if !p.trim().is_empty() => p.to_string(),
            _ => format!("Layer {}", self.id),
        }
    }

    /// Overlay the fields present in `patch`.
    pub fn apply(&mut self, patch: &LayerPatch) {
        if let Some(prompt) = &patch.prompt {
            self.prompt = Some(prompt.clone());
        }
        if let Some(url) = &patch.image_url {
            self.image_url = Some(url.clone());
        }
        if let Some(status) = &patch.status {
            self.status = Some(status.clone());
        }
        if let Some(x) = patch.position_x {
            self.position_x = x;
        }
        if let Some(y) = patch.position_y {
            self.position_y = y;
        }
        if let Some(w) = patch.width {
            self.width = w;
        }
        if let Some(h) = patch.height {
            self.height = h;
        }
        if let Some(order) = patch.layer_order {
            self.layer_order = order;
        }
    }
}

/// Fields for a layer the server has not assigned an id to yet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewLayer {
    pub project_id: ProjectId,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_template_id: Option<CharacterTemplateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "midjourney_task_id")]
    pub task_id: Option<String>,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    pub layer_order: i64,
}

/// Partial update; absent fields are left alone by the server.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_order: Option<i64>,
}

impl LayerPatch {
    pub fn position(point: Point) -> Self {
        Self {
            position_x: Some(point.x),
            position_y: Some(point.y),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LayerOrder {
    pub image_id: LayerId,
    pub order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Text,
    Brush,
}

// --- Generation ---

/// Where a generated image should land. Recorded verbatim at submission.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationContext {
    pub project_id: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_template_id: Option<CharacterTemplateId>,
}

impl GenerationContext {
    pub fn for_project(project_id: ProjectId) -> Self {
        Self {
            project_id,
            character_template_id: None,
        }
    }

    pub fn with_character(mut self, template_id: CharacterTemplateId) -> Self {
        self.character_template_id = Some(template_id);
        self
    }
}

/// Prompt text frozen at submission time. Cheap to clone, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSnapshot(Arc<str>);

impl PromptSnapshot {
    pub fn capture(prompt: &str) -> Self {
        Self(Arc::from(prompt))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromptSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Submitted,
    Polling,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub task_id: String,
    pub prompt: PromptSnapshot,
    pub context: GenerationContext,
    pub status: TaskStatus,
    pub image_url: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SubmittedTask {
    pub task_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTaskStatus {
    Completed,
    Failed,
    #[serde(other)]
    Pending,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TaskPoll {
    pub task_id: String,
    pub status: RemoteTaskStatus,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
    #[serde(default)]
    pub progress: Option<u32>,
}

// --- Storyboard ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Scene {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dialogue: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comic_image_id: Option<LayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Scene {
    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn set(&mut self, edit: SceneEdit) {
        match edit {
            SceneEdit::Camera(v) => self.camera = Some(v),
            SceneEdit::Description(v) => self.description = v,
            SceneEdit::Dialogue(v) => self.dialogue = Some(v),
            SceneEdit::Mood(v) => self.mood = Some(v),
        }
    }
}

/// One field edit on a scene. `sequence` is fixed once assigned.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEdit {
    Camera(String),
    Description(String),
    Dialogue(String),
    Mood(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowStep {
    #[default]
    Input,
    Edit,
    Result,
}

impl WorkflowStep {
    pub fn index(self) -> usize {
        match self {
            WorkflowStep::Input => 0,
            WorkflowStep::Edit => 1,
            WorkflowStep::Result => 2,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            WorkflowStep::Input => None,
            WorkflowStep::Edit => Some(WorkflowStep::Input),
            WorkflowStep::Result => Some(WorkflowStep::Edit),
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            WorkflowStep::Input => Some(WorkflowStep::Edit),
            WorkflowStep::Edit => Some(WorkflowStep::Result),
            WorkflowStep::Result => None,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStep::Input => "story",
            WorkflowStep::Edit => "storyboard",
            WorkflowStep::Result => "results",
        };
        f.write_str(name)
    }
}
