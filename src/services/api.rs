use crate::core::error::ApiError;
use crate::core::models::{
    GenerationContext, Layer, LayerId, LayerOrder, LayerPatch, NewLayer, ProjectId, Scene,
    SubmittedTask, TaskPoll,
};
use async_trait::async_trait;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The remote data and generation service, as seen by the editor.
#[async_trait]
pub trait StudioApi: Send + Sync {
    async fn list_layers(&self, project_id: ProjectId) -> ApiResult<Vec<Layer>>;
    async fn create_layer(&self, layer: &NewLayer) -> ApiResult<Layer>;
    async fn update_layer(&self, id: LayerId, patch: &LayerPatch) -> ApiResult<Layer>;
    async fn delete_layer(&self, id: LayerId) -> ApiResult<()>;
    async fn reorder_layers(&self, project_id: ProjectId, orders: &[LayerOrder]) -> ApiResult<()>;

    async fn submit_generation(
        &self,
        prompt: &str,
        context: &GenerationContext,
    ) -> ApiResult<SubmittedTask>;
    async fn poll_generation(&self, task_id: &str) -> ApiResult<TaskPoll>;

    async fn analyze_story(&self, story_text: &str) -> ApiResult<Vec<Scene>>;
    async fn save_storyboard(&self, project_id: ProjectId, scenes: &[Scene]) -> ApiResult<Vec<Scene>>;
    async fn generate_all(&self, project_id: ProjectId) -> ApiResult<Vec<Layer>>;
    async fn list_storyboard(&self, project_id: ProjectId) -> ApiResult<Vec<Scene>>;
}
