use crate::core::config::ApiConfig;
use crate::core::error::ApiError;
use crate::core::models::{
    GenerationContext, Layer, LayerId, LayerOrder, LayerPatch, NewLayer, ProjectId, Scene,
    SubmittedTask, TaskPoll,
};
use crate::services::api::{ApiResult, StudioApi};
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

/// reqwest client for the comic data service (`/comics/*`, `/stories/*`).
#[derive(Debug, Clone)]
pub struct HttpStudioApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpStudioApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url()?,
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Decode(format!("bad path {}: {}", path, e)))
    }

    fn authorized(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        Ok(self.authorized(method, self.endpoint(path)?))
    }

    /// `dir` plus `segment` as a single percent-encoded path segment.
    fn request_segment(&self, method: Method, dir: &str, segment: &str) -> ApiResult<RequestBuilder> {
        let mut url = self.endpoint(dir)?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Decode(format!("base url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push(segment);
        Ok(self.authorized(method, url))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, fallback: &str) -> ApiResult<T> {
        let resp = checked(builder.send().await?, fallback).await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(format!("{}. Body: {}", e, text)))
    }

    async fn send_empty(&self, builder: RequestBuilder, fallback: &str) -> ApiResult<()> {
        checked(builder.send().await?, fallback).await?;
        Ok(())
    }
}

async fn checked(resp: Response, fallback: &str) -> ApiResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message: error_message(&body, fallback),
    })
}

/// The service reports failures as `{"error": "..."}`.
fn error_message(body: &str, fallback: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    project_id: ProjectId,
    prompt: &'a str,
    character_template_id: Option<i64>,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    scenes: Vec<Scene>,
}

#[derive(Deserialize)]
struct GenerateAllResponse {
    #[serde(default)]
    images: Vec<Layer>,
}

#[async_trait]
impl StudioApi for HttpStudioApi {
    async fn list_layers(&self, project_id: ProjectId) -> ApiResult<Vec<Layer>> {
        let req = self.request(Method::GET, &format!("comics/project/{}", project_id))?;
        self.send(req, "failed to load comic images").await
    }

    async fn create_layer(&self, layer: &NewLayer) -> ApiResult<Layer> {
        let req = self.request(Method::POST, "comics")?.json(layer);
        self.send(req, "failed to create comic image").await
    }

    async fn update_layer(&self, id: LayerId, patch: &LayerPatch) -> ApiResult<Layer> {
        let req = self.request(Method::PUT, &format!("comics/{}", id))?.json(patch);
        self.send(req, "failed to update comic image").await
    }

    async fn delete_layer(&self, id: LayerId) -> ApiResult<()> {
        let req = self.request(Method::DELETE, &format!("comics/{}", id))?;
        self.send_empty(req, "failed to delete comic image").await
    }

    async fn reorder_layers(&self, project_id: ProjectId, orders: &[LayerOrder]) -> ApiResult<()> {
        let body = json!({ "project_id": project_id, "image_orders": orders });
        let req = self.request(Method::POST, "comics/reorder")?.json(&body);
        self.send_empty(req, "failed to reorder comic images").await
    }

    async fn submit_generation(
        &self,
        prompt: &str,
        context: &GenerationContext,
    ) -> ApiResult<SubmittedTask> {
        let body = GenerateRequest {
            project_id: context.project_id,
            prompt,
            character_template_id: context.character_template_id,
        };
        let req = self.request(Method::POST, "comics/generate")?.json(&body);
        self.send(req, "failed to generate image").await
    }

    async fn poll_generation(&self, task_id: &str) -> ApiResult<TaskPoll> {
        let req = self.request_segment(Method::GET, "comics/status/", task_id)?;
        self.send(req, "failed to check generation status").await
    }

    async fn analyze_story(&self, story_text: &str) -> ApiResult<Vec<Scene>> {
        let req = self
            .request(Method::POST, "stories/analyze")?
            .json(&json!({ "story_text": story_text }));
        let resp: AnalyzeResponse = self.send(req, "failed to analyze story").await?;
        Ok(resp.scenes)
    }

    async fn save_storyboard(&self, project_id: ProjectId, scenes: &[Scene]) -> ApiResult<Vec<Scene>> {
        let body = json!({ "project_id": project_id, "scenes": scenes });
        let req = self.request(Method::POST, "stories/save")?.json(&body);
        self.send(req, "failed to save storyboard").await
    }

    async fn generate_all(&self, project_id: ProjectId) -> ApiResult<Vec<Layer>> {
        let req = self
            .request(Method::POST, "stories/generate_all")?
            .json(&json!({ "project_id": project_id }));
        let resp: GenerateAllResponse = self.send(req, "batch generation failed").await?;
        Ok(resp.images)
    }

    async fn list_storyboard(&self, project_id: ProjectId) -> ApiResult<Vec<Scene>> {
        let req = self.request(Method::GET, &format!("stories/list/{}", project_id))?;
        self.send(req, "failed to load storyboard").await
    }
}
