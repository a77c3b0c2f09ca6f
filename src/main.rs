mod terminal;

use anyhow::Result;
use comic_studio::core::config::Config;
use comic_studio::core::events::EventBus;
use comic_studio::services::editor::EditorSession;
use comic_studio::services::http::HttpStudioApi;
use inquire::CustomType;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with an 'api.base_url' entry.");
            return Err(e);
        }
    };

    let project_id = match config.project_id {
        Some(id) => id,
        None => CustomType::<i64>::new("Project id:").prompt()?,
    };

    let api = Arc::new(HttpStudioApi::new(&config.api)?);
    let events = EventBus::new();
    let receiver = events.subscribe();
    let session = EditorSession::open(api, events, project_id).await;

    terminal::run(session, receiver).await
}
