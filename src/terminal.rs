//! Menu-driven front end over an [`EditorSession`].

use anyhow::Result;
use comic_studio::core::events::StudioEvent;
use comic_studio::core::models::{Layer, LayerOrder, Point, SceneEdit, WorkflowStep};
use comic_studio::services::editor::EditorSession;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, CustomType, InquireError, Select, Text};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

#[derive(Debug, Clone, Copy)]
enum Action {
    Generate,
    WriteStory,
    EditScene,
    SaveStoryboard,
    GenerateAll,
    SwitchStep,
    ShowLayers,
    MoveLayer,
    BringToFront,
    DeleteLayer,
    Reload,
    Quit,
}

impl Action {
    const ALL: [Action; 12] = [
        Action::Generate,
        Action::WriteStory,
        Action::EditScene,
        Action::SaveStoryboard,
        Action::GenerateAll,
        Action::SwitchStep,
        Action::ShowLayers,
        Action::MoveLayer,
        Action::BringToFront,
        Action::DeleteLayer,
        Action::Reload,
        Action::Quit,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Generate => "Generate image from prompt",
            Action::WriteStory => "Write story",
            Action::EditScene => "Edit scene",
            Action::SaveStoryboard => "Save storyboard",
            Action::GenerateAll => "Generate all scenes",
            Action::SwitchStep => "Switch step",
            Action::ShowLayers => "Show layers",
            Action::MoveLayer => "Move layer",
            Action::BringToFront => "Bring layer to front",
            Action::DeleteLayer => "Delete layer",
            Action::Reload => "Reload layers",
            Action::Quit => "Quit",
        };
        f.write_str(label)
    }
}

struct LayerChoice(Layer);

impl fmt::Display for LayerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layer = &self.0;
        write!(
            f,
            "#{} {} @ ({:.0}, {:.0}) order {}",
            layer.id,
            layer.label(),
            layer.position_x,
            layer.position_y,
            layer.layer_order
        )
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

/// The single place a notification becomes terminal output.
fn event_line(event: &StudioEvent) -> Option<String> {
    match event {
        StudioEvent::GenerationSubmitted { .. } => None,
        StudioEvent::GenerationCompleted { layer } => Some(format!(
            "New image added as layer #{}: {}",
            layer.id,
            layer.image_url.as_deref().unwrap_or("(no url)")
        )),
        StudioEvent::GenerationFailed { message, .. } => Some(message.clone()),
        StudioEvent::PersistFailed { message, .. } => Some(format!("Not saved: {}", message)),
        StudioEvent::BatchGenerated { count } => Some(format!("{} scene images generated", count)),
    }
}

fn print_events(receiver: &mut broadcast::Receiver<StudioEvent>) {
    loop {
        match receiver.try_recv() {
            Ok(event) => {
                if let Some(line) = event_line(&event) {
                    println!("{}", line);
                }
            }
            Err(TryRecvError::Lagged(n)) => println!("({} events skipped)", n),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

pub async fn run(mut session: EditorSession, mut receiver: broadcast::Receiver<StudioEvent>) -> Result<()> {
    loop {
        print_events(&mut receiver);
        if let Some(error) = session.store().error() {
            println!("! {}", error);
            session.store().clear_error();
        }
        if let Some(error) = session.storyboard().error() {
            println!("! {}", error);
            session.storyboard().clear_error();
        }
        println!(
            "\nProject {} | step: {} | {} layers",
            session.project_id(),
            session.storyboard().step(),
            session.store().len()
        );

        let action = match Select::new("What next?", Action::ALL.to_vec()).prompt() {
            Ok(action) => action,
            Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => break,
            Err(e) => return Err(e.into()),
        };

        let outcome = match action {
            Action::Quit => break,
            Action::Generate => generate(&session).await,
            Action::WriteStory => write_story(&session).await,
            Action::EditScene => edit_scene(&session),
            Action::SaveStoryboard => save_storyboard(&session).await,
            Action::GenerateAll => generate_all(&session).await,
            Action::SwitchStep => switch_step(&session),
            Action::ShowLayers => {
                show_layers(&session);
                Ok(())
            }
            Action::MoveLayer => move_layer(&mut session).await,
            Action::BringToFront => bring_to_front(&session).await,
            Action::DeleteLayer => delete_layer(&session).await,
            Action::Reload => session.refresh_layers().await.map(|_| ()).map_err(Into::into),
        };
        match outcome {
            Ok(()) => {}
            Err(e) => match e.downcast_ref::<InquireError>() {
                Some(InquireError::OperationCanceled) => {}
                _ => println!("Error: {}", e),
            },
        }
    }

    session.close();
    Ok(())
}

async fn generate(session: &EditorSession) -> Result<()> {
    let prompt = Text::new("Describe the image:").prompt()?;
    let character = CustomType::<i64>::new("Character template id:")
        .with_help_message("Esc to generate without a character")
        .prompt_skippable()?;
    let tracker = session.tracker();
    let task = tracker.submit(&prompt, session.generation_context(character)).await?;

    let pb = spinner(&format!("task {} submitted", task.task_id))?;
    while tracker.is_busy() {
        if let Some(current) = tracker.current() {
            pb.set_message(format!("task {}: {:?}", current.task_id, current.status));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    tracker.finished().await;
    pb.finish_and_clear();
    // The outcome is reported through the event bus.
    tracker.clear_result();
    Ok(())
}

async fn write_story(session: &EditorSession) -> Result<()> {
    let story = Text::new("Story:").prompt()?;
    let pb = spinner("analyzing story")?;
    let result = session.storyboard().analyze(&story).await;
    pb.finish_and_clear();
    println!("{} scenes", result?);
    Ok(())
}

fn edit_scene(session: &EditorSession) -> Result<()> {
    let scenes = session.storyboard().scenes();
    if scenes.is_empty() {
        println!("No scenes yet.");
        return Ok(());
    }
    let options: Vec<String> = scenes
        .iter()
        .map(|s| format!("{}. {}", s.sequence, s.description))
        .collect();
    let picked = Select::new("Scene:", options).raw_prompt()?.index;
    let field = Select::new("Field:", vec!["camera", "description", "dialogue", "mood"]).prompt()?;
    let value = Text::new("New value:").prompt()?;

    let edit = match field {
        "camera" => SceneEdit::Camera(value),
        "dialogue" => SceneEdit::Dialogue(value),
        "mood" => SceneEdit::Mood(value),
        _ => SceneEdit::Description(value),
    };
    session.storyboard().edit_field(picked, edit)?;
    Ok(())
}

async fn save_storyboard(session: &EditorSession) -> Result<()> {
    session.storyboard().save(session.project_id()).await?;
    println!("Storyboard saved.");
    Ok(())
}

async fn generate_all(session: &EditorSession) -> Result<()> {
    let pb = spinner("generating every scene")?;
    let result = session.storyboard().generate_all(session.project_id()).await;
    pb.finish_and_clear();
    result?;
    for scene in session.storyboard().scenes() {
        println!(
            "{}. {} -> {}",
            scene.sequence,
            scene.description,
            scene.image_url.as_deref().unwrap_or("(no image)")
        );
    }
    Ok(())
}

fn switch_step(session: &EditorSession) -> Result<()> {
    let steps = vec![WorkflowStep::Input, WorkflowStep::Edit, WorkflowStep::Result];
    let step = Select::new("Step:", steps)
        .with_starting_cursor(session.storyboard().step().index())
        .prompt()?;
    session.storyboard().go_to(step);
    Ok(())
}

fn show_layers(session: &EditorSession) {
    let layers = session.store().stacked();
    if layers.is_empty() {
        println!("No layers.");
    }
    for layer in layers {
        println!("{}", LayerChoice(layer));
    }
}

fn pick_layer(session: &EditorSession) -> Result<Option<Layer>> {
    let layers: Vec<LayerChoice> = session.store().stacked().into_iter().map(LayerChoice).collect();
    if layers.is_empty() {
        println!("No layers.");
        return Ok(None);
    }
    Ok(Some(Select::new("Layer:", layers).prompt()?.0))
}

async fn move_layer(session: &mut EditorSession) -> Result<()> {
    let Some(layer) = pick_layer(session)? else {
        return Ok(());
    };
    let dx = CustomType::<f64>::new("Move right by:").with_default(0.0).prompt()?;
    let dy = CustomType::<f64>::new("Move down by:").with_default(0.0).prompt()?;

    let drag = session.drag();
    if !drag.begin_drag(layer.id, Point::new(0.0, 0.0)) {
        println!("Switch to the select tool to move layers.");
        return Ok(());
    }
    drag.on_pointer_move(Point::new(dx, dy));
    if let Some(write) = drag.end_drag() {
        write.await?;
    }
    Ok(())
}

async fn bring_to_front(session: &EditorSession) -> Result<()> {
    let Some(layer) = pick_layer(session)? else {
        return Ok(());
    };
    let order = session.store().next_layer_order();
    session
        .reorder_layers(vec![LayerOrder { image_id: layer.id, order }])
        .await?;
    Ok(())
}

async fn delete_layer(session: &EditorSession) -> Result<()> {
    let Some(layer) = pick_layer(session)? else {
        return Ok(());
    };
    let confirmed = Confirm::new(&format!("Delete layer #{}?", layer.id))
        .with_default(false)
        .prompt()?;
    if confirmed {
        session.delete_layer(layer.id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use comic_studio::core::events::EventBus;

    fn layer(id: i64) -> Layer {
        Layer {
            id,
            project_id: Some(1),
            character_template_id: None,
            prompt: Some("a fox".to_string()),
            image_url: Some(format!("http://img/{}.png", id)),
            task_id: Some("task-1".to_string()),
            status: None,
            position_x: 0.0,
            position_y: 0.0,
            width: 512.0,
            height: 512.0,
            layer_order: 1,
        }
    }

    #[tokio::test]
    async fn test_generation_outcome_reported_once() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        events.publish(StudioEvent::GenerationSubmitted {
            task_id: "task-1".to_string(),
        });
        events.publish(StudioEvent::GenerationCompleted { layer: layer(4) });
        events.publish(StudioEvent::GenerationFailed {
            task_id: "task-2".to_string(),
            message: "generation failed: content policy".to_string(),
        });

        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            lines.extend(event_line(&event));
        }
        assert_eq!(
            lines,
            vec![
                "New image added as layer #4: http://img/4.png".to_string(),
                "generation failed: content policy".to_string(),
            ]
        );
    }
}
