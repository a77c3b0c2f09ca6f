//! User-facing notifications, fanned out over a `tokio::sync::broadcast`
//! channel so any front end can surface them.

use crate::core::models::{Layer, LayerId};
use log::debug;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum StudioEvent {
    GenerationSubmitted { task_id: String },
    /// The generated image was added to the canvas.
    GenerationCompleted { layer: Layer },
    GenerationFailed { task_id: String, message: String },
    /// A write to the data service was rejected; local state was kept.
    PersistFailed { layer_id: Option<LayerId>, message: String },
    BatchGenerated { count: usize },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StudioEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StudioEvent) {
        if self.tx.send(event).is_err() {
            debug!("event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
