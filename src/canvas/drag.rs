use crate::canvas::layers::LayerStore;
use crate::core::events::{EventBus, StudioEvent};
use crate::core::models::{LayerId, LayerPatch, Point, Tool};
use crate::services::api::StudioApi;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragSession {
    layer_id: LayerId,
    origin: Point,
    start: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

/// Pointer-driven repositioning of a single layer.
///
/// Moves only touch the [`LayerStore`]; the release issues one position
/// write to the data service. A rejected write leaves the dragged position
/// in place and raises the store's error indicator. Writes for the same
/// layer reach the service in release order.
pub struct DragController {
    store: Arc<LayerStore>,
    api: Arc<dyn StudioApi>,
    events: EventBus,
    state: DragState,
    /// Completion signal of the latest write issued per layer.
    last_write: HashMap<LayerId, oneshot::Receiver<()>>,
}

impl DragController {
    pub fn new(store: Arc<LayerStore>, api: Arc<dyn StudioApi>, events: EventBus) -> Self {
        Self {
            store,
            api,
            events,
            state: DragState::Idle,
            last_write: HashMap::new(),
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn dragging_layer(&self) -> Option<LayerId> {
        match self.state {
            DragState::Dragging(session) => Some(session.layer_id),
            DragState::Idle => None,
        }
    }

    /// Pointer down on a layer. Ignored unless the select tool is active.
    pub fn begin_drag(&mut self, layer_id: LayerId, pointer: Point) -> bool {
        if self.store.tool() != Tool::Select {
            return false;
        }
        let Some(layer) = self.store.get(layer_id) else {
            return false;
        };
        if self.is_dragging() {
            self.end_drag();
        }

        self.store.select(Some(layer_id));
        self.state = DragState::Dragging(DragSession {
            layer_id,
            origin: pointer,
            start: layer.position(),
        });
        debug!("drag start: layer {} at {:?}", layer_id, layer.position());
        true
    }

    /// Local-only update. Each position is derived from the drag-start
    /// snapshot, so intermediate moves never accumulate error.
    pub fn on_pointer_move(&mut self, pointer: Point) -> Option<Point> {
        let DragState::Dragging(session) = self.state else {
            return None;
        };
        let position = session
            .start
            .offset(pointer.x - session.origin.x, pointer.y - session.origin.y);
        if self.store.set_position(session.layer_id, position) {
            Some(position)
        } else {
            None
        }
    }

    /// Pointer up. Persists the layer's current position and returns the
    /// handle of the spawned write; `None` when nothing was being dragged.
    pub fn end_drag(&mut self) -> Option<JoinHandle<()>> {
        let DragState::Dragging(session) = std::mem::take(&mut self.state) else {
            return None;
        };
        let id = session.layer_id;
        let Some(layer) = self.store.get(id) else {
            debug!("drag end: layer {} no longer exists", id);
            return None;
        };
        let sent = layer.position();
        debug!("drag end: layer {} -> {:?}", id, sent);

        let (done, done_rx) = oneshot::channel();
        let previous = self.last_write.insert(id, done_rx);

        let api = self.api.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                // Resolves with an error if that write task died; go ahead anyway.
                let _ = previous.await;
            }
            match api.update_layer(id, &LayerPatch::position(sent)).await {
                Ok(saved) => {
                    // A newer drag may have moved the layer since; keep that.
                    if store.get(id).map(|l| l.position()) == Some(sent) {
                        store.merge(saved);
                    }
                }
                Err(e) => {
                    warn!("Failed to save position of layer {}: {}", id, e);
                    let message = format!("failed to update comic image: {}", e.user_message());
                    store.set_error(message.clone());
                    events.publish(StudioEvent::PersistFailed {
                        layer_id: Some(id),
                        message,
                    });
                }
            }
            let _ = done.send(());
        }))
    }

    /// Pointer left the canvas: same as a release.
    pub fn pointer_leave(&mut self) -> Option<JoinHandle<()>> {
        self.end_drag()
    }

    /// Abort the drag and put the layer back where it started. No write.
    pub fn cancel_drag(&mut self) -> bool {
        let DragState::Dragging(session) = std::mem::take(&mut self.state) else {
            return false;
        };
        self.store.set_position(session.layer_id, session.start);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{sample_layer, Call, MockStudioApi};
    use tokio::sync::Notify;

    fn setup(api: Arc<MockStudioApi>) -> (DragController, Arc<LayerStore>, EventBus) {
        let store = Arc::new(LayerStore::new());
        let mut layer = sample_layer(1, 1);
        layer.position_x = 10.0;
        layer.position_y = 20.0;
        store.replace_all(vec![layer, sample_layer(2, 2)]);
        let events = EventBus::new();
        (DragController::new(store.clone(), api, events.clone()), store, events)
    }

    fn position_writes(api: &MockStudioApi) -> Vec<(LayerId, LayerPatch)> {
        api.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateLayer(id, patch) => Some((id, patch)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_final_position_is_start_plus_total_delta() {
        let mut server_layer = sample_layer(1, 1);
        server_layer.position_x = 10.0;
        server_layer.position_y = 20.0;
        let api = MockStudioApi::with_layers(vec![server_layer]);
        let (mut drag, store, _) = setup(api.clone());

        assert!(drag.begin_drag(1, Point::new(100.0, 100.0)));
        drag.on_pointer_move(Point::new(110.0, 105.0));
        drag.on_pointer_move(Point::new(300.0, -40.0));
        drag.on_pointer_move(Point::new(130.0, 130.0));
        assert!(api.calls().is_empty(), "moves must not touch the network");

        drag.end_drag().unwrap().await.unwrap();

        assert!(!drag.is_dragging());
        assert_eq!(store.get(1).unwrap().position(), Point::new(40.0, 50.0));
        let writes = position_writes(&api);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], (1, LayerPatch::position(Point::new(40.0, 50.0))));
    }

    #[tokio::test]
    async fn test_end_without_begin_is_noop() {
        let api = MockStudioApi::new();
        let (mut drag, _, _) = setup(api.clone());

        assert!(drag.end_drag().is_none());
        assert!(drag.on_pointer_move(Point::new(5.0, 5.0)).is_none());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_begin_requires_select_tool() {
        let api = MockStudioApi::new();
        let (mut drag, store, _) = setup(api);

        store.set_tool(Tool::Brush);
        assert!(!drag.begin_drag(1, Point::new(0.0, 0.0)));
        assert_eq!(store.selected_id(), None);

        store.set_tool(Tool::Select);
        assert!(drag.begin_drag(1, Point::new(0.0, 0.0)));
        assert_eq!(store.selected_id(), Some(1));
        assert_eq!(drag.dragging_layer(), Some(1));
    }

    #[tokio::test]
    async fn test_pointer_leave_releases() {
        let api = MockStudioApi::with_layers(vec![sample_layer(1, 1)]);
        let (mut drag, _, _) = setup(api.clone());

        drag.begin_drag(1, Point::new(0.0, 0.0));
        drag.on_pointer_move(Point::new(-500.0, 3.0));
        drag.pointer_leave().unwrap().await.unwrap();

        assert!(!drag.is_dragging());
        assert_eq!(
            position_writes(&api),
            vec![(1, LayerPatch::position(Point::new(-490.0, 23.0)))]
        );
    }

    #[tokio::test]
    async fn test_rejected_write_keeps_local_position() {
        let api = MockStudioApi::new();
        api.fail("update_layer");
        let (mut drag, store, events) = setup(api.clone());
        let mut rx = events.subscribe();

        drag.begin_drag(1, Point::new(0.0, 0.0));
        drag.on_pointer_move(Point::new(5.0, 5.0));
        drag.end_drag().unwrap().await.unwrap();

        assert!(!drag.is_dragging());
        assert_eq!(store.get(1).unwrap().position(), Point::new(15.0, 25.0));
        assert!(store.error().unwrap().contains("update_layer rejected"));
        match rx.recv().await.unwrap() {
            StudioEvent::PersistFailed { layer_id, .. } => assert_eq!(layer_id, Some(1)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_back_to_back_drags_reach_server_in_order() {
        let mut server_layer = sample_layer(1, 1);
        server_layer.position_x = 10.0;
        server_layer.position_y = 20.0;
        let api = MockStudioApi::with_layers(vec![server_layer]);
        let gate = Arc::new(Notify::new());
        *api.update_gate.lock().unwrap() = Some(gate.clone());
        let (mut drag, store, _) = setup(api.clone());

        drag.begin_drag(1, Point::new(0.0, 0.0));
        drag.on_pointer_move(Point::new(10.0, 10.0));
        let first = drag.end_drag().unwrap();

        drag.begin_drag(1, Point::new(0.0, 0.0));
        drag.on_pointer_move(Point::new(40.0, 40.0));
        let second = drag.end_drag().unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(position_writes(&api).len(), 1, "second write waits for the first");

        gate.notify_one();
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            position_writes(&api),
            vec![
                (1, LayerPatch::position(Point::new(20.0, 30.0))),
                (1, LayerPatch::position(Point::new(60.0, 70.0))),
            ]
        );
        assert_eq!(api.layers.lock().unwrap()[0].position(), Point::new(60.0, 70.0));
        assert_eq!(store.get(1).unwrap().position(), Point::new(60.0, 70.0));
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn test_cancel_restores_start_without_write() {
        let api = MockStudioApi::new();
        let (mut drag, store, _) = setup(api.clone());

        drag.begin_drag(1, Point::new(0.0, 0.0));
        drag.on_pointer_move(Point::new(50.0, 50.0));
        assert!(drag.cancel_drag());

        assert_eq!(store.get(1).unwrap().position(), Point::new(10.0, 20.0));
        assert!(drag.end_drag().is_none());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_layer_deleted_mid_drag_skips_write() {
        let api = MockStudioApi::new();
        let (mut drag, store, _) = setup(api.clone());

        drag.begin_drag(2, Point::new(0.0, 0.0));
        store.remove(2);
        assert!(drag.on_pointer_move(Point::new(1.0, 1.0)).is_none());
        assert!(drag.end_drag().is_none());
        assert!(api.calls().is_empty());
    }
}
