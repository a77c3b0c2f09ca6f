use crate::core::models::{Layer, LayerId, LayerOrder, LayerPatch, Point, Tool};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct CanvasState {
    /// Kept sorted by ascending `layer_order` after bulk loads and reorders.
    layers: Vec<Layer>,
    selected: Option<LayerId>,
    tool: Tool,
    error: Option<String>,
}

/// The single in-memory copy of the active project's layers.
///
/// Every mutation is keyed by layer id and last-writer-wins; callers never
/// hold the lock across an `.await`.
#[derive(Debug, Default)]
pub struct LayerStore {
    state: RwLock<CanvasState>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CanvasState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CanvasState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Collection ---

    pub fn replace_all(&self, mut layers: Vec<Layer>) {
        layers.sort_by_key(|l| l.layer_order);
        let mut state = self.write();
        if let Some(id) = state.selected {
            if !layers.iter().any(|l| l.id == id) {
                state.selected = None;
            }
        }
        state.layers = layers;
    }

    pub fn push(&self, layer: Layer) {
        let mut state = self.write();
        match state.layers.iter_mut().find(|l| l.id == layer.id) {
            Some(existing) => *existing = layer,
            None => state.layers.push(layer),
        }
    }

    pub fn get(&self, id: LayerId) -> Option<Layer> {
        self.read().layers.iter().find(|l| l.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().layers.is_empty()
    }

    /// Layers in storage order (ascending `layer_order`).
    pub fn snapshot(&self) -> Vec<Layer> {
        self.read().layers.clone()
    }

    /// Layers front-most first, the order the layer panel lists them.
    pub fn stacked(&self) -> Vec<Layer> {
        let mut layers = self.snapshot();
        layers.sort_by(|a, b| b.layer_order.cmp(&a.layer_order));
        layers
    }

    /// Stacking order for a layer added on top of everything else.
    pub fn next_layer_order(&self) -> i64 {
        self.read()
            .layers
            .iter()
            .map(|l| l.layer_order)
            .max()
            .map_or(1, |max| max + 1)
    }

    pub fn clear(&self) {
        let mut state = self.write();
        state.layers.clear();
        state.selected = None;
    }

    // --- Item mutation ---

    /// Local-only position write used while dragging. Returns false if the
    /// layer is gone.
    pub fn set_position(&self, id: LayerId, position: Point) -> bool {
        let mut state = self.write();
        match state.layers.iter_mut().find(|l| l.id == id) {
            Some(layer) => {
                layer.position_x = position.x;
                layer.position_y = position.y;
                true
            }
            None => false,
        }
    }

    pub fn patch(&self, id: LayerId, patch: &LayerPatch) -> bool {
        let mut state = self.write();
        match state.layers.iter_mut().find(|l| l.id == id) {
            Some(layer) => {
                layer.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Replace the local copy with the server's version of the same layer.
    pub fn merge(&self, layer: Layer) -> bool {
        let mut state = self.write();
        match state.layers.iter_mut().find(|l| l.id == layer.id) {
            Some(existing) => {
                *existing = layer;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: LayerId) -> Option<Layer> {
        let mut state = self.write();
        let index = state.layers.iter().position(|l| l.id == id)?;
        let removed = state.layers.remove(index);
        if state.selected == Some(id) {
            state.selected = None;
        }
        Some(removed)
    }

    pub fn apply_order(&self, orders: &[LayerOrder]) {
        let mut state = self.write();
        for entry in orders {
            if let Some(layer) = state.layers.iter_mut().find(|l| l.id == entry.image_id) {
                layer.layer_order = entry.order;
            }
        }
        state.layers.sort_by_key(|l| l.layer_order);
    }

    // --- Selection & tool ---

    pub fn select(&self, id: Option<LayerId>) {
        self.write().selected = id;
    }

    pub fn selected_id(&self) -> Option<LayerId> {
        self.read().selected
    }

    pub fn selected(&self) -> Option<Layer> {
        let state = self.read();
        let id = state.selected?;
        state.layers.iter().find(|l| l.id == id).cloned()
    }

    pub fn tool(&self) -> Tool {
        self.read().tool
    }

    pub fn set_tool(&self, tool: Tool) {
        self.write().tool = tool;
    }

    // --- Error indicator ---

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.write().error = Some(message.into());
    }

    pub fn clear_error(&self) {
        self.write().error = None;
    }
}
