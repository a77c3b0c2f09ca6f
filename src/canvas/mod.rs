pub mod drag;
pub mod layers;

pub use drag::DragController;
pub use layers::LayerStore;
