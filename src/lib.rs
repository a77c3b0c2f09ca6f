pub mod canvas;
pub mod core;
pub mod services;
