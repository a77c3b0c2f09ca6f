pub mod api;
pub mod editor;
pub mod generation;
pub mod http;
pub mod storyboard;

#[cfg(test)]
pub mod testing;
