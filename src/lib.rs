//! NexusCape: a layered pixel-art editor for 64×32 cape textures.
//!
//! All state changes go through [`project::Project::dispatch`]; the render
//! pipeline republishes the visible composite to registered consumers.

pub mod app;
pub mod canvas;
pub mod cli;
pub mod command;
pub mod components;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod render;
pub mod settings;

pub use canvas::{Layer, LayerStack, PixelBuffer};
pub use command::EditorCommand;
pub use error::EditorError;
pub use project::Project;
