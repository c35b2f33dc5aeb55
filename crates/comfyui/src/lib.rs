//! ComfyUI REST client library.
//!
//! Provides HTTP API wrappers, the txt2img workflow builder, typed
//! history parsing, and [`ComfyUIGenerator`], which turns a prompt into a
//! validated PNG [`Artifact`](imagen_core::Artifact) by submitting a
//! workflow and polling its history.

pub mod api;
pub mod generator;
pub mod history;
pub mod workflow;

pub use api::{ComfyUIApi, ComfyUIApiError};
pub use generator::{ComfyUIGenerator, GenerationError};
pub use workflow::GenerationParams;
