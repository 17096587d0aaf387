//! Promptloom - prompt template expansion and a paced generation task queue
//!
//! Prompts are built from reusable pieces stored in named libraries and referenced as
//! `<library.piece>`. Expanded prompts are queued as image generation tasks and worked through
//! one at a time by a scheduler that paces, retries and throttles requests.

pub mod error;
pub mod generation;
pub mod id;
pub mod prompt;
pub mod queue;
pub mod scheduler;

pub use error::{LoomError, Result};
