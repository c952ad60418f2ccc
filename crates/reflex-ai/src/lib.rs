//! reflex-ai: Generative-model backend abstraction
//!
//! This crate defines the conversation items exchanged with a model backend and
//! two wire adapters: OpenAI-compatible chat completions and the responses API.
//! Backend output is kept as an ordered bundle of items, including items the
//! caller does not interpret, so it can be replayed verbatim on the next turn.

pub mod backend;
pub mod error;
pub mod providers;
pub mod types;

pub use backend::{ModelBackend, create_backend};
pub use error::{Error, Result};
pub use types::*;
