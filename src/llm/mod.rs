//! Completion layer
//!
//! - [`client`]: request type, backend and service traits, rotating client
//! - [`schema`]: JSON extraction and key validation for structured replies
//! - [`rig_backend`]: provider calls through rig-core

pub mod client;
pub mod rig_backend;
pub mod schema;

pub use client::{CompletionBackend, CompletionClient, CompletionRequest, CompletionService};
pub use rig_backend::{classify_provider_error, LlmProvider, RigCompletionBackend};
pub use schema::{extract_json_object, OutputSchema};
