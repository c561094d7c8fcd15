//! scholarship-research-agent: bounded iterative research over the web
//!
//! For each scholarship name, a research run searches the web, asks an LLM
//! to fill a draft and name what is missing, drills down on the gaps within
//! fixed iteration and call budgets, then writes a report and a flat record.
//! Many runs go in parallel per batch, sharing rotating API key pools.
//!
//! - `RotatingCredentials`: round-robin API keys shared by every task
//! - `RotationPolicy`: retry on quota errors with the next key
//! - `SearchClient`: Tavily search that degrades to empty results
//! - `CompletionService`: structured and free-text completions via Rig
//! - `ResearchOrchestrator`: the per-target state machine
//! - `BatchRunner`: batched fan-out with one persistence write per batch
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scholarship_research_agent::*;
//!
//! let tavily_keys = Arc::new(RotatingCredentials::from_env("TAVILY_API_KEY")?);
//! let llm_keys = Arc::new(RotatingCredentials::from_env("GOOGLE_API_KEY")?);
//!
//! let search = TavilySearchClient::new(tavily_keys);
//! let backend = RigCompletionBackend::for_provider(LlmProvider::Gemini);
//! let completion = CompletionClient::new(Arc::new(backend), llm_keys);
//!
//! let orchestrator = ResearchOrchestrator::new(Arc::new(search), Arc::new(completion));
//! let state = orchestrator.run("Chevening Scholarship").await?;
//! ```

pub mod batch;
pub mod config;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod persistence;
pub mod research;
pub mod retry;
pub mod search;
pub mod targets;

// Re-exports for convenience
pub use batch::{BatchReport, BatchRunner, RunSummary, TargetFailure};
pub use config::{HarvestConfig, ScholarshipLevel};
pub use credentials::{Credential, RotatingCredentials};
pub use error::{CompletionError, CredentialError, PersistenceError, ResearchError, SearchError};
pub use retry::{RotationError, RotationPolicy};
pub use targets::{load_targets, slice_targets, TARGET_COLUMN};

// Search and completion exports
pub use llm::{
    CompletionBackend, CompletionClient, CompletionRequest, CompletionService,
    LlmProvider, OutputSchema, RigCompletionBackend,
};
pub use search::{SearchClient, SearchDepth, SearchHit, TavilySearchClient, Topic};

// Research exports
pub use persistence::{PersistencePaths, PersistenceSink, TargetRecord};
pub use research::{
    Evidence, ResearchBudget, ResearchOrchestrator, ResearchPrompts, ResearchStage,
    ResearchState, StopReason, IDENTIFIER_FIELD, SYNTHESIS_FAILED_MARKER,
};
