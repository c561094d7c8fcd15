//! Per-target research
//!
//! ```text
//! GatherInitial ──▶ AnalyzeAndPlan ──(pending, budget left)──▶ DrillDown
//!                        ▲                                         │
//!                        └─────────────────────────────────────────┘
//!                        │
//!                        └──(no pending | budget spent)──▶ Synthesize ──▶ Structure ──▶ Done
//! ```
//!
//! - `state` - research state, stages, budget and reconciliation
//! - `prompts` - prompt templates and output schemas per stage
//! - `orchestrator` - the driver loop and stage functions

pub mod orchestrator;
pub mod prompts;
pub mod state;

pub use orchestrator::{ResearchOrchestrator, SYNTHESIS_FAILED_MARKER};
pub use prompts::{PromptBuilder, ResearchPrompts, IDENTIFIER_FIELD, RESEARCH_PREAMBLE};
pub use state::{Evidence, ResearchBudget, ResearchStage, ResearchState, StopReason};
