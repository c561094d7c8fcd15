//! Per-target research state
//!
//! One [`ResearchState`] is owned by one orchestrator run and mutated only
//! by its stage functions, in sequence. Evidence is append-only and unique
//! by URL; exhausted queries only grow and never re-enter the pending list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::search::SearchHit;

/// Separator between rendered evidence blocks
const EVIDENCE_SEPARATOR: &str = "\n\n---\n\n";

/// One piece of retained search content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub source_url: String,
    pub content: String,
}

impl Evidence {
    pub fn new(source_url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            content: content.into(),
        }
    }
}

/// Orchestrator stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResearchStage {
    /// Broad first search
    #[default]
    GatherInitial,
    /// Draft update and follow-up query proposal, then termination check
    AnalyzeAndPlan,
    /// Follow-up searches for the pending queries
    DrillDown,
    /// Free-text report over all evidence
    Synthesize,
    /// Flatten the report into the output record
    Structure,
    Done,
}

impl ResearchStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GatherInitial => "gather_initial",
            Self::AnalyzeAndPlan => "analyze_and_plan",
            Self::DrillDown => "drill_down",
            Self::Synthesize => "synthesize",
            Self::Structure => "structure",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ResearchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the research loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoPendingQueries,
    IterationBudget,
    CallBudget,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoPendingQueries => "no pending queries",
            Self::IterationBudget => "iteration budget reached",
            Self::CallBudget => "api call budget reached",
        };
        f.write_str(reason)
    }
}

/// Hard per-target limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchBudget {
    pub max_iterations: usize,
    /// Search calls, initial and drill-down combined
    pub max_api_calls: usize,
    /// Pending queries taken per drill-down
    pub drill_down_width: usize,
    pub initial_max_results: usize,
    pub drill_down_max_results: usize,
}

impl Default for ResearchBudget {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_api_calls: 40,
            drill_down_width: 3,
            initial_max_results: 4,
            drill_down_max_results: 3,
        }
    }
}

impl ResearchBudget {
    /// Termination check run after each planning stage
    pub fn stop_reason(&self, state: &ResearchState) -> Option<StopReason> {
        if state.pending_queries.is_empty() {
            Some(StopReason::NoPendingQueries)
        } else if state.iteration_count >= self.max_iterations {
            Some(StopReason::IterationBudget)
        } else if state.api_call_count >= self.max_api_calls {
            Some(StopReason::CallBudget)
        } else {
            None
        }
    }

    pub fn can_call(&self, state: &ResearchState) -> bool {
        state.api_call_count < self.max_api_calls
    }
}

/// State of one target's research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    pub target_id: String,
    pub evidence: Vec<Evidence>,
    pub visited_urls: HashSet<String>,
    /// Replaced wholesale by each planning stage
    pub draft_record: Value,
    pub pending_queries: Vec<String>,
    pub exhausted_queries: BTreeSet<String>,
    pub queries_run_this_iteration: Vec<String>,
    pub iteration_count: usize,
    pub api_call_count: usize,
    pub final_text: Option<String>,
    pub structured_output: Option<Map<String, Value>>,
}

impl ResearchState {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            evidence: Vec::new(),
            visited_urls: HashSet::new(),
            draft_record: Value::Object(Map::new()),
            pending_queries: Vec::new(),
            exhausted_queries: BTreeSet::new(),
            queries_run_this_iteration: Vec::new(),
            iteration_count: 0,
            api_call_count: 0,
            final_text: None,
            structured_output: None,
        }
    }

    /// Append hits whose URL has not been seen. Returns how many were added.
    pub fn accept_evidence(&mut self, hits: Vec<SearchHit>) -> usize {
        let before = self.evidence.len();
        for hit in hits {
            if hit.content.trim().is_empty() || self.visited_urls.contains(&hit.url) {
                continue;
            }
            self.visited_urls.insert(hit.url.clone());
            self.evidence.push(Evidence::new(hit.url, hit.content));
        }
        self.evidence.len() - before
    }

    /// Reconcile the planner's proposals against what just ran.
    ///
    /// Proposals are trimmed and deduplicated. A proposal that ran in the
    /// iteration just finished is moved to `exhausted_queries`; one already
    /// exhausted is dropped. The rest replace `pending_queries`.
    pub fn reconcile(&mut self, proposed: Vec<String>) {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for query in proposed {
            let query = query.trim().to_string();
            if query.is_empty() || !seen.insert(query.clone()) {
                continue;
            }
            if self.queries_run_this_iteration.contains(&query) {
                self.exhausted_queries.insert(query);
            } else if !self.exhausted_queries.contains(&query) {
                pending.push(query);
            }
        }

        self.pending_queries = pending;
        self.queries_run_this_iteration.clear();
    }

    /// Evidence rendered as prompt context
    pub fn context(&self) -> String {
        self.evidence
            .iter()
            .map(|e| format!("URL: {}\nCONTENT: {}", e.source_url, e.content))
            .collect::<Vec<_>>()
            .join(EVIDENCE_SEPARATOR)
    }

    /// Structured output with at least one field
    pub fn has_structured_output(&self) -> bool {
        self.structured_output.as_ref().is_some_and(|m| !m.is_empty())
    }
}
