//! Research orchestrator
//!
//! Drives one target through
//! `GatherInitial -> AnalyzeAndPlan -> (DrillDown -> AnalyzeAndPlan)* ->
//! Synthesize -> Structure -> Done`.
//!
//! Each stage function mutates the state and returns the next stage. Search
//! and completion failures are absorbed at the stage that saw them, so a run
//! that starts always reaches `Done`.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::prompts::{ResearchPrompts, IDENTIFIER_FIELD, RESEARCH_PREAMBLE};
use super::state::{ResearchBudget, ResearchStage, ResearchState};
use crate::error::ResearchError;
use crate::llm::{CompletionRequest, CompletionService};
use crate::search::SearchClient;

/// Leading text of the report written when synthesis fails
pub const SYNTHESIS_FAILED_MARKER: &str = "[synthesis failed";

/// Runs the research state machine for one target at a time
pub struct ResearchOrchestrator {
    search: Arc<dyn SearchClient>,
    completion: Arc<dyn CompletionService>,
    budget: ResearchBudget,
}

impl ResearchOrchestrator {
    pub fn new(search: Arc<dyn SearchClient>, completion: Arc<dyn CompletionService>) -> Self {
        Self {
            search,
            completion,
            budget: ResearchBudget::default(),
        }
    }

    pub fn with_budget(mut self, budget: ResearchBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> &ResearchBudget {
        &self.budget
    }

    /// Research one target from scratch to its structured record
    pub async fn run(&self, target_id: &str) -> Result<ResearchState, ResearchError> {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(ResearchError::EmptyTarget);
        }

        info!(target = %target_id, "Starting research");

        let mut state = ResearchState::new(target_id);
        let mut stage = ResearchStage::GatherInitial;
        while !stage.is_terminal() {
            debug!(target = %state.target_id, stage = %stage, "Entering stage");
            stage = self.step(stage, &mut state).await;
        }

        info!(
            target = %state.target_id,
            iterations = state.iteration_count,
            api_calls = state.api_call_count,
            evidence = state.evidence.len(),
            exhausted = state.exhausted_queries.len(),
            "Research complete"
        );
        Ok(state)
    }

    /// Execute a single stage and return the next one
    pub async fn step(&self, stage: ResearchStage, state: &mut ResearchState) -> ResearchStage {
        match stage {
            ResearchStage::GatherInitial => self.gather_initial(state).await,
            ResearchStage::AnalyzeAndPlan => self.analyze_and_plan(state).await,
            ResearchStage::DrillDown => self.drill_down(state).await,
            ResearchStage::Synthesize => self.synthesize(state).await,
            ResearchStage::Structure => self.structure(state).await,
            ResearchStage::Done => ResearchStage::Done,
        }
    }

    async fn gather_initial(&self, state: &mut ResearchState) -> ResearchStage {
        if self.budget.can_call(state) {
            let query = ResearchPrompts::initial_query(&state.target_id);
            let hits = self.search.search(&query, self.budget.initial_max_results).await;
            state.api_call_count += 1;

            let added = state.accept_evidence(hits);
            state.queries_run_this_iteration.push(query);
            info!(target = %state.target_id, added, "Initial search done");
        }

        state.iteration_count += 1;
        ResearchStage::AnalyzeAndPlan
    }

    async fn analyze_and_plan(&self, state: &mut ResearchState) -> ResearchStage {
        let request = CompletionRequest::new(ResearchPrompts::analysis(
            &state.target_id,
            &state.context(),
            &state.exhausted_queries,
        ))
        .with_system(RESEARCH_PREAMBLE);

        let proposed = match self
            .completion
            .complete_structured(&request, &ResearchPrompts::analysis_schema())
            .await
        {
            Ok(mut plan) => {
                state.draft_record = plan
                    .get_mut("report_data")
                    .map(Value::take)
                    .unwrap_or(Value::Null);
                proposed_queries(&plan)
            }
            Err(e) => {
                warn!(target = %state.target_id, error = %e, "Planning failed, keeping previous draft");
                Vec::new()
            }
        };

        state.reconcile(proposed);
        debug!(
            target = %state.target_id,
            pending = ?state.pending_queries,
            exhausted = state.exhausted_queries.len(),
            "Plan reconciled"
        );

        match self.budget.stop_reason(state) {
            Some(reason) => {
                // Closing the loop counts as an iteration, capped by the budget
                state.iteration_count = (state.iteration_count + 1).min(self.budget.max_iterations);
                info!(
                    target = %state.target_id,
                    iteration = state.iteration_count,
                    api_calls = state.api_call_count,
                    reason = %reason,
                    "Ending research loop"
                );
                ResearchStage::Synthesize
            }
            None => ResearchStage::DrillDown,
        }
    }

    async fn drill_down(&self, state: &mut ResearchState) -> ResearchStage {
        let batch: Vec<String> = state
            .pending_queries
            .iter()
            .take(self.budget.drill_down_width)
            .cloned()
            .collect();

        let mut executed = 0;
        for query in batch {
            if !self.budget.can_call(state) {
                debug!(target = %state.target_id, "Call budget reached mid drill-down");
                break;
            }

            let hits = self.search.search(&query, self.budget.drill_down_max_results).await;
            state.api_call_count += 1;
            executed += 1;

            let added = state.accept_evidence(hits);
            debug!(target = %state.target_id, query = %query, added, "Drill-down search done");
            state.queries_run_this_iteration.push(query);
        }

        state.pending_queries.drain(..executed);
        state.iteration_count += 1;
        info!(
            target = %state.target_id,
            iteration = state.iteration_count,
            api_calls = state.api_call_count,
            executed,
            evidence = state.evidence.len(),
            "Drill-down done"
        );
        ResearchStage::AnalyzeAndPlan
    }

    async fn synthesize(&self, state: &mut ResearchState) -> ResearchStage {
        let request = CompletionRequest::new(ResearchPrompts::synthesis(
            &state.target_id,
            &state.draft_record,
            &state.context(),
        ))
        .with_system(RESEARCH_PREAMBLE);

        let text = match self.completion.complete_text(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(target = %state.target_id, error = %e, "Synthesis failed");
                format!("{}: {}]", SYNTHESIS_FAILED_MARKER, e)
            }
        };

        state.final_text = Some(text);
        ResearchStage::Structure
    }

    async fn structure(&self, state: &mut ResearchState) -> ResearchStage {
        let report = state.final_text.as_deref().unwrap_or_default();
        let request =
            CompletionRequest::new(ResearchPrompts::structuring(report)).with_system(RESEARCH_PREAMBLE);

        let record = match self
            .completion
            .complete_structured(&request, &ResearchPrompts::structured_schema())
            .await
        {
            Ok(Value::Object(mut record)) => {
                record.insert(
                    IDENTIFIER_FIELD.to_string(),
                    Value::String(state.target_id.clone()),
                );
                record
            }
            Ok(other) => {
                warn!(target = %state.target_id, kind = %json_kind(&other), "Structuring returned a non-object");
                Default::default()
            }
            Err(e) => {
                warn!(target = %state.target_id, error = %e, "Structuring failed");
                Default::default()
            }
        };

        state.structured_output = Some(record);
        ResearchStage::Done
    }
}

/// String entries of the plan's `missing_queries` list
fn proposed_queries(plan: &Value) -> Vec<String> {
    plan.get("missing_queries")
        .and_then(Value::as_array)
        .map(|queries| {
            queries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
