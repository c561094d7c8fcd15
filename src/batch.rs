//! Batch runner
//!
//! Targets are split into contiguous batches. Every target in a batch runs
//! in its own task; the batch is a barrier, after which the successful
//! records are persisted in one pass. A failing or panicking target is
//! reported and skipped, never blocking its siblings.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ResearchError;
use crate::persistence::{PersistenceSink, TargetRecord};
use crate::research::{ResearchOrchestrator, ResearchState};

/// A target that did not produce a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target_id: String,
    pub error: String,
}

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 0-based batch position
    pub index: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<TargetFailure>,
    /// Set when the batch's write to the stores failed
    pub persistence_error: Option<String>,
}

/// Outcome of a full run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: Vec<BatchReport>,
}

impl RunSummary {
    pub fn total_succeeded(&self) -> usize {
        self.batches.iter().map(|b| b.succeeded.len()).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.batches.iter().map(|b| b.failed.len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetFailure> {
        self.batches.iter().flat_map(|b| b.failed.iter())
    }
}

/// Fans targets out over research tasks, one persistence write per batch
pub struct BatchRunner {
    orchestrator: Arc<ResearchOrchestrator>,
    sink: PersistenceSink,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<ResearchOrchestrator>, sink: PersistenceSink) -> Self {
        Self { orchestrator, sink }
    }

    /// Run every target, `batch_size` at a time
    pub async fn run_all(&self, targets: &[String], batch_size: usize) -> RunSummary {
        let targets = distinct_targets(targets);
        let batch_size = batch_size.max(1);
        let total_batches = targets.len().div_ceil(batch_size);

        info!(targets = targets.len(), batch_size, batches = total_batches, "Starting run");

        let mut summary = RunSummary::default();
        for (index, batch) in targets.chunks(batch_size).enumerate() {
            info!(batch = index + 1, of = total_batches, size = batch.len(), "Starting batch");
            let report = self.run_batch(index, batch).await;
            info!(
                batch = index + 1,
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "Batch finished"
            );
            summary.batches.push(report);
        }

        info!(
            succeeded = summary.total_succeeded(),
            failed = summary.total_failed(),
            "Run finished"
        );
        summary
    }

    /// Run one batch to completion and persist its successes
    pub async fn run_batch(&self, index: usize, batch: &[String]) -> BatchReport {
        let handles: Vec<_> = batch
            .iter()
            .map(|target| {
                let orchestrator = Arc::clone(&self.orchestrator);
                let target = target.clone();
                tokio::spawn(async move { orchestrator.run(&target).await })
            })
            .collect();

        let outcomes = join_all(handles).await;

        let mut report = BatchReport {
            index,
            ..Default::default()
        };
        let mut records = Vec::new();

        for (target, outcome) in batch.iter().zip(outcomes) {
            let result: Result<ResearchState, ResearchError> = outcome
                .map_err(|e| ResearchError::Task(e.to_string()))
                .and_then(|r| r);

            match result {
                Ok(state) => {
                    report.succeeded.push(target.clone());
                    records.push(TargetRecord::from(state));
                }
                Err(e) => {
                    error!(target = %target, error = %e, "Target failed");
                    report.failed.push(TargetFailure {
                        target_id: target.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.sink.persist_batch(&records).await {
            error!(batch = index + 1, error = %e, "Failed to persist batch");
            report.persistence_error = Some(e.to_string());
        }

        report
    }
}

/// Trimmed, non-empty, first occurrence wins
fn distinct_targets(targets: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for target in targets {
        let target = target.trim();
        if target.is_empty() {
            continue;
        }
        if seen.insert(target.to_string()) {
            distinct.push(target.to_string());
        } else {
            warn!(target = %target, "Skipping duplicate target");
        }
    }
    distinct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use crate::llm::{CompletionRequest, CompletionService, OutputSchema};
    use crate::persistence::PersistencePaths;
    use crate::search::{SearchClient, SearchHit};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    struct OneHitSearch;

    #[async_trait]
    impl SearchClient for OneHitSearch {
        async fn search(&self, query: &str, _max_results: usize) -> Vec<SearchHit> {
            vec![SearchHit::new(format!("https://example.com/{}", query.len()), "content")]
        }
    }

    /// Never proposes follow-up queries
    struct NoFollowUps;

    #[async_trait]
    impl CompletionService for NoFollowUps {
        async fn complete_structured(
            &self,
            _request: &CompletionRequest,
            schema: &OutputSchema,
        ) -> Result<Value, CompletionError> {
            if schema.name == "analysis" {
                Ok(json!({"report_data": {}, "missing_queries": []}))
            } else {
                Ok(json!({"Country": "UK"}))
            }
        }

        async fn complete_text(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            Ok("report".to_string())
        }
    }

    fn runner(dir: &TempDir) -> BatchRunner {
        let orchestrator = ResearchOrchestrator::new(
            Arc::new(OneHitSearch),
            Arc::new(NoFollowUps),
        );
        let sink = PersistenceSink::new(PersistencePaths::for_level(dir.path(), "master"));
        BatchRunner::new(Arc::new(orchestrator), sink)
    }

    #[test]
    fn test_distinct_targets() {
        let targets = vec![
            "A".to_string(),
            " ".to_string(),
            "B".to_string(),
            " A ".to_string(),
        ];
        assert_eq!(distinct_targets(&targets), vec!["A", "B"]);
    }

    #[test]
    fn test_summary_totals() {
        let summary = RunSummary {
            batches: vec![
                BatchReport {
                    index: 0,
                    succeeded: vec!["a".to_string(), "b".to_string()],
                    failed: vec![],
                    persistence_error: None,
                },
                BatchReport {
                    index: 1,
                    succeeded: vec![],
                    failed: vec![TargetFailure {
                        target_id: "c".to_string(),
                        error: "boom".to_string(),
                    }],
                    persistence_error: None,
                },
            ],
        };
        assert_eq!(summary.total_succeeded(), 2);
        assert_eq!(summary.total_failed(), 1);
        assert_eq!(summary.failures().next().unwrap().target_id, "c");
    }

    #[tokio::test]
    async fn test_run_all_partitions_into_batches() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let targets: Vec<String> = ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect();

        let summary = runner.run_all(&targets, 2).await;

        assert_eq!(summary.batches.len(), 3);
        assert_eq!(summary.batches[0].succeeded, vec!["A", "B"]);
        assert_eq!(summary.batches[2].succeeded, vec!["E"]);
        assert_eq!(summary.total_succeeded(), 5);
        assert_eq!(summary.total_failed(), 0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_treated_as_one() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let targets = vec!["A".to_string(), "B".to_string()];

        let summary = runner.run_all(&targets, 0).await;

        assert_eq!(summary.batches.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_target_list() {
        let dir = TempDir::new().unwrap();
        let summary = runner(&dir).run_all(&[], 3).await;
        assert!(summary.batches.is_empty());
    }
}
