//! Batch output stores
//!
//! Four artifacts per scholarship level:
//!
//! ```text
//! {output_dir}/
//! ├── rag_database_{level}.jsonl                 append-only evidence log
//! ├── scholarship_reports_{level}.json           target -> draft record
//! ├── text_reports_{level}.json                  target -> final text
//! └── structured_english_reports_{level}.json    [record, ...] keyed by Scholarship_Name
//! ```
//!
//! Keyed stores are whole-file read-merge-write, once per batch, through a
//! temporary file + rename. They assume a single writer process.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::research::{Evidence, ResearchState, IDENTIFIER_FIELD, SYNTHESIS_FAILED_MARKER};

/// Output file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistencePaths {
    pub evidence_log: PathBuf,
    pub draft_store: PathBuf,
    pub text_store: PathBuf,
    pub structured_store: PathBuf,
}

impl PersistencePaths {
    /// Standard file names for a scholarship level under `output_dir`
    pub fn for_level(output_dir: impl AsRef<Path>, level: &str) -> Self {
        let dir = output_dir.as_ref();
        Self {
            evidence_log: dir.join(format!("rag_database_{}.jsonl", level)),
            draft_store: dir.join(format!("scholarship_reports_{}.json", level)),
            text_store: dir.join(format!("text_reports_{}.json", level)),
            structured_store: dir.join(format!("structured_english_reports_{}.json", level)),
        }
    }
}

/// The parts of a finished research run that get persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target_id: String,
    pub evidence: Vec<Evidence>,
    pub draft_record: Value,
    pub final_text: String,
    pub structured_output: Map<String, Value>,
}

impl From<ResearchState> for TargetRecord {
    fn from(state: ResearchState) -> Self {
        Self {
            target_id: state.target_id,
            evidence: state.evidence,
            draft_record: state.draft_record,
            final_text: state.final_text.unwrap_or_default(),
            structured_output: state.structured_output.unwrap_or_default(),
        }
    }
}

impl TargetRecord {
    /// Draft worth keeping: not null and not an empty object
    pub fn has_draft(&self) -> bool {
        match &self.draft_record {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }

    /// Report worth keeping: non-blank and not a synthesis failure
    pub fn has_report(&self) -> bool {
        let text = self.final_text.trim();
        !text.is_empty() && !text.starts_with(SYNTHESIS_FAILED_MARKER)
    }
}

/// One line of the evidence log
#[derive(Debug, Serialize)]
struct EvidenceLine<'a> {
    target_id: &'a str,
    url: &'a str,
    content: &'a str,
}

/// Writes a batch of records to the output stores
#[derive(Debug, Clone)]
pub struct PersistenceSink {
    paths: PersistencePaths,
}

impl PersistenceSink {
    pub fn new(paths: PersistencePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &PersistencePaths {
        &self.paths
    }

    /// One append to the evidence log and one rewrite of each keyed store
    pub async fn persist_batch(&self, records: &[TargetRecord]) -> Result<(), PersistenceError> {
        if records.is_empty() {
            return Ok(());
        }

        let lines = self.append_evidence(records).await?;
        // Placeholders from failed stages never replace an earlier entry
        self.merge_keyed(&self.paths.draft_store, records, |r| {
            r.has_draft().then(|| r.draft_record.clone())
        })
        .await?;
        self.merge_keyed(&self.paths.text_store, records, |r| {
            r.has_report().then(|| Value::String(r.final_text.clone()))
        })
        .await?;
        let structured = self.merge_structured(records).await?;

        info!(
            targets = records.len(),
            evidence_lines = lines,
            structured,
            "Batch persisted"
        );
        Ok(())
    }

    async fn append_evidence(&self, records: &[TargetRecord]) -> Result<usize, PersistenceError> {
        let path = &self.paths.evidence_log;

        let mut buffer = String::new();
        let mut lines = 0;
        for record in records {
            for evidence in &record.evidence {
                let line = EvidenceLine {
                    target_id: &record.target_id,
                    url: &evidence.source_url,
                    content: &evidence.content,
                };
                buffer.push_str(&serde_json::to_string(&line)?);
                buffer.push('\n');
                lines += 1;
            }
        }
        if lines == 0 {
            return Ok(0);
        }

        ensure_parent(path).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| PersistenceError::io(path, e))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| PersistenceError::io(path, e))?;
        file.flush().await.map_err(|e| PersistenceError::io(path, e))?;

        Ok(lines)
    }

    async fn merge_keyed<F>(
        &self,
        path: &Path,
        records: &[TargetRecord],
        value: F,
    ) -> Result<(), PersistenceError>
    where
        F: Fn(&TargetRecord) -> Option<Value>,
    {
        let mut store = match read_json(path).await? {
            Some(Value::Object(map)) => map,
            Some(_) => {
                warn!(path = %path.display(), "Keyed store is not a JSON object, starting fresh");
                Map::new()
            }
            None => Map::new(),
        };

        for record in records {
            match value(record) {
                Some(value) => {
                    store.insert(record.target_id.clone(), value);
                }
                None => debug!(target = %record.target_id, path = %path.display(), "Nothing to store"),
            }
        }

        write_atomic(path, &Value::Object(store)).await
    }

    async fn merge_structured(&self, records: &[TargetRecord]) -> Result<usize, PersistenceError> {
        let path = &self.paths.structured_store;
        let mut list = match read_json(path).await? {
            Some(Value::Array(list)) => list,
            Some(_) => {
                warn!(path = %path.display(), "Structured store is not a JSON list, starting fresh");
                Vec::new()
            }
            None => Vec::new(),
        };

        let mut written = 0;
        for record in records.iter().filter(|r| !r.structured_output.is_empty()) {
            let entry = Value::Object(record.structured_output.clone());
            let existing = list
                .iter()
                .position(|item| {
                    item.get(IDENTIFIER_FIELD).and_then(Value::as_str) == Some(record.target_id.as_str())
                });

            match existing {
                Some(index) => list[index] = entry,
                None => list.push(entry),
            }
            written += 1;
        }

        write_atomic(path, &Value::Array(list)).await?;
        Ok(written)
    }
}

async fn ensure_parent(path: &Path) -> Result<(), PersistenceError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| PersistenceError::io(parent, e)),
        _ => Ok(()),
    }
}

/// Existing store contents; `None` when missing or unparsable
async fn read_json(path: &Path) -> Result<Option<Value>, PersistenceError> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };

    match serde_json::from_slice(&data) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Store is not valid JSON, starting fresh");
            Ok(None)
        }
    }
}

/// Temp file + rename
async fn write_atomic(path: &Path, value: &Value) -> Result<(), PersistenceError> {
    ensure_parent(path).await?;
    let json = serde_json::to_vec_pretty(value)?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| PersistenceError::io(&temp_path, e))?;
    file.write_all(&json)
        .await
        .map_err(|e| PersistenceError::io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| PersistenceError::io(&temp_path, e))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| PersistenceError::io(path, e))
}
