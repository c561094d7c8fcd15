//! Scripted fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use scholarship_research_agent::{
    CompletionError, CompletionRequest, CompletionService, OutputSchema, SearchClient, SearchHit,
};

/// Search fake answering from a query -> hits table
#[derive(Default)]
pub struct ScriptedSearch {
    responses: HashMap<String, Vec<SearchHit>>,
    default_hits: Vec<SearchHit>,
    panic_on: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.responses.insert(query.to_string(), hits);
        self
    }

    /// Hits for any query without a scripted response
    pub fn otherwise(mut self, hits: Vec<SearchHit>) -> Self {
        self.default_hits = hits;
        self
    }

    /// Panic inside the search call when the query contains `needle`
    pub fn panic_on(mut self, needle: &str) -> Self {
        self.panic_on = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, query: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|q| *q == query).count()
    }
}

#[async_trait]
impl SearchClient for ScriptedSearch {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        if let Some(needle) = &self.panic_on {
            if query.contains(needle.as_str()) {
                panic!("search backend crashed on {}", query);
            }
        }

        self.calls.lock().unwrap().push(query.to_string());
        let hits = self.responses.get(query).unwrap_or(&self.default_hits);
        hits.iter().take(max_results).cloned().collect()
    }
}

type PlanFn = Box<dyn Fn(usize) -> Result<Value, CompletionError> + Send + Sync>;

/// Completion fake: analysis replies come from `plan`, indexed by call number
pub struct ScriptedCompletion {
    plan: PlanFn,
    structured: Value,
    fail_synthesis: bool,
    fail_structuring: bool,
    pub analysis_prompts: Mutex<Vec<String>>,
    pub text_calls: Mutex<usize>,
    pub structuring_calls: Mutex<usize>,
}

impl ScriptedCompletion {
    pub fn new<F>(plan: F) -> Self
    where
        F: Fn(usize) -> Result<Value, CompletionError> + Send + Sync + 'static,
    {
        Self {
            plan: Box::new(plan),
            structured: json!({"Scholarship_Name": "model guess", "Country": "UK"}),
            fail_synthesis: false,
            fail_structuring: false,
            analysis_prompts: Mutex::new(Vec::new()),
            text_calls: Mutex::new(0),
            structuring_calls: Mutex::new(0),
        }
    }

    /// Analysis replies proposing `rounds[n]` on call n, then nothing
    pub fn with_rounds(rounds: Vec<Vec<&'static str>>) -> Self {
        Self::new(move |call| Ok(plan(rounds.get(call).cloned().unwrap_or_default())))
    }

    /// Never proposes follow-up queries
    pub fn no_follow_ups() -> Self {
        Self::with_rounds(Vec::new())
    }

    pub fn with_structured(mut self, record: Value) -> Self {
        self.structured = record;
        self
    }

    pub fn failing_synthesis(mut self) -> Self {
        self.fail_synthesis = true;
        self
    }

    pub fn failing_structuring(mut self) -> Self {
        self.fail_structuring = true;
        self
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> Result<Value, CompletionError> {
        if schema.name == "analysis" {
            let call = {
                let mut prompts = self.analysis_prompts.lock().unwrap();
                prompts.push(request.prompt.clone());
                prompts.len() - 1
            };
            return (self.plan)(call);
        }

        *self.structuring_calls.lock().unwrap() += 1;
        if self.fail_structuring {
            Err(CompletionError::InvalidOutput("not json".to_string()))
        } else {
            Ok(self.structured.clone())
        }
    }

    async fn complete_text(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
        *self.text_calls.lock().unwrap() += 1;
        if self.fail_synthesis {
            Err(CompletionError::CredentialsExhausted {
                attempts: 2,
                last: "quota".to_string(),
            })
        } else {
            Ok("## Basic Information\nA scholarship.".to_string())
        }
    }
}

/// Analysis reply proposing `queries`
pub fn plan(queries: Vec<&str>) -> Value {
    json!({
        "report_data": {"basic_info": {"official_name": null}},
        "missing_queries": queries,
    })
}

/// `n` hits under `https://{host}/{i}`
pub fn hits(host: &str, n: usize) -> Vec<SearchHit> {
    (0..n)
        .map(|i| SearchHit::new(format!("https://{}/{}", host, i), format!("{} page {}", host, i)))
        .collect()
}
