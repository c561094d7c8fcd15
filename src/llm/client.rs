//! Completion client
//!
//! [`CompletionBackend`] is the raw provider call with an explicit
//! credential. [`CompletionClient`] layers credential rotation and output
//! parsing on top and exposes the two shapes the research stages need
//! through [`CompletionService`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::schema::OutputSchema;
use crate::credentials::{Credential, RotatingCredentials};
use crate::error::CompletionError;
use crate::retry::{RotationError, RotationPolicy};

/// One completion call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    /// System preamble
    pub system: Option<String>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Raw provider call with a caller-chosen credential
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        credential: &Credential,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Completion calls as seen by the research stages
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Reply parsed as a JSON object and validated against `schema`
    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> Result<Value, CompletionError>;

    /// Free-text reply
    async fn complete_text(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// [`CompletionService`] over a backend and a rotating credential pool
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    credentials: Arc<RotatingCredentials>,
    policy: RotationPolicy,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, credentials: Arc<RotatingCredentials>) -> Self {
        Self {
            backend,
            credentials,
            policy: RotationPolicy::default(),
        }
    }

    pub fn with_rotation_policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn call(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        debug!(backend = self.backend.name(), prompt_chars = request.prompt.len(), "Completion call");

        self.policy
            .run(
                &self.credentials,
                self.backend.name(),
                CompletionError::is_rotatable,
                |credential| async move { self.backend.complete(&credential, request).await },
            )
            .await
            .map_err(|e| match e {
                RotationError::Fatal(e) => e,
                RotationError::Exhausted { attempts, last } => CompletionError::CredentialsExhausted {
                    attempts,
                    last: last.to_string(),
                },
            })
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> Result<Value, CompletionError> {
        let mut constrained = request.clone();
        constrained.prompt.push_str(&schema.instructions());

        let raw = self.call(&constrained).await?;
        schema.parse(&raw)
    }

    async fn complete_text(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.call(request).await
    }
}
