//! Completion backend via Rig
//!
//! A fresh provider client is built per call from the credential the
//! rotation policy hands out. Quota exhaustion is recognised from the
//! provider's error text, since Rig flattens HTTP failures into strings.

use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::{anthropic, gemini, openai};
use std::fmt;
use std::str::FromStr;

use super::client::{CompletionBackend, CompletionRequest};
use crate::credentials::Credential;
use crate::error::CompletionError;

/// Anthropic requires max_tokens on every request
const ANTHROPIC_MAX_TOKENS: u64 = 8192;

/// Supported completion providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    Gemini,
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-2.5-flash",
            LlmProvider::OpenAI => "gpt-4o-mini",
            LlmProvider::Anthropic => "claude-3-5-sonnet-latest",
        }
    }

    /// Environment prefix of the provider's key pool
    pub fn key_prefix(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "GOOGLE_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmProvider::Gemini => "gemini",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Anthropic => "anthropic",
        };
        f.write_str(name)
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "openai" => Ok(LlmProvider::OpenAI),
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            other => Err(format!("unknown LLM provider: {}", other)),
        }
    }
}

/// Map a provider error message onto the completion error taxonomy
pub fn classify_provider_error(message: String) -> CompletionError {
    let lower = message.to_ascii_lowercase();
    let quota = lower.contains("429")
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("resource_exhausted")
        || lower.contains("too many requests");

    if quota {
        CompletionError::QuotaExceeded(message)
    } else {
        CompletionError::Provider(message)
    }
}

/// Builds an agent on `$client`, applies the request, and prompts it
macro_rules! prompt_agent {
    ($client:expr, $model:expr, $temperature:expr, $request:expr $(, $extra:ident($arg:expr))*) => {{
        let mut agent_builder = $client.agent($model).temperature($temperature);
        if let Some(preamble) = $request.system.as_deref() {
            agent_builder = agent_builder.preamble(preamble);
        }
        $(agent_builder = agent_builder.$extra($arg);)*
        let agent = agent_builder.build();
        agent.prompt($request.prompt.as_str()).await
    }};
}

/// [`CompletionBackend`] over Rig's provider clients
#[derive(Debug, Clone)]
pub struct RigCompletionBackend {
    provider: LlmProvider,
    model: String,
    temperature: f64,
}

impl RigCompletionBackend {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Provider with its default model
    pub fn for_provider(provider: LlmProvider) -> Self {
        Self::new(provider, provider.default_model())
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionBackend for RigCompletionBackend {
    async fn complete(
        &self,
        credential: &Credential,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        let temperature = self.temperature;
        let api_key = credential.secret.clone();

        let response = match self.provider {
            LlmProvider::Gemini => {
                let client = gemini::Client::from_val(api_key.into());
                prompt_agent!(client, &self.model, temperature, request)
            }
            LlmProvider::OpenAI => {
                let client = openai::Client::from_val(api_key.into());
                prompt_agent!(client, &self.model, temperature, request)
            }
            LlmProvider::Anthropic => {
                let client = anthropic::Client::from_val(api_key.into());
                prompt_agent!(client, &self.model, temperature, request, max_tokens(ANTHROPIC_MAX_TOKENS))
            }
        };

        response.map_err(|e| classify_provider_error(format!("{} completion failed: {}", self.provider, e)))
    }

    fn name(&self) -> &str {
        match self.provider {
            LlmProvider::Gemini => "gemini",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Anthropic => "anthropic",
        }
    }
}
