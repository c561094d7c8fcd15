//! # Configuration Module
//!
//! Loads the harvester's settings from environment variables (and a `.env`
//! file when present). Every value has a default taken from the production
//! run, so an empty environment yields a usable configuration.

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::llm::LlmProvider;
use crate::persistence::PersistencePaths;
use crate::research::ResearchBudget;
use crate::retry::RotationPolicy;
use crate::search::DEFAULT_TAVILY_BASE_URL;

// =============================================================================
// SCHOLARSHIP LEVEL
// =============================================================================
/// Degree level a run collects scholarships for.
///
/// The level selects both the input CSV and the names of the output stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScholarshipLevel {
    #[default]
    Master,
    Bachelor,
    Phd,
}

impl ScholarshipLevel {
    /// Lowercase name used in output file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Bachelor => "bachelor",
            Self::Phd => "phd",
        }
    }

    /// Input CSV file name, e.g. `Master_raw.csv`
    pub fn input_file_name(&self) -> &'static str {
        match self {
            Self::Master => "Master_raw.csv",
            Self::Bachelor => "Bachelor_raw.csv",
            Self::Phd => "Phd_raw.csv",
        }
    }
}

impl fmt::Display for ScholarshipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScholarshipLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" | "masters" => Ok(Self::Master),
            "bachelor" | "bachelors" => Ok(Self::Bachelor),
            "phd" => Ok(Self::Phd),
            other => anyhow::bail!("Unknown scholarship level '{}' (expected master, bachelor or phd)", other),
        }
    }
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for a harvesting run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub level: ScholarshipLevel,

    /// Directory holding the four output stores
    pub output_dir: PathBuf,

    /// Directory holding the `{Level}_raw.csv` inputs
    pub input_dir: PathBuf,

    /// Per-target loop and call limits
    pub budget: ResearchBudget,

    /// Targets researched concurrently (one batch)
    pub parallel_workers: usize,

    pub llm_provider: LlmProvider,

    /// Overrides the provider's default model
    pub llm_model: Option<String>,

    /// 0.0 keeps extraction deterministic
    pub llm_temperature: f64,

    pub tavily_base_url: String,

    /// Base delay between rotated retries
    pub rotation_backoff: Duration,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            level: ScholarshipLevel::default(),
            output_dir: PathBuf::from("output"),
            input_dir: PathBuf::from("data/final_input"),
            budget: ResearchBudget::default(),
            parallel_workers: 5,
            llm_provider: LlmProvider::default(),
            llm_model: None,
            llm_temperature: 0.0,
            tavily_base_url: DEFAULT_TAVILY_BASE_URL.to_string(),
            rotation_backoff: Duration::from_millis(500),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl HarvestConfig {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if it exists.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset variables keep their defaults; set but unparsable ones fail.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("SCHOLARSHIP_LEVEL") {
            config.level = val.parse::<ScholarshipLevel>()?;
        }

        if let Some(val) = lookup("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("INPUT_DIR") {
            config.input_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("MAX_RESEARCH_LOOPS") {
            config.budget.max_iterations = parse_number("MAX_RESEARCH_LOOPS", &val)?;
        }

        if let Some(val) = lookup("MAX_API_CALLS_PER_SCHOLARSHIP") {
            config.budget.max_api_calls = parse_number("MAX_API_CALLS_PER_SCHOLARSHIP", &val)?;
        }

        if let Some(val) = lookup("DRILL_DOWN_QUERY_COUNT") {
            config.budget.drill_down_width = parse_number("DRILL_DOWN_QUERY_COUNT", &val)?;
        }

        if let Some(val) = lookup("TAVILY_MAX_RESULTS_INITIAL") {
            config.budget.initial_max_results = parse_number("TAVILY_MAX_RESULTS_INITIAL", &val)?;
        }

        if let Some(val) = lookup("TAVILY_MAX_RESULTS_DRILLDOWN") {
            config.budget.drill_down_max_results = parse_number("TAVILY_MAX_RESULTS_DRILLDOWN", &val)?;
        }

        if let Some(val) = lookup("PARALLEL_WORKERS") {
            config.parallel_workers = parse_number("PARALLEL_WORKERS", &val)?;
        }

        if let Some(val) = lookup("LLM_PROVIDER") {
            config.llm_provider = val.parse::<LlmProvider>().map_err(anyhow::Error::msg)?;
        }

        if let Some(val) = lookup("LLM_MODEL") {
            config.llm_model = Some(val);
        }

        if let Some(val) = lookup("LLM_TEMPERATURE") {
            config.llm_temperature = val
                .trim()
                .parse()
                .context("LLM_TEMPERATURE must be a valid floating-point number (e.g., 0.0)")?;
        }

        if let Some(val) = lookup("TAVILY_BASE_URL") {
            config.tavily_base_url = val;
        }

        if let Some(val) = lookup("ROTATION_BACKOFF_MS") {
            config.rotation_backoff = Duration::from_millis(parse_number("ROTATION_BACKOFF_MS", &val)?);
        }

        Ok(config)
    }

    /// Validate the configuration before any work starts.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm_temperature) {
            anyhow::bail!(
                "LLM_TEMPERATURE must be between 0.0 and 2.0, got: {}",
                self.llm_temperature
            );
        }

        let limits = [
            ("MAX_RESEARCH_LOOPS", self.budget.max_iterations),
            ("MAX_API_CALLS_PER_SCHOLARSHIP", self.budget.max_api_calls),
            ("DRILL_DOWN_QUERY_COUNT", self.budget.drill_down_width),
            ("TAVILY_MAX_RESULTS_INITIAL", self.budget.initial_max_results),
            ("TAVILY_MAX_RESULTS_DRILLDOWN", self.budget.drill_down_max_results),
            ("PARALLEL_WORKERS", self.parallel_workers),
        ];
        for (name, value) in limits {
            if value == 0 {
                anyhow::bail!("{} must be at least 1", name);
            }
        }

        if self.llm_model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            anyhow::bail!("LLM_MODEL cannot be empty");
        }

        if self.tavily_base_url.trim().is_empty() {
            anyhow::bail!("TAVILY_BASE_URL cannot be empty");
        }

        Ok(())
    }

    /// Model name, falling back to the provider default
    pub fn model(&self) -> &str {
        self.llm_model
            .as_deref()
            .unwrap_or_else(|| self.llm_provider.default_model())
    }

    /// CSV of targets for the configured level
    pub fn input_path(&self) -> PathBuf {
        self.input_dir.join(self.level.input_file_name())
    }

    pub fn persistence_paths(&self) -> PersistencePaths {
        PersistencePaths::for_level(&self.output_dir, self.level.as_str())
    }

    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy::new().with_backoff_base(self.rotation_backoff)
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a valid non-negative integer, got '{}'", name, value))
}
