// ABOUTME: Pipeline configuration loaded from environment variables
// ABOUTME: Validates model, interview, extraction and storage settings with documented defaults

pub mod constants;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_QUESTIONS: usize = 15;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_QUESTION_CACHE_MAX_AGE_HOURS: u64 = 24;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("{var} is out of range: {reason}")]
    OutOfRange { var: &'static str, reason: String },
}

/// Runtime configuration for the document pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub model_timeout: Duration,
    pub max_questions: usize,
    pub include_optional_questions: bool,
    pub min_confidence: f64,
    pub question_cache_max_age: Duration,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
            max_questions: DEFAULT_MAX_QUESTIONS,
            include_optional_questions: false,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            question_cache_max_age: Duration::from_secs(DEFAULT_QUESTION_CACHE_MAX_AGE_HOURS * 3600),
            data_dir: docforge_core::docforge_dir(),
            database_url: None,
            prompts_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup(constants::DOCFORGE_MODEL).or_else(|| lookup(constants::ANTHROPIC_MODEL)) {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }

        config.api_key = lookup(constants::ANTHROPIC_API_KEY).filter(|k| !k.trim().is_empty());

        if let Some(raw) = lookup(constants::DOCFORGE_MODEL_TIMEOUT_SECS) {
            let secs = parse_value::<u64>(constants::DOCFORGE_MODEL_TIMEOUT_SECS, &raw)?;
            if secs == 0 {
                return Err(ConfigError::OutOfRange {
                    var: constants::DOCFORGE_MODEL_TIMEOUT_SECS,
                    reason: "timeout must be at least 1 second".to_string(),
                });
            }
            config.model_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(constants::DOCFORGE_MAX_QUESTIONS) {
            let max = parse_value::<usize>(constants::DOCFORGE_MAX_QUESTIONS, &raw)?;
            if max == 0 {
                return Err(ConfigError::OutOfRange {
                    var: constants::DOCFORGE_MAX_QUESTIONS,
                    reason: "at least one question must be allowed".to_string(),
                });
            }
            config.max_questions = max;
        }

        if let Some(raw) = lookup(constants::DOCFORGE_INCLUDE_OPTIONAL_QUESTIONS) {
            config.include_optional_questions =
                parse_value::<bool>(constants::DOCFORGE_INCLUDE_OPTIONAL_QUESTIONS, &raw)?;
        }

        if let Some(raw) = lookup(constants::DOCFORGE_MIN_CONFIDENCE) {
            let min = parse_value::<f64>(constants::DOCFORGE_MIN_CONFIDENCE, &raw)?;
            if !(0.0..=1.0).contains(&min) {
                return Err(ConfigError::OutOfRange {
                    var: constants::DOCFORGE_MIN_CONFIDENCE,
                    reason: format!("{} is not within [0, 1]", min),
                });
            }
            config.min_confidence = min;
        }

        if let Some(raw) = lookup(constants::DOCFORGE_QUESTION_CACHE_MAX_AGE_HOURS) {
            let hours = parse_value::<u64>(constants::DOCFORGE_QUESTION_CACHE_MAX_AGE_HOURS, &raw)?;
            config.question_cache_max_age = Duration::from_secs(hours * 3600);
        }

        if let Some(dir) = lookup(constants::DOCFORGE_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        config.database_url = lookup(constants::DOCFORGE_DATABASE_URL).filter(|u| !u.trim().is_empty());
        config.prompts_dir = lookup(constants::DOCFORGE_PROMPTS_DIR)
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        if config.model != DEFAULT_MODEL {
            info!("Using custom model: {}", config.model);
        }

        Ok(config)
    }

    /// SQLite URL for the record store, defaulting to a file in the data directory
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!("sqlite://{}?mode=rwc", self.data_dir.join("docforge.db").display())
        })
    }
}

fn parse_value<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
    })
}
