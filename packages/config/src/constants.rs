// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Docforge

// Language Model Configuration
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL: &str = "ANTHROPIC_MODEL"; // Legacy
pub const DOCFORGE_MODEL: &str = "DOCFORGE_MODEL";
pub const DOCFORGE_MODEL_TIMEOUT_SECS: &str = "DOCFORGE_MODEL_TIMEOUT_SECS";

// Interview Configuration
pub const DOCFORGE_MAX_QUESTIONS: &str = "DOCFORGE_MAX_QUESTIONS";
pub const DOCFORGE_INCLUDE_OPTIONAL_QUESTIONS: &str = "DOCFORGE_INCLUDE_OPTIONAL_QUESTIONS";
pub const DOCFORGE_QUESTION_CACHE_MAX_AGE_HOURS: &str = "DOCFORGE_QUESTION_CACHE_MAX_AGE_HOURS";

// Extraction Configuration
pub const DOCFORGE_MIN_CONFIDENCE: &str = "DOCFORGE_MIN_CONFIDENCE";

// Storage Configuration
pub const DOCFORGE_DATA_DIR: &str = "DOCFORGE_DATA_DIR";
pub const DOCFORGE_DATABASE_URL: &str = "DOCFORGE_DATABASE_URL";

// Prompt Overrides
pub const DOCFORGE_PROMPTS_DIR: &str = "DOCFORGE_PROMPTS_DIR";
