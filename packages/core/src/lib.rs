// ABOUTME: Core types, traits, and utilities for Docforge
// ABOUTME: Foundational package providing shared functionality across all Docforge packages

pub mod constants;
pub mod types;
pub mod utils;

// Re-export main types
pub use types::{ParsePriorityError, Priority};

// Re-export constants
pub use constants::{database_file, docforge_dir};

// Re-export utilities
pub use utils::{generate_id, truncate};
