use std::env;
use std::path::PathBuf;

/// Get the path to the Docforge directory (~/.docforge)
pub fn docforge_dir() -> PathBuf {
    // First try HOME environment variable (useful for tests)
    if let Ok(home) = env::var("HOME") {
        PathBuf::from(home).join(".docforge")
    } else {
        // Fall back to dirs crate for normal usage
        dirs::home_dir()
            .unwrap_or_else(env::temp_dir)
            .join(".docforge")
    }
}

/// Get the path to the default SQLite database (~/.docforge/docforge.db)
pub fn database_file() -> PathBuf {
    docforge_dir().join("docforge.db")
}
