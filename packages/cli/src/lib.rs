// ABOUTME: Docforge CLI library - wiring and terminal rendering shared by the docforge binary
// ABOUTME: Builds pipeline managers from configuration and parses answer files for unattended runs

pub mod answers;
pub mod context;
pub mod error;
pub mod render;

pub use context::AppContext;
pub use error::{CliError, CliResult};

use tracing_subscriber::EnvFilter;

/// Load `.env` and install the tracing subscriber. Logs go to stderr so
/// markdown written to stdout stays pipeable.
pub fn init() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
