pub mod api;
pub mod clients;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod jobs;
pub mod queue;
pub mod scheduler;
pub mod store;

pub use error::{JobflowError, ValidationErrors};

/// Installs the `tracing` subscriber used by the binaries. `RUST_LOG` wins
/// over the default filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,jobflow=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
