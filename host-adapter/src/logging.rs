//! Logging initialization: logs go only to file (or are dropped), never to
//! stdout — stdout is the JSON-RPC wire to the host and must stay clean.
//!
//! Reads `RUST_LOG` (level filter) and `CTXPRUNE_LOG_FILE` (path) from env.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub fn init(log_file: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let path = log_file
        .map(|p| p.to_path_buf())
        .or_else(|| std::env::var("CTXPRUNE_LOG_FILE").ok().map(std::path::PathBuf::from));

    if let Some(path) = path {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_filter(filter);
        tracing_subscriber::registry().with(file_layer).init();
        tracing::info!(path = %path.display(), "ctxprune-host-adapter logging to file");
    } else {
        let sink_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::sink)
            .with_filter(filter);
        tracing_subscriber::registry().with(sink_layer).init();
    }
    Ok(())
}
