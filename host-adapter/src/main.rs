//! `ctxprune-host-adapter` binary: reads hook invocations and model tool
//! calls as JSON lines on stdin, drives the `ctxprune` engine, and writes
//! `messages`/`prompt` requests plus acks back on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ctxprune::EngineConfig;

use ctxprune_host_adapter::{logging, run, stdio_host::StdioHost};

#[derive(Parser, Debug)]
#[command(name = "ctxprune-host-adapter")]
#[command(about = "Stdio adapter driving the ctxprune context-pruning engine")]
struct Args {
    /// Directory session state is persisted under (`<dir>/acp/<sessionId>.json`).
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// App name used for XDG config discovery (`<XDG_CONFIG_HOME>/<name>/ctxprune.toml`).
    #[arg(long, default_value = "ctxprune")]
    app_name: String,

    /// Write logs to this file instead of `CTXPRUNE_LOG_FILE`/dropping them.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn default_state_dir() -> PathBuf {
    cross_xdg::BaseDirs::new()
        .map(|dirs| dirs.data_home().join("ctxprune"))
        .unwrap_or_else(|_| PathBuf::from(".ctxprune"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_config::load_and_apply(&args.app_name, None::<&std::path::Path>).ok();
    logging::init(args.log_file.as_deref())?;

    let config = match ctxprune::config::load(&args.app_name, None) {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::error!(error = %err, "failed to load ctxprune config, falling back to defaults");
            EngineConfig::default()
        }
    };

    let state_dir = args.state_dir.unwrap_or_else(default_state_dir);
    tracing::info!(state_dir = %state_dir.display(), "ctxprune-host-adapter starting");

    let store = Arc::new(ctxprune::SessionStore::new(state_dir));
    let config = Arc::new(config);

    let (host, rx) = StdioHost::spawn(tokio::io::stdin(), tokio::io::stdout());
    let host = Arc::new(host);

    run(host, rx, store, config).await;

    Ok(())
}
