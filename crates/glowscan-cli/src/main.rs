//! glowscan - command-line client for the glowscan skincare service.
//!
//! Sign in with email/password and an OTP, browse product and content
//! recommendations, submit face scans and chat with the assistant.

mod commands;
mod context;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use glowscan_core::{ApiError, Config, ContentKind};
use tracing::{debug, info, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use context::Context;

const LOG_FILE: &str = "glowscan.log";

#[derive(Parser, Debug)]
#[command(name = "glowscan", version, about = "Skin scans and skincare recommendations")]
struct Cli {
    /// Also write logs to glowscan.log in the data directory.
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Defaults to the last email used.
    #[arg(long)]
    email: Option<String>,

    /// Prompted for when not given.
    #[arg(long, env = "GLOWSCAN_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register(LoginArgs),
    /// Sign in; an OTP is sent by email
    Login(LoginArgs),
    /// Submit the OTP from the verification email
    VerifyOtp { code: String },
    /// Ask for a new OTP using the cached login
    ResendOtp,
    /// Exchange the stored token for a fresh one
    Refresh,
    /// Show session state
    Status,
    /// Forget all credentials and the cached login
    Logout,
    /// List recommendations
    Feed {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        size: Option<u32>,
        /// product, news or video
        #[arg(long)]
        kind: Option<ContentKind>,
        #[arg(long)]
        skin_type: Option<String>,
        /// Walk every page until the end of the feed
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Analyze three face photos
    Analyze {
        #[arg(long)]
        front: PathBuf,
        #[arg(long)]
        left: PathBuf,
        #[arg(long)]
        right: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Send a message to the skincare assistant
    Chat { message: Vec<String> },
    /// Keep the session fresh by refreshing the token in the background
    RefreshDaemon {
        /// Seconds to wait before each refresh
        #[arg(long, default_value_t = 45 * 60)]
        delay_secs: u64,
    },
}

/// Plain-text log layer writing to `LOG_FILE` in `dir`. Lines are flushed
/// when the returned guard drops.
fn file_layer<S>(dir: &Path) -> (impl Layer<S>, WorkerGuard)
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    (fmt::layer().with_ansi(false).with_writer(writer), guard)
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG controls the level (e.g. RUST_LOG=glowscan_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file, guard) = match log_dir.map(file_layer::<Registry>) {
        Some((layer, guard)) => (Some(layer), Some(guard)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file)
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;

    let log_dir = if cli.log_file {
        let dir = config.data_dir()?;
        std::fs::create_dir_all(&dir)?;
        Some(dir)
    } else {
        None
    };
    // Held until main returns so buffered file lines are written.
    let _guard = init_tracing(log_dir.as_deref());
    info!("glowscan starting");

    let ctx = Context::build(config)?;
    match commands::run(&ctx, cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => match e.downcast_ref::<ApiError>() {
            Some(api_err) if ctx.gateway.handle_failure(api_err) => {
                debug!("Session cleared after auth failure");
                eprintln!("Error: {}", api_err);
                eprintln!("Run `glowscan login` to sign in again.");
                Ok(ExitCode::FAILURE)
            }
            _ => Err(e),
        },
    }
}
