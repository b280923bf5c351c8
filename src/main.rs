//! jsonrpc-router: serve JSON-RPC 2.0 over stdio
//!
//! Reads newline-delimited requests from stdin and writes responses to
//! stdout. Only the built-in diagnostic methods `ping` and `echo` are
//! registered; embed the library to route real methods.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use jsonrpc_router::config;
use jsonrpc_router::rpc::{to_result, RouterBuilder, StdioServer};

/// JSON-RPC 2.0 router over stdio.
///
/// Validates request envelopes, dispatches batches concurrently, and answers
/// with JSON-RPC 2.0 compliant responses on stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "jsonrpc-router")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Adds the diagnostic methods served by the binary.
fn register_builtins(builder: RouterBuilder) -> RouterBuilder {
    builder
        .register("ping", |_, _, _, _| to_result("pong"))
        .register("echo", |_, _, _, params| match params {
            Some(raw) => Ok(raw.to_owned()),
            None => to_result(&()),
        })
}

/// Entry point for the jsonrpc-router server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if let Some(default_path) = config::default_config_path() {
                eprintln!("\nDefault config location: {}", default_path.display());
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        suppress_notifications = cfg.router.suppress_notifications,
        max_batch_size = ?cfg.router.max_batch_size,
        "Starting jsonrpc-router"
    );

    let router = register_builtins(RouterBuilder::new())
        .suppress_notifications(cfg.router.suppress_notifications)
        .max_batch_size(cfg.router.max_batch_size)
        .build();

    let mut server = StdioServer::stdio(router);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server.run()) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
