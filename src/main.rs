//! erddap-mcp: MCP server for discovering and previewing ERDDAP scientific data
//!
//! Speaks MCP over stdio; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use erddap_mcp::config::{self, Config};
use erddap_mcp::erddap::{ErddapClient, ServerRegistry};
use erddap_mcp::mcp::{McpServer, ToolContext, ToolRegistry};

/// MCP server for ERDDAP scientific data catalogs.
///
/// Lets AI assistants list ERDDAP servers, search their datasets, inspect
/// metadata and preview bounded data samples.
#[derive(Parser, Debug)]
#[command(name = "erddap-mcp")]
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

/// Builds the tool registry from the loaded configuration.
fn build_tools(cfg: &Config) -> ToolRegistry {
    let source = config::servers_source(cfg);
    let servers = ServerRegistry::load(source.as_deref());
    info!(
        servers = servers.len(),
        source = ?source,
        "Server registry loaded"
    );

    let client = ErddapClient::new(cfg.upstream_settings());
    let context = ToolContext::new(
        Arc::new(servers),
        Arc::new(client),
        cfg.default_server_url.as_str(),
    )
    .with_preview(cfg.preview_settings());

    ToolRegistry::with_builtin_tools(context)
}

/// Entry point for the erddap-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        default_server = %cfg.default_server_url,
        "Starting erddap-mcp server"
    );

    let tools = Arc::new(build_tools(&cfg));
    let mut server = McpServer::new(tools);

    info!("MCP server ready, waiting for client connection...");

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
