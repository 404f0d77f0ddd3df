//! Fieldmap CLI: preview resolutions, propose mappings and serve JSON-RPC.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Fieldmap: resolve declarative field mappings against upstream outputs
#[derive(Parser, Debug)]
#[command(name = "fieldmap", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.fieldmap/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List the functions available to expressions and transforms
    Functions {
        /// Print each function with its description instead of JSON
        #[arg(short, long)]
        describe: bool,
    },
    /// Resolve mappings against a context and print the result
    Test {
        /// Mappings file (JSON or YAML array of field mappings)
        #[arg(short, long)]
        mappings: PathBuf,
        /// Context file (JSON or YAML execution context)
        #[arg(short, long)]
        context: PathBuf,
        /// Resolve fields concurrently, each under the field timeout
        #[arg(long)]
        concurrent: bool,
    },
    /// Propose mappings for target fields by name similarity
    Automap {
        /// Comma-separated target fields
        #[arg(short, long, value_delimiter = ',', required = true)]
        targets: Vec<String>,
        /// Context file (JSON or YAML execution context)
        #[arg(short, long)]
        context: PathBuf,
        /// Existing mappings; their targets are skipped
        #[arg(short, long)]
        mappings: Option<PathBuf>,
    },
    /// Serve JSON-RPC 2.0 over stdin/stdout
    Serve {
        /// Resolve `mappings/test` fields concurrently
        #[arg(long)]
        concurrent: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration to the workspace
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries results and RPC frames, so the console layer writes to stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "fieldmap", "fieldmap")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "fieldmap.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}
