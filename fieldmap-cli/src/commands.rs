//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use fieldmap_core::config::{config_exists, load_config, workspace_config_path};
use fieldmap_core::{
    EngineConfig, ExecutionContext, FieldMapping, MappingEngine, ProposedMapping, ResolutionResult,
};
use fieldmap_rpc::RpcServer;
use fieldmap_rpc::handlers::RequestHandler;
use fieldmap_rpc::transport::StdioTransport;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Functions { describe } => {
            let engine = build_engine(workspace)?;
            if describe {
                for (name, description) in engine.registry().describe() {
                    println!("{:<12} {}", name, description);
                }
                Ok(())
            } else {
                print_json(&engine.list_functions())
            }
        }
        Commands::Test {
            mappings,
            context,
            concurrent,
        } => {
            let engine = build_engine(workspace)?;
            let mappings: Vec<FieldMapping> = load_document(&mappings)?;
            let context: ExecutionContext = load_document(&context)?;
            let result = run_test(&engine, mappings, context, concurrent).await?;
            print_json(&result)
        }
        Commands::Automap {
            targets,
            context,
            mappings,
        } => {
            let engine = build_engine(workspace)?;
            let context: ExecutionContext = load_document(&context)?;
            let existing: Vec<FieldMapping> = match mappings {
                Some(path) => load_document(&path)?,
                None => Vec::new(),
            };
            print_json(&run_automap(&engine, &targets, &context, &existing))
        }
        Commands::Serve { concurrent } => {
            let engine = build_engine(workspace)?;
            let server =
                RpcServer::with_handler(RequestHandler::new(engine).with_concurrency(concurrent));
            let mut transport = StdioTransport::stdio();
            server.run(&mut transport).await?;
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn build_engine(workspace: &Path) -> anyhow::Result<MappingEngine> {
    Ok(MappingEngine::from_workspace(workspace)?)
}

/// Read a JSON or YAML document, chosen by file extension.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        serde_yaml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid YAML in {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid JSON in {}: {}", path.display(), e))
    }
}

/// Resolve mappings; a partial result is still a success.
pub async fn run_test(
    engine: &MappingEngine,
    mappings: Vec<FieldMapping>,
    context: ExecutionContext,
    concurrent: bool,
) -> fieldmap_core::Result<ResolutionResult> {
    let result = if concurrent {
        engine
            .resolve_all_concurrent(mappings, Arc::new(context))
            .await?
    } else {
        engine.test_mappings(&mappings, &context)?
    };
    if !result.is_complete() {
        info!(failed = result.errors.len(), "Resolution finished with field errors");
    }
    Ok(result)
}

pub fn run_automap(
    engine: &MappingEngine,
    targets: &[String],
    context: &ExecutionContext,
    existing: &[FieldMapping],
) -> Vec<ProposedMapping> {
    let targets: Vec<String> = targets
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    engine.auto_map(&targets, context, existing)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&config_path, EngineConfig::default().to_toml()?)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            if !config_exists(Some(workspace)) {
                eprintln!("No configuration file found; showing built-in defaults.");
            }
            let config = load_config(Some(workspace), None)?;
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
