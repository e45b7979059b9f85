//! The `bioforge` binary: single extractions, batches, and record checks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bioforge_engine::batch::{BatchCoordinator, BatchItemResult, parse_batch_input, settle_run};
use bioforge_engine::confidence::ConfidenceRouter;
use bioforge_engine::conversation::ConversationLoop;
use bioforge_engine::few_shot::ExampleSnapshot;
use bioforge_engine::record::Biography;
use bioforge_engine::service::RetryingService;
use bioforge_engine::source::SourceProvider;
use bioforge_engine::store::RecordStore;
use bioforge_engine::tools::{BiographyToolkit, ToolRegistry};
use bioforge_engine::validation::ValidationEngine;
use bioforge_provider::config::{BatchArgs, Cli, Command, EngineArgs, LogFormat};
use bioforge_provider::{FileSourceProvider, JsonlRecordStore, OutputDirectory, RigReasoningService};
use clap::Parser;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::CompletionModel;
use rig::providers::anthropic;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Extract {
            file,
            url,
            output,
            engine,
        } => run_extract(&file, url, output, &engine).await,
        Command::Batch {
            list,
            output,
            engine,
            batch,
        } => run_batch(&list, output, &engine, &batch).await,
        Command::Validate { file } => run_validate(&file).await,
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&Biography::json_schema())?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn reasoning_service(
    args: &EngineArgs,
) -> Result<RigReasoningService<impl CompletionModel + Send + Sync>> {
    std::env::var("ANTHROPIC_API_KEY")
        .context("ANTHROPIC_API_KEY must be set in the environment or .env")?;
    let client = anthropic::Client::from_env();
    tracing::info!(event = "model_selected", model = %args.model, "Using Anthropic model");
    Ok(RigReasoningService::new(client.completion_model(&args.model)))
}

async fn open_store(args: &EngineArgs) -> Result<Option<Arc<dyn RecordStore>>> {
    let Some(path) = &args.store else {
        return Ok(None);
    };
    let store = JsonlRecordStore::open(path)
        .await
        .with_context(|| format!("failed to open record store {}", path.display()))?;
    Ok(Some(Arc::new(store)))
}

fn tool_registry(
    args: &EngineArgs,
    store: Option<&Arc<dyn RecordStore>>,
) -> Result<Arc<ToolRegistry>> {
    let config = args.engine_config();
    let mut builder = BiographyToolkit::builder()
        .tool_timeout(config.tool_timeout)
        .lookup_timeout(config.lookup_timeout);
    if let Some(store) = store {
        builder = builder.store(Arc::clone(store));
    }
    Ok(Arc::new(builder.build()?.into_registry()?))
}

async fn run_extract(
    file: &Path,
    url: Option<String>,
    output: Option<PathBuf>,
    args: &EngineArgs,
) -> Result<()> {
    let config = args.engine_config();
    let store = open_store(args).await?;
    let registry = tool_registry(args, store.as_ref())?;

    let mut document = FileSourceProvider::new().fetch(&file.display().to_string()).await?;
    if let Some(url) = url {
        document.source_url = url;
    }

    let service = RetryingService::new(reasoning_service(args)?, config.retry);
    let router = ConfidenceRouter::new(config.acceptance_threshold);
    let run_loop = ConversationLoop::new(service, registry, config)?;

    let result = run_loop.run(&document, &ExampleSnapshot::empty()).await;

    let outcome = settle_run(&router, store.as_deref(), &result).await;
    let item = BatchItemResult {
        index: 0,
        identifier: file.display().to_string(),
        outcome,
        run: Some(result),
    };

    if let Some(output) = output {
        let out = OutputDirectory::create(output).await?;
        let path = out.write_item(&item).await?;
        tracing::info!(event = "output_written", path = %path.display(), "Wrote outcome");
    }
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

async fn run_batch(
    list: &Path,
    output: PathBuf,
    args: &EngineArgs,
    batch: &BatchArgs,
) -> Result<()> {
    let content = tokio::fs::read_to_string(list)
        .await
        .with_context(|| format!("failed to read batch list {}", list.display()))?;
    let identifiers = parse_batch_input(&content);
    if identifiers.is_empty() {
        anyhow::bail!("batch list {} names no sources", list.display());
    }

    let config = args.engine_config();
    let store = open_store(args).await?;
    let registry = tool_registry(args, store.as_ref())?;
    let base_dir = list.parent().unwrap_or_else(|| Path::new("."));
    let sources = FileSourceProvider::new().with_base_dir(base_dir);

    let mut coordinator = BatchCoordinator::new(
        reasoning_service(args)?,
        registry,
        sources,
        config,
        batch.batch_config(),
    )?;
    if let Some(store) = store {
        coordinator = coordinator.with_store(store);
    }

    let out = OutputDirectory::create(output).await?;
    let report = coordinator.run(&identifiers).await;

    for item in &report.items {
        if let Err(e) = out.write_item(item).await {
            tracing::warn!(
                event = "output_failed",
                index = item.index,
                identifier = %item.identifier,
                error = %e,
                "Failed to write item output"
            );
        }
    }
    let summary_path = out.write_summary(&report.summary).await?;
    tracing::info!(
        event = "summary_written",
        path = %summary_path.display(),
        "Wrote batch summary"
    );

    println!("{}", serde_json::to_string_pretty(&report.summary)?);
    Ok(())
}

async fn run_validate(file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)?;
    let candidate = value
        .pointer("/result/outcome/record")
        .cloned()
        .unwrap_or(value);

    let report = match ValidationEngine::new()?.validate_record(candidate) {
        Ok(record) => json!({ "valid": true, "name": record.name }),
        Err(errors) => json!({ "valid": false, "errors": errors }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
