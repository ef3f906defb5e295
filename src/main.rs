mod cli;
mod compliance;
mod config;
mod db;
mod dispatch;
mod error;
mod generation;
mod logging;
mod orchestrator;
mod queue;
mod repository;
mod state_machine;
mod ui;
mod worker;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command, IndexCommand};
use compliance::{ComplianceClause, ComplianceIndex, ComplianceResolver};
use config::CasegenConfig;
use dispatch::{DispatchRequest, Dispatcher, WorkMessage};
use generation::{AnthropicGenerator, FunctionalGenerator, GenerationPort, Instructions};
use orchestrator::ItemOrchestrator;
use queue::SqliteQueue;
use repository::SqliteRepositories;
use sqlx::SqlitePool;
use tracing::info;
use worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CasegenConfig::load(&cli.config)?;
    config.validate()?;

    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    logging::init_logging(level, &config.log_format)?;

    match cli.command {
        Command::Dispatch {
            job_id,
            source,
            request,
            items,
        } => {
            let request = match request {
                Some(body) => DispatchRequest::from_json(body.as_bytes())?,
                None => DispatchRequest {
                    job_id: job_id.unwrap_or_default(),
                    issue_ids: items,
                    source: Some(source.into()),
                },
            };
            let pool = db::connect(&config.database_url, config.max_connections).await?;
            let queue = Arc::new(SqliteQueue::new(pool, config.visibility_timeout()));
            let outcome = Dispatcher::new(queue.clone()).dispatch(&request).await?;
            info!(backlog = queue.len().await?, "messages waiting in queue");
            ui::print_dispatch(&request.job_id, request.issue_ids.len(), &outcome);
        }
        Command::Worker => {
            let pool = db::connect(&config.database_url, config.max_connections).await?;
            let orchestrator = build_orchestrator(&config, pool.clone())?;
            let queue = SqliteQueue::new(pool, config.visibility_timeout());
            let worker = Worker::new(
                Arc::new(queue),
                Arc::new(orchestrator),
                config.worker_concurrency,
                config.poll_interval(),
            );
            worker
                .run(async {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("ctrl-c received");
                    }
                })
                .await?;
        }
        Command::Process { payload } => {
            let pool = db::connect(&config.database_url, config.max_connections).await?;
            let orchestrator = build_orchestrator(&config, pool)?;
            let message = WorkMessage::decode(payload.as_bytes())?;
            let progress = ui::ItemProgress::start(&message.issue_id);
            match orchestrator.process(&message).await {
                Ok(report) => {
                    progress.complete(&report);
                    progress.print_report(&report);
                }
                Err(e) => {
                    progress.abandon();
                    return Err(e).context("item could not be processed");
                }
            }
        }
        Command::Index { command } => match command {
            IndexCommand::Build { out, corpus } => build_index(&out, &corpus)?,
            IndexCommand::Tags => {
                let index = load_index(&config)?;
                for tag in index.tags() {
                    println!("{tag}");
                }
            }
        },
    }

    Ok(())
}

fn load_index(config: &CasegenConfig) -> Result<ComplianceIndex> {
    ComplianceIndex::load(
        &config.compliance_index_path,
        &config.compliance_reverse_index_path,
    )
    .with_context(|| {
        format!(
            "failed to load compliance index from {}",
            config.compliance_index_path.display()
        )
    })
}

fn build_orchestrator(config: &CasegenConfig, pool: SqlitePool) -> Result<ItemOrchestrator> {
    if config.api_key.is_empty() {
        bail!("no API key configured: set ANTHROPIC_API_KEY or api_key in the config file");
    }

    let index = Arc::new(load_index(config)?);

    let instructions = match &config.instructions_dir {
        Some(dir) => Instructions::load(dir)?,
        None => Instructions::default(),
    };

    let port: Arc<dyn GenerationPort> = Arc::new(AnthropicGenerator::with_base_url(
        config.api_key.clone(),
        config.api_base_url.clone(),
        config.model.clone(),
        config.max_tokens,
        config.request_timeout(),
    )?);

    Ok(ItemOrchestrator::new(
        Arc::new(SqliteRepositories::new(pool)),
        FunctionalGenerator::new(port.clone(), instructions.functional.clone()),
        ComplianceResolver::new(port, index, &instructions),
    )
    .with_deadline(config.invocation_timeout()))
}

fn build_index(out: &Path, corpus: &[std::path::PathBuf]) -> Result<()> {
    let mut clauses: Vec<ComplianceClause> = Vec::new();
    for path in corpus {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut parsed: Vec<ComplianceClause> = serde_json::from_str(&contents)
            .with_context(|| format!("invalid corpus file {}", path.display()))?;
        clauses.append(&mut parsed);
    }

    let index = ComplianceIndex::build(clauses);
    if index.is_empty() {
        bail!("corpus files contain no clauses");
    }
    index.write_to(out)?;
    println!(
        "{} clauses, {} tags written to {}",
        index.len(),
        index.tags().len(),
        out.display()
    );
    Ok(())
}
