//! `blueprint-runner` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`     : execute a blueprint file once and print the run result.
//! - `analyze` : print structural statistics for a blueprint file.
//! - `eval`    : evaluate a condition expression against JSON variables.
//! - `validate`: check that a blueprint file parses and every step type is known.
//! - `migrate` : run pending database migrations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use db::{MemoryRunStore, PgRunStore, PoolConfig, RunStore};
use engine::{AutomationRunner, Blueprint, EngineConfig, Step, StepKind};
use nodes::{AgentClient, HttpAgentClient, UnconfiguredAgent};

#[derive(Parser)]
#[command(
    name = "blueprint-runner",
    about = "Execute and inspect automation blueprints",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a blueprint once.
    Run {
        /// Path to the blueprint JSON file.
        path: PathBuf,
        #[arg(long, default_value = "cli")]
        automation_id: String,
        /// Trigger payload as a JSON string.
        #[arg(long)]
        trigger: Option<String>,
        /// Persist the run to Postgres; runs are kept in memory otherwise.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        #[arg(long, env = "AGENT_ENDPOINT")]
        agent_endpoint: Option<String>,
        #[arg(long, env = "AGENT_API_KEY", hide_env_values = true)]
        agent_api_key: Option<String>,
        #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
        http_timeout_secs: u64,
    },
    /// Print structural statistics for a blueprint.
    Analyze {
        path: PathBuf,
    },
    /// Evaluate a condition expression.
    Eval {
        expression: String,
        /// Variables as a JSON object.
        #[arg(long, default_value = "{}")]
        vars: String,
    },
    /// Validate a blueprint file.
    Validate {
        path: PathBuf,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            path,
            automation_id,
            trigger,
            database_url,
            agent_endpoint,
            agent_api_key,
            http_timeout_secs,
        } => {
            let blueprint: Blueprint = read_json(&path)?;
            let trigger_data = trigger
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()
                .context("--trigger is not valid JSON")?;

            let config = EngineConfig {
                http_timeout: Duration::from_secs(http_timeout_secs),
                ..EngineConfig::default()
            };

            let store: Arc<dyn RunStore> = match database_url {
                Some(url) => {
                    let pool = db::pool::create_pool(&url, &PoolConfig::default())
                        .await
                        .context("failed to connect to database")?;
                    Arc::new(PgRunStore::new(pool))
                }
                None => {
                    info!("DATABASE_URL not set, keeping run records in memory");
                    Arc::new(MemoryRunStore::new())
                }
            };

            let agent: Arc<dyn AgentClient> = match agent_endpoint {
                Some(endpoint) => Arc::new(HttpAgentClient::new(endpoint, agent_api_key, config.http_timeout)?),
                None => Arc::new(UnconfiguredAgent),
            };

            let runner = AutomationRunner::new(store, agent, config)?;
            let result = runner.run(&automation_id, &blueprint, trigger_data).await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::Analyze { path } => {
            let document: Value = read_json(&path)?;
            match engine::analyze_blueprint(&document) {
                Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
                None => println!("Blueprint has no steps."),
            }
        }
        Command::Eval { expression, vars } => {
            let variables: HashMap<String, Value> =
                serde_json::from_str(&vars).context("--vars must be a JSON object")?;
            match engine::expression::try_evaluate(&expression, &variables) {
                Ok(result) => println!("{result}"),
                Err(e) => {
                    eprintln!("rejected ({e}), evaluates to false");
                    println!("false");
                }
            }
        }
        Command::Validate { path } => {
            let blueprint: Blueprint = read_json(&path)?;
            let mut unknown = Vec::new();
            collect_unknown(&blueprint.steps, &mut unknown);

            if !unknown.is_empty() {
                bail!("unknown step types: {}", unknown.join(", "));
            }
            println!("Blueprint is valid: {} top-level steps.", blueprint.steps.len());
        }
        Command::Migrate { database_url } => {
            let pool_config = PoolConfig { max_connections: 1, ..PoolConfig::default() };
            let pool = db::pool::create_pool(&database_url, &pool_config)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a valid blueprint", path.display()))
}

fn collect_unknown(steps: &[Step], out: &mut Vec<String>) {
    for step in steps {
        match &step.kind {
            StepKind::Unknown { step_type } => out.push(format!("'{step_type}' (step '{}')", step.id)),
            StepKind::Condition { config } => {
                collect_unknown(&config.if_true, out);
                collect_unknown(&config.if_false, out);
            }
            StepKind::Retry { config } => collect_unknown(&config.steps, out),
            StepKind::Fallback { config } => {
                collect_unknown(&config.primary_steps, out);
                collect_unknown(&config.fallback_steps, out);
            }
            StepKind::Loop { config } => collect_unknown(&config.steps, out),
            _ => {}
        }
    }
}
