//! Subcommand handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use llm::OpenAiConfig;
use nodes::Collaborators;
use pipeline::{Pipeline, PipelineBuilder, RunContext};
use telegram::{TelegramClient, TelegramConfig};

use crate::config::{self, PipelineFile};

/// Run budget used when neither `--timeout-secs` nor the environment set one.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Resolved global options shared by the subcommands.
#[derive(Debug)]
pub struct Context {
    pub config_dir: PathBuf,
    pub credentials_path: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline name (looked up under <config-dir>/pipelines) or path to a JSON file
    pub pipeline: String,

    /// Deadline for the whole run, in seconds
    #[arg(
        long,
        env = "AUTOCHAIN_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Pipeline name (looked up under <config-dir>/pipelines) or path to a JSON file
    pub pipeline: String,
}

#[derive(Debug, Args)]
pub struct ChannelsArgs {
    /// Bot token to query
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub token: String,
}

/// `autochain run`
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let (file, mut pipeline) = build(&args.pipeline, ctx)?;

    let budget = Duration::from_secs(args.timeout_secs);
    let run = RunContext::new().with_timeout(budget);
    info!(
        pipeline = %file.name,
        run_id = %run.run_id(),
        ?budget,
        "Running pipeline"
    );

    pipeline
        .execute(&run)
        .await
        .with_context(|| format!("pipeline '{}' failed", file.name))?;

    info!(pipeline = %file.name, run_id = %run.run_id(), "Pipeline completed");
    Ok(())
}

/// `autochain check`
pub fn check(args: CheckArgs, ctx: &Context) -> Result<()> {
    let (file, pipeline) = build(&args.pipeline, ctx)?;

    println!("pipeline:  {}", file.name);
    if let Some(description) = &file.description {
        println!("about:     {description}");
    }
    if let Some(schedule) = &file.schedule {
        println!("schedule:  {schedule} (not acted on; use an external scheduler)");
    }
    for (index, (node, definition)) in pipeline.node_names().iter().zip(&file.nodes).enumerate() {
        println!("  {}. {} [{}]", index + 1, node, definition.node_type);
    }
    println!("ok: {} node(s) built", pipeline.node_count());
    Ok(())
}

/// `autochain channels`
pub async fn channels(args: ChannelsArgs) -> Result<()> {
    let client = TelegramClient::new(TelegramConfig::default(), args.token)
        .context("failed to create Telegram client")?;
    let chats = client
        .discover_chats()
        .await
        .context("failed to fetch Telegram updates")?;

    if chats.is_empty() {
        println!("No chats found. Post a message in the channel (with the bot as admin) and retry.");
        return Ok(());
    }

    for chat in chats {
        println!("chat id:   {}", chat.id);
        println!("type:      {}", chat.kind);
        if let Some(title) = &chat.title {
            println!("title:     {title}");
        }
        if let Some(username) = &chat.username {
            println!("username:  @{username}");
        }
        if let Some(hint) = chat.channel_id_hint() {
            println!("use as channel_id: {hint}");
        }
        println!();
    }
    Ok(())
}

/// Loads the pipeline file and credentials and builds the pipeline.
fn build(name: &str, ctx: &Context) -> Result<(PipelineFile, Pipeline)> {
    let path = config::pipeline_path(&ctx.config_dir, name);
    let file = PipelineFile::load(&path)?;
    let env = config::environment(&ctx.config_dir)?;
    let credentials = config::load_credentials(&ctx.credentials_path, env)?;

    let collaborators = Collaborators {
        language_model: llm::connector(OpenAiConfig::openai()),
        messenger: telegram::connector(TelegramConfig::default()),
    };
    let registry = nodes::builtin_registry(&collaborators);
    let builder = PipelineBuilder::new(Arc::new(credentials), Arc::new(registry));

    let pipeline = builder
        .build(file.name.clone(), &file.nodes)
        .with_context(|| format!("failed to build pipeline '{}'", file.name))?;
    Ok((file, pipeline))
}
