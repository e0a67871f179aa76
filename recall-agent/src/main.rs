//! recall-agent - food recall alert job
//!
//! Runs one poll cycle per invocation; schedule it with cron or a systemd
//! timer. Deliveries are dry runs unless ALLOW_SEND is enabled or `--send`
//! is given.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use recall_agent::composer;
use recall_agent::demo::{self, DEFAULT_DEMO_LIMIT, DEFAULT_DEMO_OUT};
use recall_agent::services::{RecallSource, Summarizer};
use recall_agent::{AppContext, PollDriver};
use recall_common::config::{load_toml_config, AppConfig, ChannelKind};
use tracing::{info, warn};

/// Command-line arguments for recall-agent
#[derive(Parser, Debug)]
#[command(name = "recall-agent")]
#[command(about = "Poll food recalls and alert on new ones")]
#[command(version)]
struct Cli {
    /// TOML config file (default: ~/.config/recall-alert/config.toml)
    #[arg(long, global = true, env = "RECALL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one poll cycle (default)
    Run(RunArgs),

    /// Fetch a batch, save it as JSON and print a short table
    DemoFetch {
        /// Number of records to fetch
        #[arg(long, default_value_t = DEFAULT_DEMO_LIMIT)]
        limit: u32,

        /// Output file
        #[arg(long, default_value = DEFAULT_DEMO_OUT)]
        out: PathBuf,
    },

    /// Summarize the built-in sample recall and send it as an alert
    TestAlert {
        /// Destination (default: TEST_EMAIL, then SMTP_USER)
        #[arg(long)]
        to: Option<String>,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Print the recall numbers already stored
    ListStored,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Records per fetch (overrides FETCH_LIMIT)
    #[arg(long)]
    limit: Option<u32>,

    /// Sort field, newest first (overrides FETCH_SORT_FIELD)
    #[arg(long)]
    sort_field: Option<String>,

    /// Destination (overrides NOTIFY_TO)
    #[arg(long)]
    to: Option<String>,

    #[command(flatten)]
    delivery: DeliveryArgs,
}

#[derive(Args, Debug, Default)]
struct DeliveryArgs {
    /// email, sms_api or sms_gateway (overrides NOTIFY_CHANNEL)
    #[arg(long, value_parser = parse_channel)]
    channel: Option<ChannelKind>,

    /// Skip the language-model summary
    #[arg(long)]
    no_summarize: bool,

    /// Log alerts instead of sending them, whatever ALLOW_SEND says
    #[arg(long, conflicts_with = "send")]
    dry_run: bool,

    /// Send alerts, whatever ALLOW_SEND says
    #[arg(long)]
    send: bool,
}

impl DeliveryArgs {
    fn dry_run(&self, config: &AppConfig) -> bool {
        if self.dry_run {
            true
        } else if self.send {
            false
        } else {
            config.dry_run()
        }
    }
}

fn parse_channel(raw: &str) -> std::result::Result<ChannelKind, String> {
    raw.parse().map_err(|e: recall_common::Error| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = load_toml_config(cli.config.as_deref())?;
    let mut config = AppConfig::resolve(&toml_config)?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("{}", recall_agent::build_info());

    let ctx = AppContext::new(config);

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(&ctx, args).await,
        Command::DemoFetch { limit, out } => demo_fetch(&ctx, limit, out).await,
        Command::TestAlert { to, delivery } => test_alert(&ctx, to, delivery).await,
        Command::ListStored => list_stored(&ctx).await,
    }
}

async fn run(ctx: &AppContext, args: RunArgs) -> Result<()> {
    let config = ctx.config();
    let dry_run = args.delivery.dry_run(config);
    if dry_run {
        info!("Dry run: alerts are logged, not sent");
    }

    let channel = ctx.channel_for(args.delivery.channel, args.to.as_deref())?;
    let dispatcher = ctx.dispatcher()?;
    let source = ctx.recall_source()?;
    let summarizer = ctx.summarizer(!args.delivery.no_summarize);
    let store = ctx.store().await.context("Failed to open recall store")?;

    let driver = PollDriver::new(&source, store, &dispatcher, channel)
        .with_summarizer(summarizer.as_ref().map(|s| s as &dyn Summarizer))
        .with_dry_run(dry_run)
        .with_batch(
            args.limit.unwrap_or(config.source.limit),
            args.sort_field
                .unwrap_or_else(|| config.source.sort_field.clone()),
        );

    let report = driver.run_once().await?;
    if report.delivery_failures > 0 {
        warn!(
            failures = report.delivery_failures,
            "Some alerts were not delivered; their recalls stay stored"
        );
    }
    println!("{}", report);
    Ok(())
}

async fn demo_fetch(ctx: &AppContext, limit: u32, out: PathBuf) -> Result<()> {
    let source = ctx.recall_source()?;
    let batch = source
        .fetch(limit, &ctx.config().source.sort_field)
        .await
        .context("Fetch failed")?;

    let path = demo::write_batch(&out, &batch)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Fetched {} recalls. Saved to {}", batch.len(), path.display());

    for (i, item) in batch.iter().enumerate() {
        println!("{}", demo::format_row(i + 1, item));
    }
    Ok(())
}

async fn test_alert(ctx: &AppContext, to: Option<String>, delivery: DeliveryArgs) -> Result<()> {
    let dry_run = delivery.dry_run(ctx.config());
    let channel = ctx.channel_for(delivery.channel, to.as_deref())?;
    let dispatcher = ctx.dispatcher()?;

    let summary = match ctx.summarizer(!delivery.no_summarize) {
        Some(summarizer) => {
            let summary = summarizer
                .summarize(demo::SAMPLE_NOTICE)
                .await
                .context("Summarization of the sample recall failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Some(summary)
        }
        None => None,
    };

    let alert = composer::compose(&demo::sample_recall(), summary.as_ref());
    let outcome = dispatcher.dispatch(&alert, &channel, dry_run).await?;
    info!(?outcome, "Test alert done");
    Ok(())
}

async fn list_stored(ctx: &AppContext) -> Result<()> {
    let store = ctx.store().await.context("Failed to open recall store")?;
    let numbers = store.recall_numbers().await?;
    for number in &numbers {
        println!("{}", number);
    }
    info!(count = numbers.len(), backend = store.backend_name(), "Listed stored recalls");
    Ok(())
}
