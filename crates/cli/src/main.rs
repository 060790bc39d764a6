use anyhow::Context;
use clap::{Parser, Subcommand};
use gopherbot_core::config::{AppConfig, BotMode};
use gopherbot_core::state::BotState;
use gopherbot_dispatch::ReplyDispatcher;
use gopherbot_messenger::MessengerClient;
use gopherbot_server::gateway::Gateway;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "gopherbot")]
#[command(version = VERSION)]
#[command(about = "Messenger webhook bot that answers Go questions with gophers")]
struct Cli {
    /// JSON config file (defaults to ~/.gopherbot/config.json when present)
    #[arg(short, long, global = true, env = "GOPHERBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Also write logs to a daily rotating file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server (default)
    Serve {
        /// Listen address, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
        /// privileged | open
        #[arg(short, long)]
        mode: Option<BotMode>,
    },
    /// Print the effective configuration with secrets masked
    CheckConfig,
}

fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let stdout_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(Level::INFO.into());
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(stdout_filter);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let (non_blocking, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "gopherbot.log"));
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::INFO);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref());

    let config = AppConfig::load(cli.config.clone()).context(
        "Failed to load config. Set VERIFY_TOKEN and PAGE_ACCESS_TOKEN or pass --config",
    )?;

    match cli.command {
        Some(Commands::CheckConfig) => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(())
        }
        Some(Commands::Serve { bind, mode }) => serve(apply_overrides(config, bind, mode)).await,
        None => serve(config).await,
    }
}

fn apply_overrides(mut config: AppConfig, bind: Option<String>, mode: Option<BotMode>) -> AppConfig {
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if let Some(mode) = mode {
        config.mode = mode;
    }
    config
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    info!(
        version = VERSION,
        mode = %config.mode,
        images = config.images.len(),
        api_base = %config.api_base,
        "Starting gopherbot"
    );

    let client = MessengerClient::from_config(&config)?;
    let state = BotState::new(config.images.clone()).shared();
    let dispatcher = Arc::new(ReplyDispatcher::new(config.mode, state, Arc::new(client)));

    Gateway::new(config.bind.clone(), config.verify_token.clone(), dispatcher)
        .start()
        .await
}
