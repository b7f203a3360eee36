//! skein CLI - Main entry point
//!
//! stdout은 이벤트 스트림 전용이고 로그는 전부 stderr로 간다.

mod cli;

use clap::{Parser, Subcommand, ValueEnum};
use skein_foundation::ExecutionStrategy;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// skein - tool-calling agent runtime
#[derive(Parser, Debug)]
#[command(name = "skein")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Extra settings file (highest priority)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory for tools and project settings
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one prompt and stream the run's events to stdout
    Run {
        /// User message that starts the thread
        #[arg(short, long)]
        prompt: String,

        /// Enable only tools matching these patterns (repeatable, globs allowed)
        #[arg(short, long = "tools")]
        tools: Vec<String>,

        /// Tool dispatch strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Turn limit for this run
        #[arg(long)]
        max_turns: Option<u32>,

        /// Print server-sent-event frames instead of JSON lines
        #[arg(long)]
        sse: bool,
    },
    /// List the tool registry after gateway discovery
    Tools,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Sequential,
    Parallel,
}

impl From<StrategyArg> for ExecutionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => ExecutionStrategy::Sequential,
            StrategyArg::Parallel => ExecutionStrategy::Parallel,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let working_dir = match args.workdir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config = cli::load_config(&working_dir, args.config)?;

    match args.command {
        Command::Run {
            prompt,
            tools,
            strategy,
            max_turns,
            sse,
        } => {
            let options = cli::RunArgs {
                prompt,
                tools,
                strategy: strategy.map(Into::into),
                max_turns,
                sse,
            };
            cli::run_once(config, working_dir, options).await
        }
        Command::Tools => cli::list_tools(config).await,
    }
}
