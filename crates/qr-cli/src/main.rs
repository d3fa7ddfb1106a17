use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use qr_agents::{ReportAssembler, ResearchModel, Router};
use qr_core::{now_iso8601, Publisher, SearchAdapter, StageMessage};
use qr_providers::OpenAIProvider;
use qr_tools::{
    http_client, ContentExtractor, DuckDuckGoSearch, FsReportStore, PageFetcher, SearchEngine,
    SearxngSearch, WebSearchAdapter,
};

mod bus;
mod config;
mod event_bus;
mod server;
mod setup;

use bus::{BusWorker, ChannelBus};
use config::{Config, Overrides, SearchEngineKind};
use event_bus::{wait_for_chain, ChainEvent, ChainEventBus};

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: everything including HTTP layer details
    Trace,
    /// Verbose: payload sizes, retries, dropped sources
    Debug,
    /// Standard: one line per stage transition
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "qr")]
#[command(author, version, about = "Quick-research: iterative web research with a local LLM", long_about = None)]
pub struct Cli {
    /// Model to use (overrides config)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API (overrides config)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Loop-backs per research chain (overrides config)
    #[arg(short, long, global = true)]
    pub iterations: Option<u32>,

    /// Directory reports are written to (overrides config)
    #[arg(long, global = true)]
    pub reports_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP ingress and process research chains
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Research one topic and wait for its report
    Run {
        /// The topic to research
        topic: String,
    },
    /// Show current configuration
    Config,
    /// Write a configuration template to ~/.config/qr
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_filter()));

    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Handle setup before config is required
    let command = match cli.command {
        Commands::Setup => return setup::run(),
        command => command,
    };

    let overrides = Overrides {
        base_url: cli.base_url,
        model: cli.model,
        max_iterations: cli.iterations,
        reports_dir: cli.reports_dir,
        bind: match &command {
            Commands::Serve { bind } => bind.clone(),
            _ => None,
        },
    };
    let config = Config::load(&overrides)?;

    match command {
        Commands::Serve { .. } => serve(&config).await,
        Commands::Run { topic } => run_topic(&config, &topic).await,
        Commands::Config | Commands::Setup => show_config(&config),
    }
}

/// A running research pipeline: the channel, its worker and the event bus.
struct Pipeline {
    bus: ChannelBus,
    events: ChainEventBus,
}

fn start_pipeline(config: &Config) -> Result<Pipeline> {
    let provider = OpenAIProvider::new(config.llm.api_key.clone())
        .with_base_url(config.llm.base_url.clone())
        .with_default_model(config.llm.model.clone());

    let model = Arc::new(
        ResearchModel::new(Arc::new(provider))
            .with_model(config.llm.model.clone())
            .with_temperature(config.llm.temperature)
            .with_max_retries(config.llm.max_retries)
            .with_json_retries(config.llm.json_retries),
    );

    let client = http_client(
        &config.search.user_agent,
        Duration::from_secs(config.search.timeout_secs),
    )?;
    let engine: Arc<dyn SearchEngine> = match config.search.engine {
        SearchEngineKind::DuckDuckGo => Arc::new(DuckDuckGoSearch::new(client.clone())),
        SearchEngineKind::Searxng => {
            let url = config
                .search
                .searxng_url
                .clone()
                .context("search.searxng_url is not set")?;
            Arc::new(SearxngSearch::new(client.clone(), url))
        }
    };
    let search: Arc<dyn SearchAdapter> =
        Arc::new(WebSearchAdapter::new(engine, PageFetcher::new(client)));

    let extractor = ContentExtractor::new().with_max_chars(config.research.max_source_chars);
    let run_query = qr_agents::RunQuery::new(search, extractor)
        .with_results_per_query(config.research.results_per_query);

    let reports_dir = config.reports_dir();
    tracing::info!(dir = %reports_dir.display(), "Reports directory");
    let assembler = ReportAssembler::new(Arc::new(FsReportStore::new(reports_dir)));

    let (bus, rx) = ChannelBus::new(256);
    let router = Router::new(model, run_query, assembler, Arc::new(bus.clone()))
        .with_dedup_capacity(config.research.dedup_capacity);

    let events = ChainEventBus::new(256);
    tokio::spawn(BusWorker::new(rx, Arc::new(router), events.clone()).run());

    Ok(Pipeline { bus, events })
}

async fn serve(config: &Config) -> Result<()> {
    let pipeline = start_pipeline(config)?;

    // Log chain completions
    let mut rx = pipeline.events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            match event {
                ChainEvent::ReportWritten {
                    topic,
                    location,
                    reason,
                } => tracing::info!(topic = %topic, location = %location, reason = %reason, "Report ready"),
                ChainEvent::Failed {
                    topic,
                    stage,
                    error,
                } => tracing::warn!(topic = %topic, stage = %stage, error = %error, "Research chain dropped"),
                ChainEvent::StageCompleted { .. } => {}
            }
        }
    });

    let state = server::AppState {
        publisher: Arc::new(pipeline.bus.clone()),
        max_iterations: config.research.max_iterations,
    };
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!(bind = %config.server.bind, model = %config.llm.model, "Listening");

    axum::serve(listener, server::app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")
}

async fn run_topic(config: &Config, topic: &str) -> Result<()> {
    let topic = topic.trim();
    if topic.is_empty() {
        anyhow::bail!("Topic must not be empty");
    }

    let pipeline = start_pipeline(config)?;
    let mut rx = pipeline.events.subscribe();

    pipeline
        .bus
        .publish(StageMessage::seed(
            topic,
            config.research.max_iterations,
            now_iso8601(),
        ))
        .await?;

    tokio::select! {
        event = wait_for_chain(&mut rx, topic) => match event {
            Some(ChainEvent::ReportWritten { location, .. }) => {
                println!("{}", location);
                Ok(())
            }
            Some(ChainEvent::Failed { stage, error, .. }) => {
                anyhow::bail!("Research failed at stage {}: {}", stage, error)
            }
            _ => anyhow::bail!("Research pipeline stopped before finishing"),
        },
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
    }
}

fn show_config(config: &Config) -> Result<()> {
    let shown = toml::to_string_pretty(&config.redacted()).context("Failed to render config")?;
    println!("# Resolved configuration");
    if let Ok(path) = Config::config_path() {
        println!("# User config: {}", path.display());
    }
    println!("# Reports: {}\n", config.reports_dir().display());
    print!("{}", shown);
    Ok(())
}
