mod check_commands;
mod state_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    ferry_channels::MessageSource,
    ferry_config::FerryConfig,
    ferry_dashboard::{DashboardState, EventHistory},
    ferry_discord::DiscordSource,
    ferry_metrics::{MetricsHandle, MetricsRecorderConfig},
    ferry_relay::{
        CursorStore, HttpEventSink, PollScheduler, PollSettings, RelayMapping, WebhookDispatcher,
    },
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "ferry", about = "Ferry: relay new channel messages to webhooks", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ferry.{toml,yaml,yml,json} in ./ then the user
    /// config dir).
    #[arg(long, global = true, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll configured channels and relay new messages (default).
    Run,
    /// Serve the local event dashboard.
    Dashboard {
        /// Address to bind to (overrides config value).
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides config value).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate the configuration and list routes.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Inspect or edit the cursor state file.
    State {
        #[command(subcommand)]
        action: state_commands::StateAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Run) => run_relay(cli.config).await,
        Some(Commands::Dashboard { bind, port }) => run_dashboard(cli.config, bind, port).await,
        Some(Commands::Check { verbose }) => check_commands::check(cli.config.as_deref(), verbose),
        Some(Commands::State { action }) => {
            state_commands::handle_state(cli.config.as_deref(), action).await
        },
    }
}

fn init_metrics(config: &FerryConfig) -> anyhow::Result<MetricsHandle> {
    ferry_metrics::init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: vec![("service".into(), "ferry".into())],
    })
    .context("failed to initialise metrics")
}

async fn run_relay(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (path, config) = ferry_config::load_validated(config_path.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "ferry starting"
    );
    init_metrics(&config)?;

    let source = Arc::new(DiscordSource::from_config(&config.source)?);
    let identity = source
        .identity()
        .await
        .context("failed to authenticate with the source")?;
    info!(user_id = %identity.user_id, username = %identity.username, "authenticated");

    let mapping = RelayMapping::from_routes(&config.relay.routes)?;
    let cursors = CursorStore::load(&config.relay.state_path);
    let dispatcher = Arc::new(WebhookDispatcher::from_config(&config.relay)?);

    let mut scheduler = PollScheduler::new(
        source,
        dispatcher,
        &identity,
        mapping,
        cursors,
        PollSettings::from_config(&config.relay),
    );
    if let Some(url) = config.dashboard.ingest_url.as_deref() {
        scheduler = scheduler.with_event_sink(Arc::new(HttpEventSink::new(url)?));
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));
    scheduler.run(cancel).await;
    Ok(())
}

async fn run_dashboard(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    // The dashboard runs without routes; only a parse failure is fatal.
    let config = match config_path.or_else(ferry_config::find_config_file) {
        Some(path) => ferry_config::load_config(&path)?,
        None => {
            warn!("no config file found, serving with defaults");
            FerryConfig::default()
        },
    };
    let metrics = init_metrics(&config)?;

    let bind = bind.unwrap_or_else(|| config.dashboard.bind.clone());
    let port = port.unwrap_or(config.dashboard.port);
    let state = DashboardState::new(EventHistory::from_config(&config));
    #[cfg(feature = "prometheus")]
    let state = state.with_metrics(metrics);
    #[cfg(not(feature = "prometheus"))]
    let _ = metrics;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));
    ferry_dashboard::serve(&bind, port, state, cancel).await?;
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown requested");
    token.cancel();
}
