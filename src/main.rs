use anyhow::{Context, Result};
use cipower::adapter::{self, AppState, Identifier, SECRET_UNAVAILABLE};
use cipower::config::Config;
use cipower::oci::client::OciClient;
use cipower::{Action, AdapterError, ReconcileRequest, Reconciler};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Start, stop or toggle an OCI container instance
#[derive(Parser, Debug)]
#[command(name = "cipower", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// OCI region to use
    #[arg(long, global = true)]
    region: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the container instance with the given OCID
    Run {
        /// Container instance OCID
        ocid: String,

        /// start, stop or toggle
        #[arg(value_parser = parse_action, default_value = "toggle")]
        action: Action,

        /// Notification topic OCID for failure messages
        channel: Option<String>,
    },

    /// Reconcile the container instance whose OCID is kept in a vault secret
    Secret {
        /// start, stop or toggle
        #[arg(value_parser = parse_action, default_value = "toggle")]
        action: Action,

        /// Secret OCID (defaults to the configured secret)
        #[arg(long)]
        secret_id: Option<String>,

        /// Notification topic OCID for failure messages
        #[arg(long)]
        channel: Option<String>,
    },

    /// Serve the function-style HTTP adapter
    Serve {
        /// Listen address
        #[arg(short, long)]
        listen: Option<String>,

        /// Notification topic OCID for failure messages
        #[arg(long)]
        channel: Option<String>,
    },
}

fn parse_action(s: &str) -> Result<Action, AdapterError> {
    s.parse()
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    // RUST_LOG still wins for per-target tuning
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .from_env_lossy();

    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = Config::load(args.config.as_deref());
    if let Some(region) = args.region {
        config.region = Some(region);
    }

    // Usage problems are reported before any credentials are needed
    let secret_id = match &args.command {
        Commands::Secret { secret_id, .. } => {
            match secret_id.clone().or_else(|| config.secret_id.clone()) {
                Some(id) => Some(id),
                None => {
                    return Ok(usage_error(
                        ErrorKind::MissingRequiredArgument,
                        "no secret to read the OCID from; pass --secret-id or set CIPOWER_SECRET_ID",
                    ))
                }
            }
        }
        _ => None,
    };

    let client = Arc::new(OciClient::connect(&config)?);
    let reconciler = Arc::new(Reconciler::new(
        client.clone(),
        client.clone(),
        client.clone(),
        config.poll_config(),
    ));

    let shutdown = CancellationToken::new();
    cancel_on_interrupt(shutdown.clone());

    match args.command {
        Commands::Run {
            ocid,
            action,
            channel,
        } => {
            let request = ReconcileRequest {
                resource_id: ocid,
                action,
                channel: channel.or(config.notification_topic),
            };
            Ok(reconcile_once(&reconciler, &request, &shutdown).await)
        }
        Commands::Secret { action, channel, .. } => {
            let resource_id =
                match adapter::resolve_identifier(None, secret_id.as_deref(), client.as_ref())
                    .await?
                {
                    Identifier::Resolved(id) => id,
                    Identifier::SecretUnavailable => {
                        tracing::error!("{}", SECRET_UNAVAILABLE);
                        println!("{}", SECRET_UNAVAILABLE);
                        return Ok(ExitCode::FAILURE);
                    }
                };

            let request = ReconcileRequest {
                resource_id,
                action,
                channel: channel.or(config.notification_topic),
            };
            Ok(reconcile_once(&reconciler, &request, &shutdown).await)
        }
        Commands::Serve { listen, channel } => {
            let listen = listen.unwrap_or_else(|| config.effective_listen());
            let state = AppState {
                reconciler,
                secrets: client,
                secret_id: config.secret_id,
                channel: channel.or(config.notification_topic),
                shutdown: shutdown.clone(),
            };

            let listener = tokio::net::TcpListener::bind(&listen)
                .await
                .with_context(|| format!("Failed to bind {}", listen))?;
            tracing::info!("Listening on {}", listen);

            axum::serve(listener, adapter::router(state))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .context("HTTP server failed")?;

            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn reconcile_once(
    reconciler: &Reconciler,
    request: &ReconcileRequest,
    cancel: &CancellationToken,
) -> ExitCode {
    let outcome = reconciler.reconcile(request, cancel).await;
    println!("{}", outcome);

    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Print a clap-formatted usage error and return its exit code (2)
fn usage_error(kind: ErrorKind, message: &str) -> ExitCode {
    let err = Args::command().error(kind, message);
    let _ = err.print();
    ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(2))
}

fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            token.cancel();
        }
    });
}
