use checker::{CheckController, CheckSession, HttpCheckBackend, format_key};
use clap::{Parser, Subcommand};
use config::{Config, ConfigError, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use url::Url;

mod config;
mod render;

#[derive(Parser)]
#[command(about = "Check product keys against the validation backend")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides backend.base_url from the config file
    #[arg(long, global = true)]
    base_url: Option<Url>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Submit a key and follow the check until it finishes
    Check {
        key: String,
        /// Two-letter region code
        #[arg(long)]
        region: Option<String>,
    },
    /// Print the key in its normalized form
    Format { key: String },
}

#[derive(thiserror::Error, Debug)]
enum ConsoleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no backend configured, pass --config or --base-url")]
    NoBackend,
    #[error(transparent)]
    Check(#[from] checker::CheckError),
    #[error("could not install metrics recorder: {0}")]
    Metrics(String),
}

fn load_config(cli: &Cli) -> Result<Config, ConsoleError> {
    let mut config = match (&cli.config, &cli.base_url) {
        (Some(path), _) => Config::from_file(path)?,
        (None, Some(base_url)) => Config::with_base_url(base_url.clone()),
        (None, None) => return Err(ConsoleError::NoBackend),
    };
    if let Some(base_url) = &cli.base_url {
        config.backend.base_url = base_url.clone();
    }
    config.validate().map_err(ConfigError::from)?;
    Ok(config)
}

fn setup_logging(sentry_enabled: bool) {
    use tracing_subscriber::filter::{EnvFilter, LevelFilter};
    use tracing_subscriber::prelude::*;

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // Progress goes to stdout, logs to stderr.
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let sentry_layer = sentry_enabled.then(|| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt)
        .with(sentry_layer)
        .init();
}

fn setup_metrics(config: &MetricsConfig) -> Result<(), ConsoleError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some("keyconsole"))
        .map_err(|e| ConsoleError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| ConsoleError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe_all(checker::metrics_defs::ALL_METRICS);
    Ok(())
}

async fn run_check(
    config: Config,
    key: &str,
    region: Option<&str>,
) -> Result<CheckSession, ConsoleError> {
    let backend = Arc::new(HttpCheckBackend::new(&config.backend.base_url));
    let mut controller = CheckController::new(backend, config.timings);
    let mut updates = controller.start(key, region)?;

    loop {
        let session = updates.borrow_and_update().clone();
        if session.status.is_terminal() {
            return Ok(session);
        }
        println!("{}", render::progress_line(&session));

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(updates.borrow().clone());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, cancelling check");
                controller.cancel();
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (key, region) = match &cli.command {
        CliCommand::Format { key } => {
            println!("{}", format_key(key));
            return ExitCode::SUCCESS;
        }
        CliCommand::Check { key, region } => (key.clone(), region.clone()),
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sentry_guard = config.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    setup_logging(sentry_guard.is_some());

    if let Some(metrics) = &config.metrics
        && let Err(e) = setup_metrics(metrics)
    {
        tracing::warn!(error = %e, "continuing without metrics");
    }

    match run_check(config, &key, region.as_deref()).await {
        Ok(session) => {
            println!("{}", render::summary(&session));
            if render::is_failure(&session) {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "check could not run");
            ExitCode::FAILURE
        }
    }
}
