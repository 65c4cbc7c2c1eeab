use clap::Parser;
use metrics_exporter_statsd::StatsdBuilder;
use mirror_proxy::config::{Config, LoggingConfig, MetricsConfig};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Redirecting mirror proxy for the Jenkins update center
#[derive(Parser)]
#[command(name = "mirror-proxy", version)]
struct Cli {
    /// YAML config file. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host of the main listener
    #[arg(long)]
    host: Option<String>,

    /// Port of the main listener
    #[arg(long)]
    port: Option<u16>,

    /// The default provider of the update center mirror
    #[arg(long)]
    default_provider: Option<String>,

    /// The default JSON server of the update center mirror
    #[arg(long)]
    default_json_server: Option<String>,

    /// Directory of the download statistics
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<Config, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(host) = &self.host {
            config.listener.host = host.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(provider) = &self.default_provider {
            config.default_provider = provider.clone();
        }
        if let Some(json_server) = &self.default_json_server {
            config.default_json_server = json_server.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.is_some().then(sentry::integrations::tracing::layer))
        .init();

    guard
}

fn init_metrics(metrics: &MetricsConfig) -> Result<(), Box<dyn Error>> {
    let recorder = StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some("mirror_proxy"))?;
    metrics::set_global_recorder(recorder)
        .map_err(|_| "a metrics recorder is already installed")?;

    shared::metrics_defs::describe_all(update_center::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(mirror_proxy::metrics_defs::ALL_METRICS);
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let _sentry = init_logging(config.logging.as_ref());
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        "Starting mirror-proxy"
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(mirror_proxy::run(config))?;
    Ok(())
}
