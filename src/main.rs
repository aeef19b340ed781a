use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use url::Url;

use headlamp_embed::{DashboardParameters, HeadlampLinkFormatter, LinkRequest, ReadinessPoller};
use headlamp_k8s::{to_yaml, write_kubeconfig};

mod config;
mod frontend;
mod logging;
mod serve;

use config::{Config, DEFAULT_CONFIG_PATH, env};

/// headlamp-host - Run the Headlamp dashboard behind a developer portal
#[derive(Parser, Debug)]
#[command(name = "headlamp-host")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the TOML config file
    #[arg(long, short, env = env::CONFIG, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Log format: json or compact
    #[arg(long, env = env::LOG_FORMAT, default_value = "compact", global = true)]
    log_format: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = env::LOG_LEVEL, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Aggregate clusters, run the dashboard and proxy to it (default)
    Serve,
    /// Print the merged kubeconfig
    Kubeconfig {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print a dashboard deep link for a Kubernetes object
    Link {
        /// Object kind, e.g. Deployment
        kind: String,
        /// Object name
        name: String,
        #[arg(long, short)]
        namespace: Option<String>,
        /// Cluster name as known to the dashboard
        #[arg(long)]
        cluster: Option<String>,
        /// External dashboard URL
        #[arg(long)]
        dashboard_url: Option<Url>,
        /// Link to the dashboard page inside the portal
        #[arg(long)]
        internal: bool,
    },
    /// Wait until the dashboard answers its health endpoint
    WaitReady {
        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(&args.log_format, &args.log_level);

    let result = run(args).await;
    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "headlamp-host failed");
    }
    result
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(&args.config).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                config = %args.config.display(),
                "headlamp-host starting"
            );
            serve::run(args.config, config).await?;
            info!("Shutdown complete");
        }
        Command::Kubeconfig { output } => {
            let document = config.aggregator().kubeconfig().await?;
            let yaml = to_yaml(&document)?;
            match output {
                Some(path) => write_kubeconfig(&path, &yaml)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{}", yaml),
            }
        }
        Command::Link {
            kind,
            name,
            namespace,
            cluster,
            dashboard_url,
            internal,
        } => {
            let parameters = DashboardParameters {
                internal,
                cluster_name: cluster,
                headlamp_route: Some(config.frontend.headlamp_route.clone()),
            };
            let formatter = HeadlampLinkFormatter::new(config.portal_origin()?);
            let link = formatter.format_cluster_link(&LinkRequest {
                dashboard_url: dashboard_url.as_ref(),
                parameters: &parameters,
                kind: &kind,
                name: &name,
                namespace: namespace.as_deref(),
            })?;
            println!("{}", link);
        }
        Command::WaitReady { timeout_secs } => {
            let poller = ReadinessPoller::new(
                &config.dashboard_origin()?,
                &config.frontend.health_path,
                config.poll_interval(),
            )?;
            info!(url = %poller.url(), "Waiting for dashboard");
            let attempts = match timeout_secs {
                Some(secs) => poller.wait_with_timeout(Duration::from_secs(secs)).await?,
                None => poller.wait_until_ready().await,
            };
            println!("ready after {} attempt(s)", attempts);
        }
    }

    Ok(())
}
