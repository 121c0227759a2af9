use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use coordinator::{
    CoordinatorConfig, RoundCoordinator, TimeoutAction, initialization, service, watchdog,
};
use log::info;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "fl-coordinator")]
#[command(about = "Coordinates synchronous federated averaging rounds over HTTP", long_about = None)]
struct Args {
    /// JSON configuration file, flags override it's values
    #[arg(short, long, env = "FL_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long, env = "FL_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "FL_PORT")]
    port: Option<u16>,

    /// Seconds a round waits for stragglers once it's first update arrives
    #[arg(long)]
    round_timeout_secs: Option<u64>,

    /// What to do with a round past it's deadline
    #[arg(long, value_enum)]
    on_timeout: Option<TimeoutAction>,

    /// Seed for the initial global model
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<CoordinatorConfig> {
        let mut config = match &self.config {
            Some(path) => CoordinatorConfig::load(path)?,
            None => CoordinatorConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.round_timeout_secs {
            config.round_timeout_secs = Some(secs);
        }
        if let Some(action) = self.on_timeout {
            config.on_timeout = action;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;

    let initial = initialization::init_weights(&config.model, config.seed)
        .context("failed to initialize the global model")?;
    info!("initial global model {}", initial.shape_signature());

    let coordinator = Arc::new(RoundCoordinator::new(initial, config.policy()));
    let token = CancellationToken::new();

    let watchdog = config.policy().timeout.map(|timeout| {
        info!("rounds expire {timeout:?} after their first update ({:?})", config.on_timeout);
        tokio::spawn(watchdog::run(
            Arc::clone(&coordinator),
            config.watchdog_interval(),
            token.clone(),
        ))
    });

    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening at {}", listener.local_addr()?);

    let app = service::router(coordinator, config.max_body_bytes);
    let shutdown = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = signal::ctrl_c().await {
                log::error!("failed to listen for ctrl-c: {e}");
            }
            info!("received SIGINT, shutting down");
            shutdown.cancel();
        })
        .await?;

    if let Some(watchdog) = watchdog {
        watchdog.await?;
    }

    Ok(())
}
