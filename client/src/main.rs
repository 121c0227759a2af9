use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use client::{
    ClientErr, ClientRuntime, HttpTransport, RuntimeSettings,
    dataset::Dataset,
    linear::{LinearRegression, TrainSettings},
};
use comms::ClientId;
use log::{error, info};

/// Rows of the synthetic partition drawn when no dataset is given.
const SYNTHETIC_SAMPLES: usize = 256;

#[derive(Parser)]
#[command(name = "fl-client")]
#[command(about = "Takes part in federated averaging rounds with a local linear model", long_about = None)]
struct Args {
    /// This client's id
    #[arg(long, env = "FL_CLIENT_ID")]
    client_id: ClientId,

    /// Base url of the coordinator
    #[arg(long, default_value = "http://localhost:5001", env = "FL_SERVER_ADDRESS")]
    server_address: String,

    /// Rounds to take part in
    #[arg(long, default_value_t = 10)]
    rounds: usize,

    /// Seconds to wait after a round lost to a communication error
    #[arg(long, default_value_t = 5)]
    backoff_secs: u64,

    /// Per request timeout in seconds, unbounded if absent
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// CSV file with the local data, the last column is the target
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Feature columns of the synthetic partition used without --dataset
    #[arg(long, default_value_t = 4)]
    features: usize,

    #[arg(long, default_value_t = 5)]
    local_epochs: usize,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Seeds the shuffling of the local data, defaults to the client id
    #[arg(long)]
    seed: Option<u64>,
}

async fn run(args: Args) -> Result<(), ClientErr> {
    let dataset = match &args.dataset {
        Some(path) => Dataset::from_csv(path)?,
        None => Dataset::synthetic(args.client_id, SYNTHETIC_SAMPLES, args.features),
    };
    info!(
        client_id = args.client_id,
        samples = dataset.len(),
        features = dataset.features();
        "local dataset loaded"
    );

    let settings = TrainSettings {
        local_epochs: args.local_epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        ..Default::default()
    };
    let seed = args.seed.unwrap_or(args.client_id);
    let trainer = LinearRegression::new(dataset.features(), settings, seed);

    let timeout = args.request_timeout_secs.map(Duration::from_secs);
    let transport =
        HttpTransport::new(&args.server_address, timeout).map_err(ClientErr::Transport)?;

    let runtime_settings = RuntimeSettings {
        rounds: args.rounds,
        backoff: Duration::from_secs(args.backoff_secs),
    };

    let mut runtime =
        ClientRuntime::new(args.client_id, runtime_settings, transport, trainer, dataset);
    let report = runtime.run().await?;

    info!(
        "training completed: {} rounds completed, {} skipped",
        report.completed.len(),
        report.skipped.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("initializing client {}", args.client_id);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            if let ClientErr::Registration(_) = e {
                error!("make sure the coordinator is running first");
            }
            ExitCode::from(e.exit_code())
        }
    }
}
