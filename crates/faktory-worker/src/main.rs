use clap::Parser;
use faktory_worker::handler::{EchoHandler, SleepHandler};
use faktory_worker::{JobHandlerRegistry, Worker, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fk-worker")]
#[command(about = "Faktory worker process", long_about = None)]
struct Args {
    /// Server URL
    #[arg(short, long, env = "FAKTORY_URL")]
    url: Option<String>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,

    /// Queues to fetch from, in priority order
    #[arg(short, long, value_delimiter = ',')]
    queues: Vec<String>,

    /// Labels reported to the server
    #[arg(short, long, value_delimiter = ',')]
    labels: Vec<String>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        WorkerConfig::from_file(config_path)?
    } else {
        WorkerConfig::default()
    };

    // Override with CLI args
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }
    if !args.queues.is_empty() {
        config.queues = args.queues;
    }
    if !args.labels.is_empty() {
        config.labels = args.labels;
    }

    let registry = JobHandlerRegistry::new();
    registry.register("echo", EchoHandler);
    registry.register("sleep", SleepHandler::new(1000));

    let mut worker = Worker::new(config, registry)?;

    // Handle shutdown signals
    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown.cancel();
    });

    let reason = tokio::task::spawn_blocking(move || worker.run()).await??;
    tracing::info!("Worker stopped: {:?}", reason);

    Ok(())
}
