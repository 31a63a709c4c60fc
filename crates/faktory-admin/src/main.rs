use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use faktory_client::{Connection, ConnectionConfig, Producer};
use faktory_core::{Job, Priority};
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fk-admin")]
#[command(about = "Faktory admin CLI", long_about = None)]
struct Args {
    /// Server URL
    #[arg(short, long, env = "FAKTORY_URL", default_value = "tcp://127.0.0.1:7419")]
    url: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push a new job
    Push(PushArgs),
}

#[derive(ClapArgs, Debug)]
struct PushArgs {
    /// Job type
    #[arg(short, long)]
    jobtype: String,

    /// Arguments as a JSON array
    #[arg(short, long, default_value = "[]")]
    args: String,

    /// Target queue
    #[arg(short, long)]
    queue: Option<String>,

    /// Priority (1-9)
    #[arg(short = 'P', long)]
    priority: Option<u8>,

    /// Schedule for later (RFC 3339)
    #[arg(long)]
    at: Option<String>,

    /// Retry budget
    #[arg(long)]
    retry: Option<i64>,

    /// Reservation in seconds
    #[arg(long)]
    reserve_for: Option<u64>,

    /// Custom metadata as a JSON object
    #[arg(long)]
    custom: Option<String>,

    /// Number of copies to push, each with its own jid
    #[arg(short, long, default_value = "1")]
    count: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match args.command {
        Commands::Push(push) => {
            let jobs = (0..push.count)
                .map(|_| build_job(&push))
                .collect::<anyhow::Result<Vec<Job>>>()?;

            let mut connection = Connection::new(ConnectionConfig::from_url(&args.url)?);
            let mut producer = Producer::new(&mut connection);
            producer.push_batch(&jobs)?;
            connection.end()?;

            print_jobs(&jobs, args.format)?;
        }
    }

    Ok(())
}

fn build_job(push: &PushArgs) -> anyhow::Result<Job> {
    let args: Vec<Value> =
        serde_json::from_str(&push.args).context("--args must be a JSON array")?;

    let mut builder = Job::builder(push.jobtype.as_str()).args(args);

    if let Some(queue) = &push.queue {
        builder = builder.queue(queue.as_str());
    }
    if let Some(priority) = push.priority {
        builder = builder.priority(Priority::new(priority)?);
    }
    if let Some(at) = &push.at {
        let at = DateTime::parse_from_rfc3339(at).context("--at must be an RFC 3339 timestamp")?;
        builder = builder.at(at.with_timezone(&Utc));
    }
    if let Some(retry) = push.retry {
        builder = builder.retry(retry);
    }
    if let Some(seconds) = push.reserve_for {
        builder = builder.reserve_for(seconds);
    }
    if let Some(custom) = &push.custom {
        let custom: Map<String, Value> =
            serde_json::from_str(custom).context("--custom must be a JSON object")?;
        builder = builder.custom(custom);
    }

    Ok(builder.build()?)
}

fn print_jobs(jobs: &[Job], format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => {
            let pushed: Vec<Value> = jobs
                .iter()
                .map(|job| {
                    serde_json::json!({
                        "jid": job.id(),
                        "jobtype": job.job_type(),
                        "queue": job.queue(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&pushed)?);
        }
        Format::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["JID", "Type", "Queue", "Priority"]);
            for job in jobs {
                table.add_row(vec![
                    job.id().to_string(),
                    job.job_type().to_string(),
                    job.queue().to_string(),
                    job.priority().value().to_string(),
                ]);
            }
            println!("{table}");
        }
    }

    Ok(())
}
