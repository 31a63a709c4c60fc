use crate::{config::WorkerConfig, executor::JobExecutor, handler::JobHandlerRegistry};
use faktory_client::{ClientError, Connection, Connector, Consumer, ErrorKind, TcpConnector};
use faktory_core::{ConsumerState, Job};

use tokio_util::sync::CancellationToken;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Granularity of the idle sleep between polls
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Why [`Worker::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The shutdown token was cancelled locally
    Cancelled,
    /// The server answered a heartbeat with `terminate`
    Terminated,
}

/// Worker process that fetches and performs jobs
///
/// The loop is blocking; run it on a dedicated thread (or
/// `spawn_blocking`) and stop it through [`Worker::shutdown_token`].
pub struct Worker<C: Connector = TcpConnector> {
    config: WorkerConfig,
    registry: Arc<JobHandlerRegistry>,
    connection: Connection<C>,
    shutdown: CancellationToken,
}

impl Worker<TcpConnector> {
    pub fn new(config: WorkerConfig, registry: JobHandlerRegistry) -> anyhow::Result<Self> {
        let worker_id = config.generate_worker_id();
        let connection = Connection::new(config.connection_config(&worker_id)?);

        Ok(Self::with_connection(config, registry, connection))
    }
}

impl<C: Connector> Worker<C> {
    /// Build a worker over an existing connection. The connection's
    /// worker options must carry a `wid`.
    pub fn with_connection(
        config: WorkerConfig,
        registry: JobHandlerRegistry,
        connection: Connection<C>,
    ) -> Self {
        Worker {
            config,
            registry: Arc::new(registry),
            connection,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn worker_id(&self) -> &str {
        self.connection.config().wid().unwrap_or("")
    }

    /// Token that stops the run loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run the worker until shutdown is requested or the server terminates it
    pub fn run(&mut self) -> anyhow::Result<ShutdownReason> {
        info!(
            "Starting worker {} (queues: {:?}, job types: {:?})",
            self.worker_id(),
            self.config.queues,
            self.registry.job_types()
        );

        let shutdown = self.shutdown.clone();
        let poll_interval = self.config.poll_interval();
        let heartbeat_interval = self.config.heartbeat_interval();
        let queues = self.config.queues.clone();

        let executor = JobExecutor::new(&self.registry);
        let mut consumer = Consumer::new(&mut self.connection)?;
        let mut last_beat = Instant::now();

        loop {
            if shutdown.is_cancelled() {
                info!("Worker shutting down gracefully");
                consumer.end()?;
                return Ok(ShutdownReason::Cancelled);
            }

            if consumer.state().is_terminal() {
                info!("Server requested termination, ending session");
                consumer.end()?;
                return Ok(ShutdownReason::Terminated);
            }

            let mut idle = true;

            if consumer.state().can_fetch() {
                match consumer.fetch(&queues) {
                    Ok(Some(job)) => {
                        idle = false;
                        perform(&mut consumer, &executor, &job)?;
                    }
                    Ok(None) => debug!("No jobs available"),
                    Err(e) => {
                        error!("Failed to fetch: {}", e);
                        return Err(e.into());
                    }
                }
            }

            if last_beat.elapsed() >= heartbeat_interval {
                let response = consumer.beat().map_err(|e| {
                    error!("Failed to send heartbeat: {}", e);
                    e
                })?;
                debug!("Heartbeat answered with {:?}", response);
                last_beat = Instant::now();
            }

            if idle && consumer.state() != ConsumerState::Terminated {
                sleep_unless_cancelled(&shutdown, poll_interval);
            }
        }
    }
}

/// Perform one job and report the outcome
///
/// A server error on the report is logged and the loop carries on; the
/// server re-queues jobs whose reservation expires.
fn perform<C: Connector>(
    consumer: &mut Consumer<'_, C>,
    executor: &JobExecutor<'_>,
    job: &Job,
) -> Result<(), ClientError> {
    info!("Performing job {} (type: {})", job.id(), job.job_type());

    let report = match executor.execute(job) {
        Ok(()) => consumer.ack(job),
        Err(failure) => consumer.fail(job, &failure.err_type, &failure.message, &failure.backtrace),
    };

    match report {
        Err(e) if e.kind() == ErrorKind::Server => {
            error!("Server rejected report for job {}: {}", job.id(), e);
            Ok(())
        }
        other => other,
    }
}

fn sleep_unless_cancelled(shutdown: &CancellationToken, duration: Duration) {
    let deadline = Instant::now() + duration;

    while !shutdown.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_CHECK_INTERVAL));
    }
}
