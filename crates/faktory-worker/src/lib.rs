pub mod worker;
pub mod executor;
pub mod handler;
pub mod config;

pub use worker::{ShutdownReason, Worker};
pub use executor::JobExecutor;
pub use handler::{HandlerResult, JobFailure, JobHandler, JobHandlerRegistry};
pub use config::WorkerConfig;
