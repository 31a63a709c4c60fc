use crate::handler::{HandlerResult, JobFailure, JobHandlerRegistry};
use faktory_core::Job;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{error, info};

/// Runs a job through its registered handler with panic recovery
pub struct JobExecutor<'r> {
    registry: &'r JobHandlerRegistry,
}

impl<'r> JobExecutor<'r> {
    pub fn new(registry: &'r JobHandlerRegistry) -> Self {
        JobExecutor { registry }
    }

    pub fn execute(&self, job: &Job) -> HandlerResult {
        let handler = match self.registry.get(job.job_type()) {
            Some(handler) => handler,
            None => {
                error!("No handler registered for job type: {}", job.job_type());
                return Err(JobFailure::new(
                    "UnknownJobType",
                    format!("No handler registered for job type: {}", job.job_type()),
                ));
            }
        };

        let started = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.perform(job))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Job {} panicked: {}", job.id(), message);
                Err(JobFailure::new("Panic", message))
            }
        };

        match &result {
            Ok(()) => info!("Job {} completed in {:?}", job.id(), started.elapsed()),
            Err(failure) => error!("Job {} failed: {}", job.id(), failure),
        }

        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EchoHandler;

    #[test]
    fn test_execute_success() {
        let registry = JobHandlerRegistry::new();
        registry.register("echo", EchoHandler);

        let executor = JobExecutor::new(&registry);
        assert!(executor.execute(&Job::new("j1", "echo", vec![])).is_ok());
    }

    #[test]
    fn test_unknown_job_type() {
        let registry = JobHandlerRegistry::new();
        let failure = JobExecutor::new(&registry)
            .execute(&Job::new("j1", "missing", vec![]))
            .unwrap_err();

        assert_eq!(failure.err_type, "UnknownJobType");
        assert!(failure.message.contains("missing"));
    }

    #[test]
    fn test_panic_recovery() {
        let registry = JobHandlerRegistry::new();
        registry.register("boom", |_: &Job| -> HandlerResult { panic!("kaboom") });

        let failure = JobExecutor::new(&registry)
            .execute(&Job::new("j1", "boom", vec![]))
            .unwrap_err();

        assert_eq!(failure, JobFailure::new("Panic", "kaboom"));
    }
}
