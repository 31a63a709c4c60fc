use faktory_core::Job;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Result type for job handlers
pub type HandlerResult = Result<(), JobFailure>;

/// Why a job failed, as reported back with `FAIL`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub err_type: String,
    pub message: String,
    pub backtrace: Vec<String>,
}

impl JobFailure {
    pub fn new(err_type: impl Into<String>, message: impl Into<String>) -> Self {
        JobFailure {
            err_type: err_type.into(),
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.err_type, self.message)
    }
}

/// Lets handlers use `?` on any error type. The error's type name becomes
/// `err_type` and its source chain becomes the backtrace.
impl<E> From<E> for JobFailure
where
    E: std::error::Error,
{
    fn from(error: E) -> Self {
        let type_name = std::any::type_name::<E>();
        let err_type = type_name.rsplit("::").next().unwrap_or(type_name);

        let mut backtrace = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            backtrace.push(cause.to_string());
            source = cause.source();
        }

        JobFailure::new(err_type, error.to_string()).with_backtrace(backtrace)
    }
}

/// Trait for job handlers
pub trait JobHandler: Send + Sync {
    /// Perform the job. Returning an error reports the job as failed.
    fn perform(&self, job: &Job) -> HandlerResult;
}

impl<F> JobHandler for F
where
    F: Fn(&Job) -> HandlerResult + Send + Sync,
{
    fn perform(&self, job: &Job) -> HandlerResult {
        self(job)
    }
}

/// Registry of job handlers by job type
pub struct JobHandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        JobHandlerRegistry {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a handler for a specific job type
    pub fn register<H: JobHandler + 'static>(&self, job_type: impl Into<String>, handler: H) {
        let mut handlers = self.handlers.write();
        handlers.insert(job_type.into(), Arc::new(handler));
    }

    /// Get a handler for a job type
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        let handlers = self.handlers.read();
        handlers.get(job_type).cloned()
    }

    /// Check if a handler is registered for a job type
    pub fn has_handler(&self, job_type: &str) -> bool {
        let handlers = self.handlers.read();
        handlers.contains_key(job_type)
    }

    /// Get all registered job types
    pub fn job_types(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        let mut types: Vec<String> = handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for JobHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Example handler that logs its arguments
pub struct EchoHandler;

impl JobHandler for EchoHandler {
    fn perform(&self, job: &Job) -> HandlerResult {
        info!(jid = %job.id(), args = ?job.args(), "echo");
        Ok(())
    }
}

/// Example handler that simulates work
///
/// Sleeps for the first argument in milliseconds, or the configured
/// default when the job has none.
pub struct SleepHandler {
    duration_ms: u64,
}

impl SleepHandler {
    pub fn new(duration_ms: u64) -> Self {
        SleepHandler { duration_ms }
    }
}

impl JobHandler for SleepHandler {
    fn perform(&self, job: &Job) -> HandlerResult {
        let duration_ms = match job.args().first() {
            Some(arg) => arg
                .as_u64()
                .ok_or_else(|| JobFailure::new("ArgumentError", "sleep expects milliseconds"))?,
            None => self.duration_ms,
        };
        std::thread::sleep(Duration::from_millis(duration_ms));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_echo_handler() {
        let job = Job::new("j1", "echo", vec![json!("hello")]);
        assert!(EchoHandler.perform(&job).is_ok());
    }

    #[test]
    fn test_registry() {
        let registry = JobHandlerRegistry::new();
        registry.register("echo", EchoHandler);
        registry.register("sleep", SleepHandler::new(0));

        assert!(registry.has_handler("echo"));
        assert!(!registry.has_handler("unknown"));
        assert_eq!(registry.job_types(), vec!["echo", "sleep"]);

        let handler = registry.get("echo").unwrap();
        assert!(handler.perform(&Job::new("j1", "echo", vec![])).is_ok());
    }

    #[test]
    fn test_closure_handler() {
        let registry = JobHandlerRegistry::new();
        registry.register("add", |job: &Job| -> HandlerResult {
            let sum: i64 = job.args().iter().filter_map(|arg| arg.as_i64()).sum();
            if sum < 0 {
                return Err(JobFailure::new("NegativeSum", sum.to_string()));
            }
            Ok(())
        });

        let handler = registry.get("add").unwrap();
        assert!(handler.perform(&Job::new("j1", "add", vec![json!(1), json!(2)])).is_ok());

        let failure = handler
            .perform(&Job::new("j2", "add", vec![json!(-5)]))
            .unwrap_err();
        assert_eq!(failure, JobFailure::new("NegativeSum", "-5"));
    }

    #[test]
    fn test_failure_from_error() {
        fn parse(job: &Job) -> HandlerResult {
            let _: u32 = serde_json::from_value(job.args()[0].clone())?;
            Ok(())
        }

        let failure = parse(&Job::new("j1", "parse", vec![json!("nope")])).unwrap_err();
        assert_eq!(failure.err_type, "Error");
        assert!(failure.message.contains("invalid type"));
    }

    #[test]
    fn test_sleep_handler_rejects_bad_argument() {
        let failure = SleepHandler::new(0)
            .perform(&Job::new("j1", "sleep", vec![json!("soon")]))
            .unwrap_err();
        assert_eq!(failure.err_type, "ArgumentError");
    }
}
