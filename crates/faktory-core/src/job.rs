use crate::{
    JobError, Priority, Result, DEFAULT_QUEUE, DEFAULT_RESERVE_FOR, DEFAULT_RETRY,
    MIN_RESERVE_FOR, RESERVED_KEYS,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for a job, chosen by the producer
pub type JobId = String;

/// Extra job fields merged into the job object on the wire
pub type JobOptions = Map<String, Value>;

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// A unit of work as exchanged with the server.
///
/// On the wire a job is one flat JSON object:
/// `{"jid": .., "jobtype": .., "args": [..], ...options}`.
/// Options never override `jid`, `jobtype` or `args`.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    job_type: String,
    args: Vec<Value>,
    options: JobOptions,
}

impl Job {
    /// Create a job without options
    pub fn new(id: impl Into<JobId>, job_type: impl Into<String>, args: Vec<Value>) -> Self {
        Job {
            id: id.into(),
            job_type: job_type.into(),
            args,
            options: JobOptions::new(),
        }
    }

    /// Create a job with options. Option keys that collide with
    /// `jid`, `jobtype` or `args` are dropped.
    pub fn with_options(
        id: impl Into<JobId>,
        job_type: impl Into<String>,
        args: Vec<Value>,
        options: JobOptions,
    ) -> Self {
        let options = options
            .into_iter()
            .filter(|(key, _)| !is_reserved(key))
            .collect();

        Job {
            id: id.into(),
            job_type: job_type.into(),
            args,
            options,
        }
    }

    /// Start building a job with a generated id
    pub fn builder(job_type: impl Into<String>) -> JobBuilder {
        JobBuilder::new(job_type)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Raw option value, including keys this client does not know about
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Target queue
    pub fn queue(&self) -> &str {
        self.option("queue")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_QUEUE)
    }

    pub fn priority(&self) -> Priority {
        self.option("priority")
            .and_then(Value::as_u64)
            .and_then(|value| u8::try_from(value).ok())
            .and_then(|value| Priority::new(value).ok())
            .unwrap_or_default()
    }

    /// Seconds a fetched job may stay unacknowledged
    pub fn reserve_for(&self) -> u64 {
        self.option("reserve_for")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_RESERVE_FOR)
    }

    /// Retry attempts; -1 disables retries
    pub fn retry(&self) -> i64 {
        self.option("retry")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_RETRY)
    }

    /// Lines of failure backtrace the server keeps
    pub fn backtrace(&self) -> u64 {
        self.option("backtrace").and_then(Value::as_u64).unwrap_or(0)
    }

    /// Scheduled execution time, if any
    pub fn at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("at")
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("created_at")
    }

    pub fn custom(&self) -> Option<&Map<String, Value>> {
        self.option("custom").and_then(Value::as_object)
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.option(key)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }

    /// Serialize to the wire JSON shape
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(JobError::from)
    }

    /// Parse a job from the wire JSON shape
    pub fn from_json(json: &str) -> Result<Self> {
        let map: Map<String, Value> = serde_json::from_str(json)?;
        Self::from_map(map)
    }

    /// Rebuild a job from a decoded JSON object
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let mut id = None;
        let mut job_type = None;
        let mut args = None;
        let mut options = JobOptions::new();

        for (key, value) in map {
            match key.as_str() {
                "jid" => id = Some(value),
                "jobtype" => job_type = Some(value),
                "args" => args = Some(value),
                _ => {
                    options.insert(key, value);
                }
            }
        }

        let id = match id {
            Some(Value::String(id)) => id,
            Some(_) => return Err(JobError::InvalidField { field: "jid", expected: "a string" }),
            None => return Err(JobError::MissingField("jid")),
        };

        let job_type = match job_type {
            Some(Value::String(job_type)) => job_type,
            Some(_) => {
                return Err(JobError::InvalidField { field: "jobtype", expected: "a string" })
            }
            None => return Err(JobError::MissingField("jobtype")),
        };

        let args = match args {
            Some(Value::Array(args)) => args,
            Some(_) => return Err(JobError::InvalidField { field: "args", expected: "an array" }),
            None => return Err(JobError::MissingField("args")),
        };

        Ok(Job {
            id,
            job_type,
            args,
            options,
        })
    }
}

impl Serialize for Job {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.options.len()))?;
        map.serialize_entry("jid", &self.id)?;
        map.serialize_entry("jobtype", &self.job_type)?;
        map.serialize_entry("args", &self.args)?;
        for (key, value) in self.options.iter().filter(|(key, _)| !is_reserved(key)) {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Job {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Job::from_map(map).map_err(serde::de::Error::custom)
    }
}

/// Builder for jobs with typed options
pub struct JobBuilder {
    id: Option<JobId>,
    job_type: String,
    args: Vec<Value>,
    options: JobOptions,
    reserve_for: Option<u64>,
    reserved_key: Option<String>,
}

impl JobBuilder {
    pub fn new(job_type: impl Into<String>) -> Self {
        JobBuilder {
            id: None,
            job_type: job_type.into(),
            args: Vec::new(),
            options: JobOptions::new(),
            reserve_for: None,
            reserved_key: None,
        }
    }

    pub fn id(mut self, id: impl Into<JobId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn queue(self, queue: impl Into<String>) -> Self {
        self.set("queue", Value::String(queue.into()))
    }

    pub fn priority(self, priority: Priority) -> Self {
        self.set("priority", Value::from(priority.value()))
    }

    pub fn reserve_for(mut self, seconds: u64) -> Self {
        self.reserve_for = Some(seconds);
        self
    }

    pub fn at(self, at: DateTime<Utc>) -> Self {
        self.set("at", Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)))
    }

    pub fn retry(self, retry: i64) -> Self {
        self.set("retry", Value::from(retry))
    }

    pub fn backtrace(self, lines: u64) -> Self {
        self.set("backtrace", Value::from(lines))
    }

    pub fn created_at(self, created_at: DateTime<Utc>) -> Self {
        self.set(
            "created_at",
            Value::String(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        )
    }

    pub fn custom(self, custom: Map<String, Value>) -> Self {
        self.set("custom", Value::Object(custom))
    }

    /// Set any option, passed through verbatim
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if is_reserved(&key) {
            if self.reserved_key.is_none() {
                self.reserved_key = Some(key);
            }
            return self;
        }
        self.set(&key, value.into())
    }

    fn set(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Result<Job> {
        if let Some(key) = self.reserved_key {
            return Err(JobError::ReservedKey(key));
        }

        let mut options = self.options;
        if let Some(seconds) = self.reserve_for {
            if seconds < MIN_RESERVE_FOR {
                return Err(JobError::InvalidReservation(seconds));
            }
            options.insert("reserve_for".to_string(), Value::from(seconds));
        }

        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Job::with_options(id, self.job_type, self.args, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> JobOptions {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_job_creation() {
        let job = Job::new("abc", "send_email", vec![json!("a@b.c"), json!(3)]);

        assert_eq!(job.id(), "abc");
        assert_eq!(job.job_type(), "send_email");
        assert_eq!(job.args(), &[json!("a@b.c"), json!(3)]);
        assert!(job.options().is_empty());
    }

    #[test]
    fn test_serialize_merges_options() {
        let job = Job::with_options(
            "abc",
            "report",
            vec![],
            options(json!({"queue": "critical", "custom": {"tenant": 7}})),
        );

        let value: Value = serde_json::from_str(&job.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "jid": "abc",
                "jobtype": "report",
                "args": [],
                "queue": "critical",
                "custom": {"tenant": 7},
            })
        );
    }

    #[test]
    fn test_reserved_keys_win_over_options() {
        let job = Job::with_options(
            "real",
            "real_type",
            vec![json!(1)],
            options(json!({"jid": "fake", "jobtype": "fake", "args": {"a": 1}, "retry": 3})),
        );

        let json = job.to_json().unwrap();
        assert_eq!(json.matches("\"jid\"").count(), 1);

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["jid"], "real");
        assert_eq!(value["jobtype"], "real_type");
        assert_eq!(value["args"], json!([1]));
        assert_eq!(value["retry"], 3);
    }

    #[test]
    fn test_args_always_array() {
        let json = Job::new("a", "t", vec![]).to_json().unwrap();
        assert_eq!(json, r#"{"jid":"a","jobtype":"t","args":[]}"#);
    }

    #[test]
    fn test_from_json_splits_options() {
        let job = Job::from_json(
            r#"{"jid":"x1","jobtype":"resize","args":[1,"two"],"queue":"images","enqueued_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(job.id(), "x1");
        assert_eq!(job.job_type(), "resize");
        assert_eq!(job.args(), &[json!(1), json!("two")]);
        assert_eq!(job.queue(), "images");
        assert_eq!(job.option("enqueued_at"), Some(&json!("2024-01-01T00:00:00Z")));
        assert!(job.option("jid").is_none());
    }

    #[test]
    fn test_from_json_rejects_bad_shape() {
        match Job::from_json(r#"{"jobtype":"t","args":[]}"#) {
            Err(JobError::MissingField("jid")) => {}
            other => panic!("Expected missing jid, got {:?}", other),
        }
        match Job::from_json(r#"{"jid":"a","jobtype":"t","args":{"k":1}}"#) {
            Err(JobError::InvalidField { field: "args", .. }) => {}
            other => panic!("Expected invalid args, got {:?}", other),
        }
        match Job::from_json(r#"{"jid":5,"jobtype":"t","args":[]}"#) {
            Err(JobError::InvalidField { field: "jid", .. }) => {}
            other => panic!("Expected invalid jid, got {:?}", other),
        }
        assert!(Job::from_json("not json").is_err());
    }

    #[test]
    fn test_option_defaults() {
        let job = Job::new("a", "t", vec![]);

        assert_eq!(job.queue(), "default");
        assert_eq!(job.priority(), Priority::normal());
        assert_eq!(job.reserve_for(), 1800);
        assert_eq!(job.retry(), 25);
        assert_eq!(job.backtrace(), 0);
        assert!(job.at().is_none());
        assert!(job.created_at().is_none());
        assert!(job.custom().is_none());
    }

    #[test]
    fn test_job_builder() {
        let at = Utc::now() + chrono::Duration::hours(1);
        let job = Job::builder("send_email")
            .arg("someone@example.com")
            .queue("mail")
            .priority(Priority::high())
            .reserve_for(600)
            .retry(-1)
            .backtrace(10)
            .at(at)
            .option("unique_for", 30)
            .build()
            .unwrap();

        assert!(!job.id().is_empty());
        assert_eq!(job.queue(), "mail");
        assert_eq!(job.priority(), Priority::high());
        assert_eq!(job.reserve_for(), 600);
        assert_eq!(job.retry(), -1);
        assert_eq!(job.backtrace(), 10);
        assert_eq!(job.at().unwrap().timestamp_millis(), at.timestamp_millis());
        assert_eq!(job.option("unique_for"), Some(&json!(30)));
    }

    #[test]
    fn test_builder_validation() {
        match Job::builder("t").reserve_for(30).build() {
            Err(JobError::InvalidReservation(30)) => {}
            other => panic!("Expected InvalidReservation, got {:?}", other),
        }
        match Job::builder("t").option("jid", "nope").build() {
            Err(JobError::ReservedKey(key)) => assert_eq!(key, "jid"),
            other => panic!("Expected ReservedKey, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_generates_unique_ids() {
        let a = Job::builder("t").build().unwrap();
        let b = Job::builder("t").build().unwrap();
        assert_ne!(a.id(), b.id());

        let fixed = Job::builder("t").id("fixed").build().unwrap();
        assert_eq!(fixed.id(), "fixed");
    }
}
