use faktory_client::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub url: String,
    pub worker_id: Option<String>,
    pub labels: Vec<String>,
    pub queues: Vec<String>,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            url: "tcp://127.0.0.1:7419".to_string(),
            worker_id: None,
            labels: vec!["rust".to_string()],
            queues: vec!["default".to_string()],
            poll_interval_ms: 5000,
            heartbeat_interval_secs: 15,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn generate_worker_id(&self) -> String {
        use std::process;
        use uuid::Uuid;

        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let random = Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}", hostname, pid, &random[..8])
    }

    /// Connection settings announcing this worker in `HELLO`
    pub fn connection_config(&self, worker_id: &str) -> anyhow::Result<ConnectionConfig> {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let config = ConnectionConfig::from_url(&self.url)?
            .with_wid(worker_id)
            .with_labels(self.labels.iter().cloned())
            .with_worker_option("hostname", hostname)
            .with_worker_option("pid", std::process::id());

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
