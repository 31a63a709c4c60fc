use crate::{ClientError, Result};
use serde_json::{Map, Value};
use std::time::Duration;

/// Port the server listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 7419;

/// Where to connect and what to announce in `HELLO`
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    worker_options: Map<String, Value>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectionConfig {
            host: host.into(),
            port,
            worker_options: Map::new(),
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Parse `tcp://host:port`, `host:port` or `host`
    pub fn from_url(url: &str) -> Result<Self> {
        let address = match url.split_once("://") {
            Some(("tcp", address)) => address,
            Some((scheme, _)) => {
                return Err(ClientError::Configuration(format!(
                    "unsupported URL scheme {:?}",
                    scheme
                )))
            }
            None => url,
        };
        let address = address.trim_end_matches('/');

        if address.contains('@') {
            return Err(ClientError::Configuration(
                "password authentication is not supported".to_string(),
            ));
        }

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ClientError::Configuration(format!("invalid port in {:?}", url))
                })?;
                (host, port)
            }
            None => (address, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(ClientError::Configuration(format!("missing host in {:?}", url)));
        }

        Ok(ConnectionConfig::new(host, port))
    }

    /// Replace all worker options sent with `HELLO`
    pub fn with_worker_options(mut self, options: Map<String, Value>) -> Self {
        self.worker_options = options;
        self
    }

    pub fn with_worker_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.worker_options.insert(key.into(), value.into());
        self
    }

    /// Worker identifier; required for consumers
    pub fn with_wid(self, wid: impl Into<String>) -> Self {
        self.with_worker_option("wid", Value::String(wid.into()))
    }

    pub fn with_labels<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<Value> = labels.into_iter().map(|label| Value::String(label.into())).collect();
        self.with_worker_option("labels", Value::Array(labels))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn worker_options(&self) -> &Map<String, Value> {
        &self.worker_options
    }

    pub fn wid(&self) -> Option<&str> {
        self.worker_options.get("wid").and_then(Value::as_str)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }
}
