// src/config/models.rs
use crate::proxy::Upstream;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10 * 60;
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
pub const DEFAULT_MAX_POOLED_BUFFERS: usize = 1024;
pub const DEFAULT_METRICS_PORT: u16 = 8081;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub upstreams: Vec<String>,
    #[serde(default)]
    pub algorithm: LoadBalancerAlgorithm,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstreams: Vec::new(),
            algorithm: LoadBalancerAlgorithm::default(),
            timeouts: TimeoutConfig::default(),
            buffers: BufferConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("Invalid listen address '{}'", self.listen))
    }

    /// Parse the configured upstream list, keeping its order.
    pub fn parsed_upstreams(&self) -> Result<Vec<Upstream>> {
        self.upstreams
            .iter()
            .map(|address| {
                Upstream::parse(address)
                    .with_context(|| format!("Invalid upstream '{}'", address))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        self.parsed_upstreams()?;

        if self.timeouts.dial_timeout_ms == 0 {
            bail!("timeouts.dial_timeout_ms must be greater than zero");
        }
        if self.timeouts.idle_timeout_secs == 0 {
            bail!("timeouts.idle_timeout_secs must be greater than zero");
        }
        if self.buffers.size == 0 {
            bail!("buffers.size must be greater than zero");
        }
        if !self.metrics.path.starts_with('/') {
            bail!("metrics.path must start with '/'");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerAlgorithm {
    #[default]
    RoundRobin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl TimeoutConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: default_dial_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_size")]
    pub size: usize,
    #[serde(default = "default_max_pooled")]
    pub max_pooled: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            size: default_buffer_size(),
            max_pooled: default_max_pooled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_dial_timeout_ms() -> u64 {
    DEFAULT_DIAL_TIMEOUT_MS
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_max_pooled() -> usize {
    DEFAULT_MAX_POOLED_BUFFERS
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
