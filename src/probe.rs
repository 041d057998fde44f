//! Background connectivity probe.
//!
//! Purely informational: sessions dispatch regardless of the last known status.

use crate::ai::Backend;
use crate::config::{Config, DEFAULT_HEALTH_TIMEOUT, DEFAULT_PROBE_INTERVAL, MIN_PROBE_INTERVAL};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ApiStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApiStatus::Unknown => "Проверка подключения...",
            ApiStatus::Up => "API подключен",
            ApiStatus::Down => "API недоступен",
        };
        f.write_str(label)
    }
}

pub struct ConnectivityProbe {
    backend: Arc<dyn Backend>,
    interval: Duration,
    timeout: Duration,
    status: watch::Sender<ApiStatus>,
}

impl ConnectivityProbe {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (status, _) = watch::channel(ApiStatus::Unknown);
        Self {
            backend,
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_HEALTH_TIMEOUT,
            status,
        }
    }

    pub fn from_config(backend: Arc<dyn Backend>, config: &Config) -> Self {
        Self::new(backend)
            .with_interval(config.probe_interval)
            .with_timeout(config.health_timeout)
    }

    /// Intervals below [`MIN_PROBE_INTERVAL`] are raised to it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_PROBE_INTERVAL);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn status(&self) -> ApiStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ApiStatus> {
        self.status.subscribe()
    }

    /// One bounded health check. Any failure, timeout included, reads as down.
    pub async fn check_once(&self) -> ApiStatus {
        let status = match tokio::time::timeout(self.timeout, self.backend.health()).await {
            Ok(Ok(())) => ApiStatus::Up,
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "health check failed");
                ApiStatus::Down
            }
            Err(_) => {
                tracing::debug!(timeout = ?self.timeout, "health check timed out");
                ApiStatus::Down
            }
        };
        self.status.send_replace(status);
        status
    }

    /// Check now, then every interval, until the handle is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.check_once().await;
            }
        })
    }
}
