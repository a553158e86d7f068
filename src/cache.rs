//! Polls one key from a Sentinel-managed Redis master.
//!
//! The poller asks the sentinels for the current master, reads the key,
//! reports what it got (or why it failed) and sleeps before trying again.
//! Failures are reported and retried according to a [`RetryPolicy`]; with
//! [`RetryPolicy::unbounded`] the loop never gives up.

use crate::error::{Error, Result};
use crate::settings::SentinelSettings;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisConnectionInfo, RedisResult};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// How the poll loop treats failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between two polls, whether the previous one failed or not.
    pub interval: Duration,
    /// Stop once this many polls in a row have failed. `None` never stops.
    pub max_consecutive_failures: Option<u32>,
}

impl RetryPolicy {
    /// Fixed interval, unlimited attempts, no escalation.
    pub fn unbounded(interval: Duration) -> Self {
        RetryPolicy {
            interval,
            max_consecutive_failures: None,
        }
    }

    /// Stop after `failures` failed polls in a row. Successful polls never
    /// stop the loop, so `0` behaves like `1`.
    pub fn give_up_after(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = Some(failures);
        self
    }
}

/// Something a key can be read from.
#[async_trait::async_trait]
pub trait KeySource: Send {
    async fn get(&mut self, key: &str) -> Result<Option<String>>;
}

/// Reads from whichever node the sentinels currently report as master.
pub struct SentinelSource {
    client: SentinelClient,
    connection: Option<MultiplexedConnection>,
    socket_timeout: Duration,
    connect_timeout: Duration,
}

impl SentinelSource {
    pub fn new(settings: &SentinelSettings) -> Result<Self> {
        let node_info = SentinelNodeConnectionInfo {
            tls_mode: None,
            redis_connection_info: Some(RedisConnectionInfo {
                password: settings.password.clone(),
                ..Default::default()
            }),
        };
        let client = SentinelClient::build(
            settings.node_urls(),
            settings.service_name.clone(),
            Some(node_info),
            SentinelServerType::Master,
        )?;
        // Resolving the master may walk every sentinel before connecting to it.
        let hops = settings.nodes.len() as u32 + 1;
        Ok(SentinelSource {
            client,
            connection: None,
            socket_timeout: settings.socket_timeout,
            connect_timeout: settings.socket_timeout * hops,
        })
    }

    async fn connect(&mut self) -> Result<MultiplexedConnection> {
        info!("Resolving master through sentinels");
        let connection = bounded(self.connect_timeout, self.client.get_async_connection()).await?;
        debug!("Connected to master");
        Ok(connection)
    }
}

#[async_trait::async_trait]
impl KeySource for SentinelSource {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        // A failed call leaves `connection` empty so the next call re-resolves the master.
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connect().await?,
        };
        let value = bounded(
            self.socket_timeout,
            connection.get::<_, Option<String>>(key),
        )
        .await?;
        self.connection = Some(connection);
        Ok(value)
    }
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::Timeout(limit)),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Value(Option<String>),
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct PollReport {
    pub at: DateTime<Local>,
    pub outcome: PollOutcome,
}

impl fmt::Display for PollReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.at.format("%Y-%m-%d %H:%M:%S%.6f"))?;
        writeln!(f, "--->")?;
        match &self.outcome {
            PollOutcome::Value(Some(value)) => write!(f, "{}", value),
            PollOutcome::Value(None) => write!(f, "None"),
            PollOutcome::Failed(error) => write!(f, "{}", error),
        }
    }
}

pub struct Poller<S> {
    source: S,
    key: String,
    policy: RetryPolicy,
    consecutive_failures: u32,
}

impl<S: KeySource> Poller<S> {
    pub fn new(source: S, key: impl Into<String>, policy: RetryPolicy) -> Self {
        Poller {
            source,
            key: key.into(),
            policy,
            consecutive_failures: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Read the key once. Errors are folded into the report, never returned.
    pub async fn poll_once(&mut self) -> PollReport {
        let at = Local::now();
        let outcome = match self.source.get(&self.key).await {
            Ok(value) => {
                self.consecutive_failures = 0;
                PollOutcome::Value(value)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Reading `{}` failed ({} in a row): {}",
                    self.key, self.consecutive_failures, e
                );
                PollOutcome::Failed(e.to_string())
            }
        };
        PollReport { at, outcome }
    }

    /// Poll forever. Only returns when the policy gives up.
    pub async fn run<F>(&mut self, on_report: F) -> Result<()>
    where
        F: FnMut(&PollReport),
    {
        self.poll_loop(None, on_report).await
    }

    /// Poll at most `iterations` times.
    pub async fn run_for<F>(&mut self, iterations: u64, on_report: F) -> Result<()>
    where
        F: FnMut(&PollReport),
    {
        self.poll_loop(Some(iterations), on_report).await
    }

    async fn poll_loop<F>(&mut self, limit: Option<u64>, mut on_report: F) -> Result<()>
    where
        F: FnMut(&PollReport),
    {
        let mut done: u64 = 0;
        loop {
            if limit.is_some_and(|limit| done >= limit) {
                return Ok(());
            }
            let report = self.poll_once().await;
            on_report(&report);
            done += 1;

            if let Some(max) = self.policy.max_consecutive_failures {
                if self.consecutive_failures > 0 && self.consecutive_failures >= max {
                    return Err(Error::RetriesExhausted(self.consecutive_failures));
                }
            }
            if limit.is_some_and(|limit| done >= limit) {
                return Ok(());
            }
            tokio::time::sleep(self.policy.interval).await;
        }
    }
}
