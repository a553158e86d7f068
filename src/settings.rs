use crate::error::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

impl HttpSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    pub url: String,
    /// Log every statement at `info` instead of `debug`.
    pub echo: bool,
}

#[derive(Clone, Debug)]
pub struct SentinelSettings {
    pub nodes: Vec<(String, u16)>,
    pub service_name: String,
    pub password: Option<String>,
    pub socket_timeout: Duration,
    pub key: String,
    pub poll_interval: Duration,
}

impl SentinelSettings {
    /// Sentinel endpoints as `redis://` URLs.
    pub fn node_urls(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|(host, port)| format!("redis://{}:{}/", host, port))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub http: HttpSettings,
    pub database: DatabaseSettings,
    pub sentinel: SentinelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            http: HttpSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseSettings {
                url: "sqlite://test.sqlite".to_string(),
                echo: true,
            },
            sentinel: SentinelSettings {
                nodes: vec![
                    ("localhost".to_string(), 26379),
                    ("localhost".to_string(), 26380),
                    ("localhost".to_string(), 26381),
                ],
                service_name: "master".to_string(),
                password: Some("123456".to_string()),
                socket_timeout: Duration::from_millis(100),
                key: "cur_time".to_string(),
                poll_interval: Duration::from_secs(1),
            },
        }
    }
}

impl Settings {
    /// Defaults overridden by `TEMPLATES_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Apply overrides from any `TEMPLATES_*` lookup; unset names keep their current value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TEMPLATES_HOST") {
            self.http.host = host;
        }
        if let Some(port) = lookup("TEMPLATES_PORT") {
            self.http.port = parse("TEMPLATES_PORT", &port)?;
        }
        if let Some(url) = lookup("TEMPLATES_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(echo) = lookup("TEMPLATES_DATABASE_ECHO") {
            self.database.echo = parse("TEMPLATES_DATABASE_ECHO", &echo)?;
        }
        if let Some(nodes) = lookup("TEMPLATES_SENTINELS") {
            self.sentinel.nodes = parse_nodes(&nodes)?;
        }
        if let Some(service) = lookup("TEMPLATES_SENTINEL_SERVICE") {
            self.sentinel.service_name = service;
        }
        if let Some(password) = lookup("TEMPLATES_SENTINEL_PASSWORD") {
            self.sentinel.password = if password.is_empty() {
                None
            } else {
                Some(password)
            };
        }
        if let Some(ms) = lookup("TEMPLATES_SENTINEL_TIMEOUT_MS") {
            self.sentinel.socket_timeout =
                Duration::from_millis(parse("TEMPLATES_SENTINEL_TIMEOUT_MS", &ms)?);
        }
        if let Some(key) = lookup("TEMPLATES_CACHE_KEY") {
            self.sentinel.key = key;
        }
        if let Some(ms) = lookup("TEMPLATES_POLL_INTERVAL_MS") {
            self.sentinel.poll_interval =
                Duration::from_millis(parse("TEMPLATES_POLL_INTERVAL_MS", &ms)?);
        }
        Ok(())
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {}: {:?}", name, raw)))
}

/// Parses `host:port[,host:port...]`.
fn parse_nodes(raw: &str) -> Result<Vec<(String, u16)>> {
    let mut nodes = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (host, port) = entry.rsplit_once(':').ok_or_else(|| {
            Error::Config(format!("sentinel node {:?} is not host:port", entry))
        })?;
        nodes.push((host.to_string(), parse("TEMPLATES_SENTINELS", port)?));
    }
    if nodes.is_empty() {
        return Err(Error::Config("TEMPLATES_SENTINELS is empty".to_string()));
    }
    Ok(nodes)
}
