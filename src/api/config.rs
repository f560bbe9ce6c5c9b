//! Purpose: Client configuration with environment overrides.
//! Exports: `ClientConfig`, `DEFAULT_BASE_URL`.
//! Role: Single source of connection, retry and poll settings for `VectorClient`.
//! Invariants: Environment lookups are injectable so tests never mutate process env.
use crate::core::error::{Error, ErrorKind};
use crate::core::poll::DEFAULT_POLL_INTERVAL;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://vector.geovector.dev/v2/";

pub const ENV_URL: &str = "GEOVECTOR_URL";
pub const ENV_TOKEN: &str = "GEOVECTOR_TOKEN";
pub const ENV_POLL_INTERVAL_MS: &str = "GEOVECTOR_POLL_INTERVAL_MS";
pub const ENV_MAX_RETRIES: &str = "GEOVECTOR_MAX_RETRIES";

#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    pub page_size: u32,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = non_empty(lookup(ENV_URL)) {
            config.base_url = url;
        }
        config.token = non_empty(lookup(ENV_TOKEN));
        if let Some(raw) = non_empty(lookup(ENV_POLL_INTERVAL_MS)) {
            config.poll_interval = Duration::from_millis(parse_number(ENV_POLL_INTERVAL_MS, &raw)?);
        }
        if let Some(raw) = non_empty(lookup(ENV_MAX_RETRIES)) {
            config.max_retries = parse_number(ENV_MAX_RETRIES, &raw)?;
        }
        Ok(config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            connect_timeout: Duration::from_millis(9_500),
            read_timeout: Duration::from_secs(30),
            max_retries: 5,
            retry_backoff: Duration::from_millis(500),
            poll_interval: DEFAULT_POLL_INTERVAL,
            page_size: 100,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("poll_interval", &self.poll_interval)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, Error>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim().parse::<T>().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{key} must be a non-negative integer, got {raw:?}"))
            .with_source(err)
    })
}
