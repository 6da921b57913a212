use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::errors::StreamError;

/// Default backend API root.
pub const DEFAULT_API_BASE: &str = "https://loomiq.onrender.com/api";

/// Where the bearer token travels on the stream request.
///
/// The backend contract reads `?token=` because browser event sources cannot
/// set headers; the header is sent as well when the transport allows it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TokenPlacement {
    Query,
    Header,
    #[default]
    Both,
}

impl TokenPlacement {
    pub fn in_query(self) -> bool {
        matches!(self, Self::Query | Self::Both)
    }

    pub fn in_header(self) -> bool {
        matches!(self, Self::Header | Self::Both)
    }
}

impl FromStr for TokenPlacement {
    type Err = StreamError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(Self::Query),
            "header" => Ok(Self::Header),
            "both" => Ok(Self::Both),
            other => Err(StreamError::Config(format!(
                "unknown token placement `{other}` (expected query, header or both)"
            ))),
        }
    }
}

/// Configuration shared by the stream monitor and the REST client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API root, for example `https://loomiq.onrender.com/api`.
    pub api_base: String,
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Whole-request timeout for REST calls. Streams have none.
    pub request_timeout: Duration,
    pub token_placement: TokenPlacement,
    /// Period of the elapsed-time tick.
    pub tick_period: Duration,
    /// Delay between `task:completed` and the completion callback.
    pub completion_grace: Duration,
    /// Delay between a failure and the completion callback.
    pub failure_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            token_placement: TokenPlacement::default(),
            tick_period: Duration::from_secs(1),
            completion_grace: Duration::from_millis(800),
            failure_grace: Duration::from_millis(1500),
        }
    }
}

impl ClientConfig {
    /// Reads overrides from the environment.
    ///
    /// - `LOOMIQ_API_BASE`: API root.
    /// - `LOOMIQ_CONNECT_TIMEOUT_SECS`: connect timeout in seconds.
    /// - `LOOMIQ_TOKEN_PLACEMENT`: `query`, `header` or `both`.
    pub fn from_env() -> Result<Self, StreamError> {
        let mut config = Self::default();
        if let Some(base) = env_non_empty("LOOMIQ_API_BASE") {
            config.api_base = base;
        }
        if let Some(raw) = env_non_empty("LOOMIQ_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                StreamError::Config(format!("LOOMIQ_CONNECT_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = env_non_empty("LOOMIQ_TOKEN_PLACEMENT") {
            config.token_placement = raw.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn token_placement(mut self, placement: TokenPlacement) -> Self {
        self.token_placement = placement;
        self
    }

    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Overrides both completion-callback delays.
    pub fn grace_delays(mut self, completed: Duration, failed: Duration) -> Self {
        self.completion_grace = completed;
        self.failure_grace = failed;
        self
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.tick_period.is_zero() {
            return Err(StreamError::Config("tick_period must be non-zero".into()));
        }
        self.base_url().map(|_| ())
    }

    /// `{api_base}/{segments...}` with every segment percent-encoded.
    pub fn endpoint_url(&self, segments: &[&str]) -> Result<Url, StreamError> {
        let mut url = self.base_url()?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StreamError::Config(format!("api base cannot carry a path: {}", self.api_base))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    /// `GET /tasks/{task_id}/stream`, with `?token=` when the placement asks for it.
    pub fn stream_url(&self, task_id: &str, token: &str) -> Result<Url, StreamError> {
        let mut url = self.endpoint_url(&["tasks", task_id, "stream"])?;
        if self.token_placement.in_query() {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }

    fn base_url(&self) -> Result<Url, StreamError> {
        Url::parse(self.api_base.trim()).map_err(|e| {
            StreamError::Config(format!("invalid api base `{}`: {e}", self.api_base))
        })
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
