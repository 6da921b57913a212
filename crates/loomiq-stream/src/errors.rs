/// Errors raised while opening or reading a task event stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (for example an empty task id).
    #[error("validation error: {0}")]
    Validation(String),
    /// Connection could not be established or the byte stream failed.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// The server answered the stream request with a non-success status.
    #[error("stream request failed with status {status}: {message}")]
    Http { status: u16, message: String },
    /// Framing or sequencing of the stream was invalid.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StreamError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// True when the error means the connection is gone.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http { .. })
    }
}

/// A single event payload could not be decoded.
///
/// Never terminal: the decoder logs it and skips the line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed payload for event `{tag}`: {message}")]
pub struct DecodeError {
    pub tag: String,
    pub message: String,
}

impl DecodeError {
    pub(crate) fn new(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
        }
    }
}

/// Errors raised when building an `AuthSession`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("token must not be empty")]
    Empty,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token expired at {expired_at}")]
    Expired {
        expired_at: chrono::DateTime<chrono::Utc>,
    },
}

/// Errors returned by the REST side of the client (`TaskApi`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Rejected before any request was sent.
    #[error("validation error: {0}")]
    Validation(String),
    /// Request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend answered with a non-success status.
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    /// Backend answered with an unexpected body.
    #[error("unexpected response: {0}")]
    Protocol(String),
    /// The credential returned by the backend was unusable.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
}
