//! Transports that deliver SSE frames for one task.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::StreamError;
use crate::sse::{FrameDecoder, SseFrame};

/// Frames of one open connection. Dropping it closes the connection.
pub type FrameStream =
    Pin<Box<dyn futures::Stream<Item = Result<SseFrame, StreamError>> + Send + 'static>>;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// What a transport needs to open a task stream.
#[derive(Clone)]
pub struct StreamRequest {
    pub stream_id: uuid::Uuid,
    pub task_id: String,
    pub token: String,
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("stream_id", &self.stream_id)
            .field("task_id", &self.task_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// One-way push channel of named events, opened once per task.
///
/// Implementations never reconnect on their own: the end of the returned
/// stream, or an error item, is final for that connection.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self, request: &StreamRequest) -> Result<FrameStream, StreamError>;
}

/// `EventSource` over HTTP using reqwest.
pub struct HttpEventSource {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpEventSource {
    pub fn new(config: ClientConfig) -> Result<Self, StreamError> {
        config.validate()?;
        // no overall timeout: the stream stays open for the whole task
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, StreamError> {
        Self::new(ClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl EventSource for HttpEventSource {
    async fn connect(&self, request: &StreamRequest) -> Result<FrameStream, StreamError> {
        let url = self.config.stream_url(&request.task_id, &request.token)?;
        debug!(stream_id = %request.stream_id, task_id = %request.task_id, "opening task event stream");

        let mut http_req = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if self.config.token_placement.in_header() {
            http_req = http_req.bearer_auth(&request.token);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| StreamError::transport(format!("stream request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StreamError::http(status.as_u16(), body));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("text/event-stream") {
            warn!(stream_id = %request.stream_id, content_type, "stream response is not text/event-stream");
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(frame_stream(bytes_stream)))
    }
}

fn frame_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<SseFrame, StreamError>> + Send {
    struct State {
        bytes_stream: ByteStream,
        decoder: FrameDecoder,
        pending: VecDeque<SseFrame>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(frame) = state.pending.pop_front() {
                    return Ok(Some((frame, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.pending.extend(state.decoder.push_chunk(&chunk));
                    }
                    Some(Err(e)) => {
                        return Err(StreamError::transport(format!("stream read failed: {e}")));
                    }
                    None => {
                        if state.decoder.pending_len() > 0 {
                            debug!(
                                bytes = state.decoder.pending_len(),
                                "discarding unterminated trailing frame"
                            );
                        }
                        state.done = true;
                    }
                }
            }
        },
    )
}
