//! Client for the LoomIQ task backend's live progress stream.
//!
//! A submitted task reports progress as named server-sent events on
//! `GET /tasks/{id}/stream`. [`TaskStreamMonitor`] opens that stream, feeds
//! each event through a [`StreamDecoder`] and publishes a
//! [`ProgressSnapshot`] (log lines, status, elapsed seconds) for rendering.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use loomiq_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let api = TaskApi::new(config.clone())?;
//! // `login` checks the token's expiry before handing back a session
//! let session = api.login("ada", "correct horse").await?;
//! let task = api.submit_task(&session, &NewTask::new("Summarise the README")).await?;
//!
//! let source = HttpEventSource::new(config.clone())?;
//! let monitor = TaskStreamMonitor::new(Arc::new(source), config);
//! let mut stream = monitor.open_with(&session, task.id.clone(), || println!("finished"))?;
//! while let Some(snapshot) = stream.changed().await {
//!     println!("{}", snapshot.badge());
//!     if snapshot.is_finished() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// REST endpoints around a stream: auth, tasks, agents and stats.
pub mod api;
/// Elapsed-time clock.
pub mod clock;
/// Client configuration.
pub mod config;
/// Synchronous decoder state machine and its snapshot.
pub mod decoder;
/// Error types.
pub mod errors;
/// Event tags and wire payloads.
pub mod event;
/// Async stream driver and its handle.
pub mod monitor;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Explicit auth session.
pub mod session;
/// Transports that deliver SSE frames.
pub mod source;
/// SSE framing.
pub mod sse;
/// Stream lifecycle status.
pub mod status;
/// Line styles and message cleanup.
pub mod style;

pub use api::{
    AgentCapability, AgentInfo, AgentStatus, ChangePasswordRequest, NewTask, RegisterRequest,
    TaskApi, TaskPriority, TaskRecord, TaskStats,
};
pub use clock::ElapsedClock;
pub use config::{ClientConfig, DEFAULT_API_BASE, TokenPlacement};
pub use decoder::{Applied, LogLine, ProgressSnapshot, StreamDecoder};
pub use errors::{ApiError, AuthError, DecodeError, StreamError};
pub use event::{EventKind, StreamEvent};
pub use monitor::{CompletionCallback, TaskStreamHandle, TaskStreamMonitor};
pub use observability::init_observability;
pub use session::{AuthSession, Permission, Role, UserProfile};
pub use source::{EventSource, FrameStream, HttpEventSource, StreamRequest};
pub use sse::{FrameDecoder, SseFrame};
pub use status::{StatusEffect, StreamStatus};
pub use style::{LineStyle, Tone, clean_message, style_for};
