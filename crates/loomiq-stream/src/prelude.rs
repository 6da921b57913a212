//! Common imports for typical client usage.
pub use crate::{
    ApiError, AuthSession, ClientConfig, EventKind, HttpEventSource, LogLine, NewTask,
    ProgressSnapshot, StreamError, StreamStatus, TaskApi, TaskStreamHandle, TaskStreamMonitor,
};
