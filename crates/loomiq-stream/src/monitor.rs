//! Async driver that owns one task stream connection.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt as _;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::clock::ElapsedClock;
use crate::config::ClientConfig;
use crate::decoder::{Applied, ProgressSnapshot, StreamDecoder};
use crate::errors::StreamError;
use crate::session::AuthSession;
use crate::source::{EventSource, StreamRequest};
use crate::status::StreamStatus;

/// Invoked once, without arguments, after the stream reaches a terminal state.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opens task streams over a shared transport.
#[derive(Clone)]
pub struct TaskStreamMonitor {
    source: Arc<dyn EventSource>,
    config: ClientConfig,
}

impl TaskStreamMonitor {
    pub fn new(source: Arc<dyn EventSource>, config: ClientConfig) -> Self {
        Self { source, config }
    }

    /// Opens a stream with no completion callback.
    pub fn open(
        &self,
        session: &AuthSession,
        task_id: impl Into<String>,
    ) -> Result<TaskStreamHandle, StreamError> {
        self.start(session, task_id.into(), None)
    }

    /// Opens a stream and schedules `on_complete` for after the terminal
    /// event: 800ms after `task:completed`, 1500ms after any failure
    /// (defaults, see [`ClientConfig`]).
    ///
    /// Must be called inside a tokio runtime.
    pub fn open_with(
        &self,
        session: &AuthSession,
        task_id: impl Into<String>,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> Result<TaskStreamHandle, StreamError> {
        self.start(session, task_id.into(), Some(Box::new(on_complete)))
    }

    fn start(
        &self,
        session: &AuthSession,
        task_id: String,
        on_complete: Option<CompletionCallback>,
    ) -> Result<TaskStreamHandle, StreamError> {
        if task_id.trim().is_empty() {
            return Err(StreamError::Validation("task id must not be empty".into()));
        }
        if session.is_expired_at(Utc::now()) {
            return Err(StreamError::Validation("auth session has expired".into()));
        }
        self.config.validate()?;

        let request = StreamRequest {
            stream_id: uuid::Uuid::new_v4(),
            task_id,
            token: session.token().to_string(),
        };
        let clock = ElapsedClock::start();
        let (snapshot_tx, snapshot_rx) = watch::channel(ProgressSnapshot::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let span = info_span!("task_stream", stream_id = %request.stream_id, task_id = %request.task_id);
        let stream_id = request.stream_id;
        let task_id = request.task_id.clone();
        let task = tokio::spawn(
            stream_task(
                self.source.clone(),
                self.config.clone(),
                request,
                clock,
                snapshot_tx,
                cancel_rx,
                on_complete,
            )
            .instrument(span),
        );

        Ok(TaskStreamHandle {
            stream_id,
            task_id,
            snapshot_rx,
            cancel_tx,
            task,
        })
    }
}

/// Owner of one open task stream.
///
/// Dropping the handle tears the stream down: the connection is closed, the
/// tick stops and a completion callback that has not fired yet never will.
pub struct TaskStreamHandle {
    stream_id: uuid::Uuid,
    task_id: String,
    snapshot_rx: watch::Receiver<ProgressSnapshot>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TaskStreamHandle {
    pub fn stream_id(&self) -> uuid::Uuid {
        self.stream_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Latest published state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn status(&self) -> StreamStatus {
        self.snapshot_rx.borrow().status
    }

    /// Independent receiver for renderers that outlive a borrow of the handle.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Waits for the next published change.
    ///
    /// Returns `None` once the stream task has exited and every change has
    /// been observed.
    pub async fn changed(&mut self) -> Option<ProgressSnapshot> {
        self.snapshot_rx.changed().await.ok()?;
        Some(self.snapshot_rx.borrow_and_update().clone())
    }

    /// Waits until the stream is terminal (or torn down) and returns the last
    /// published state.
    pub async fn wait_finished(&mut self) -> ProgressSnapshot {
        let finished = self
            .snapshot_rx
            .wait_for(|snapshot| snapshot.is_finished())
            .await
            .map(|snapshot| snapshot.clone());
        finished.unwrap_or_else(|_| self.snapshot_rx.borrow().clone())
    }

    /// Tears the stream down. Safe to call repeatedly.
    pub fn close(&self) {
        self.cancel_tx.send_replace(true);
    }
}

impl Drop for TaskStreamHandle {
    fn drop(&mut self) {
        self.cancel_tx.send_replace(true);
        self.task.abort();
    }
}

async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    // a dropped sender means the handle is gone, which is a cancel too
    let _ = cancel_rx.wait_for(|cancel| *cancel).await;
}

async fn stream_task(
    source: Arc<dyn EventSource>,
    config: ClientConfig,
    request: StreamRequest,
    clock: ElapsedClock,
    snapshot_tx: watch::Sender<ProgressSnapshot>,
    mut cancel_rx: watch::Receiver<bool>,
    on_complete: Option<CompletionCallback>,
) {
    let mut decoder = StreamDecoder::with_clock(clock);

    // the clock runs from open, so the ticker must not wait for the connection
    let mut ticker = tokio::time::interval_at(
        Instant::now() + config.tick_period,
        config.tick_period,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let connect = source.connect(&request);
    tokio::pin!(connect);
    let connected = loop {
        tokio::select! {
            _ = cancelled(&mut cancel_rx) => {
                debug!("stream closed before connecting");
                return;
            }
            _ = ticker.tick() => {
                if decoder.tick(Instant::now()) {
                    snapshot_tx.send_replace(decoder.snapshot());
                }
            }
            connected = &mut connect => break connected,
        }
    };

    let terminal = match connected {
        Err(err) => {
            warn!(error = %err, "task stream connection failed");
            decoder.connection_lost(Utc::now(), Instant::now());
            snapshot_tx.send_replace(decoder.snapshot());
            StreamStatus::Failed
        }
        Ok(mut frames) => {
            info!("task stream connected");
            loop {
                tokio::select! {
                    _ = cancelled(&mut cancel_rx) => {
                        debug!(status = %decoder.status(), "task stream closed by owner");
                        return;
                    }
                    _ = ticker.tick() => {
                        if decoder.tick(Instant::now()) {
                            snapshot_tx.send_replace(decoder.snapshot());
                        }
                    }
                    next = frames.next() => {
                        match next {
                            Some(Ok(frame)) => {
                                let applied = decoder.handle_frame(
                                    frame.tag(),
                                    &frame.data,
                                    Utc::now(),
                                    Instant::now(),
                                );
                                match applied {
                                    Ok(Applied::Ignored) => {}
                                    Ok(Applied::Line { status_changed }) => {
                                        debug!(event = frame.tag(), status_changed, "task stream event");
                                        snapshot_tx.send_replace(decoder.snapshot());
                                    }
                                    Ok(Applied::Terminal(status)) => {
                                        debug!(event = frame.tag(), %status, "task stream terminal event");
                                        snapshot_tx.send_replace(decoder.snapshot());
                                        break status;
                                    }
                                    Err(err) => {
                                        warn!(error = %err, "skipping malformed event payload");
                                    }
                                }
                            }
                            Some(Err(err)) => {
                                warn!(error = %err, "task stream connection lost");
                                decoder.connection_lost(Utc::now(), Instant::now());
                                snapshot_tx.send_replace(decoder.snapshot());
                                break StreamStatus::Failed;
                            }
                            None => {
                                warn!("task stream ended before a terminal event");
                                decoder.connection_lost(Utc::now(), Instant::now());
                                snapshot_tx.send_replace(decoder.snapshot());
                                break StreamStatus::Failed;
                            }
                        }
                    }
                }
            }
            // `frames` drops here and closes the connection
        }
    };

    info!(status = %terminal, elapsed_secs = decoder.elapsed_secs(), lines = decoder.lines().len(), "task stream finished");

    let Some(on_complete) = on_complete else {
        return;
    };
    let grace = match terminal {
        StreamStatus::Done => config.completion_grace,
        _ => config.failure_grace,
    };
    tokio::select! {
        _ = cancelled(&mut cancel_rx) => {
            debug!("stream closed before completion callback");
        }
        _ = tokio::time::sleep(grace) => {
            on_complete();
        }
    }
}
