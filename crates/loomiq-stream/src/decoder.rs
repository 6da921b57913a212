//! Synchronous core of the task progress stream.
//!
//! `StreamDecoder` owns the log lines, the status and the elapsed clock of one
//! stream. It does no I/O: the monitor feeds it frames, ticks and connection
//! loss, and it answers with what changed.

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use crate::clock::ElapsedClock;
use crate::errors::DecodeError;
use crate::event::{EventKind, StreamEvent};
use crate::status::StreamStatus;
use crate::style::{LineStyle, clean_message, style_for};

/// Message of the line appended when the connection drops.
pub const CONNECTION_LOST_MESSAGE: &str = "Stream connection lost";

/// One rendered entry of the progress log. Never changes once appended.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct LogLine {
    /// Position in generation order, starting at 0.
    pub id: u64,
    #[serde(serialize_with = "serialize_kind")]
    pub event: EventKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub style: LineStyle,
}

fn serialize_kind<S: serde::Serializer>(kind: &EventKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_tag())
}

/// What feeding one event did to the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The stream was already terminal; nothing changed.
    Ignored,
    /// A line was appended; `status_changed` is set on `Connecting -> Running`.
    Line { status_changed: bool },
    /// A line was appended and the stream reached `Done` or `Failed`.
    Terminal(StreamStatus),
}

/// Point-in-time view of a decoder, handed to renderers.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ProgressSnapshot {
    pub lines: Vec<LogLine>,
    pub status: StreamStatus,
    pub elapsed_secs: u64,
}

impl ProgressSnapshot {
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Short status text, e.g. `Running — 42s`.
    pub fn badge(&self) -> String {
        match self.status {
            StreamStatus::Connecting => "Connecting…".to_string(),
            StreamStatus::Running => format!("Running — {}s", self.elapsed_secs),
            StreamStatus::Done => format!("Completed in {}s", self.elapsed_secs),
            StreamStatus::Failed => format!("Failed after {}s", self.elapsed_secs),
        }
    }

    /// Indeterminate progress while running: fills over a minute, capped at 95%.
    pub fn progress(&self) -> Option<f64> {
        match self.status {
            StreamStatus::Running => Some((self.elapsed_secs as f64 / 60.0).min(0.95)),
            StreamStatus::Done | StreamStatus::Failed => Some(1.0),
            StreamStatus::Connecting => None,
        }
    }
}

/// Event-stream progress decoder for a single task.
#[derive(Debug)]
pub struct StreamDecoder {
    lines: Vec<LogLine>,
    status: StreamStatus,
    clock: ElapsedClock,
    next_id: u64,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    /// Starts a decoder whose clock runs from now.
    pub fn new() -> Self {
        Self::with_clock(ElapsedClock::start())
    }

    pub fn with_clock(clock: ElapsedClock) -> Self {
        Self {
            lines: Vec::new(),
            status: StreamStatus::Connecting,
            clock,
            next_id: 0,
        }
    }

    /// Decodes and applies one raw SSE event.
    ///
    /// A malformed payload is returned as an error and leaves the decoder
    /// untouched; the caller decides how to report it.
    pub fn handle_frame(
        &mut self,
        tag: &str,
        data: &str,
        received_at: DateTime<Utc>,
        now: Instant,
    ) -> Result<Applied, DecodeError> {
        if self.status.is_terminal() {
            return Ok(Applied::Ignored);
        }
        let event = StreamEvent::decode(tag, data, received_at)?;
        Ok(self.handle_event(event, now))
    }

    /// Appends a line for `event` and applies its status effect.
    pub fn handle_event(&mut self, event: StreamEvent, now: Instant) -> Applied {
        if self.status.is_terminal() {
            debug!(event = %event.kind, status = %self.status, "event after terminal status ignored");
            return Applied::Ignored;
        }

        let style = style_for(&event.kind);
        let effect = event.kind.effect();
        self.lines.push(LogLine {
            id: self.next_id,
            message: clean_message(&event.message),
            event: event.kind,
            timestamp: event.timestamp,
            duration: event.duration,
            style,
        });
        self.next_id = self.next_id.saturating_add(1);

        let previous = self.status;
        self.status = previous.apply(effect);
        if self.status.is_terminal() {
            self.clock.freeze(now);
            return Applied::Terminal(self.status);
        }
        Applied::Line {
            status_changed: self.status != previous,
        }
    }

    /// Records a dropped connection: a synthetic `task:error` line and `Failed`.
    pub fn connection_lost(&mut self, at: DateTime<Utc>, now: Instant) -> Applied {
        self.handle_event(
            StreamEvent::synthetic(EventKind::TaskError, CONNECTION_LOST_MESSAGE, at),
            now,
        )
    }

    /// Periodic clock tick. Returns true when the elapsed value changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.clock.tick(now)
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.clock.elapsed_secs()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            lines: self.lines.clone(),
            status: self.status,
            elapsed_secs: self.clock.elapsed_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone as _;

    use super::*;
    use crate::style::{FALLBACK_STYLE, Tone};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid date")
    }

    fn feed(decoder: &mut StreamDecoder, tag: &str, data: &str) -> Applied {
        decoder
            .handle_frame(tag, data, at(), Instant::now())
            .expect("well-formed frame")
    }

    #[test]
    fn happy_path_yields_five_lines_and_done() {
        let mut decoder = StreamDecoder::new();
        feed(&mut decoder, "connected", r#"{"message":"🔌 Connected"}"#);
        let assigned = feed(&mut decoder, "task:assigned", r#"{"message":"🤖 Agent selected"}"#);
        assert_eq!(assigned, Applied::Line { status_changed: true });
        feed(&mut decoder, "step:started", r#"{"message":"▶ Step 1"}"#);
        feed(
            &mut decoder,
            "step:completed",
            r#"{"message":"✓ Step 1","duration":120}"#,
        );
        let done = feed(&mut decoder, "task:completed", r#"{"message":"🎉 Finished"}"#);

        assert_eq!(done, Applied::Terminal(StreamStatus::Done));
        assert_eq!(decoder.status(), StreamStatus::Done);
        let lines = decoder.lines();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1].message, "Agent selected");
        assert_eq!(lines[3].duration, Some(120));
        assert_eq!(lines[3].style.tone, Tone::Green);
    }

    #[test]
    fn lines_keep_receipt_order_and_sequential_ids() {
        let mut decoder = StreamDecoder::new();
        let tags = ["step:started", "connected", "step:failed", "x:y", "step:completed"];
        for (i, tag) in tags.iter().enumerate() {
            feed(&mut decoder, tag, &format!(r#"{{"message":"m{i}"}}"#));
        }
        let seen: Vec<(u64, &str, &str)> = decoder
            .lines()
            .iter()
            .map(|l| (l.id, l.event.as_tag(), l.message.as_str()))
            .collect();
        assert_eq!(
            seen,
            vec![
                (0, "step:started", "m0"),
                (1, "connected", "m1"),
                (2, "step:failed", "m2"),
                (3, "x:y", "m3"),
                (4, "step:completed", "m4"),
            ]
        );
    }

    #[test]
    fn repeated_assignment_is_a_no_op_transition() {
        let mut decoder = StreamDecoder::new();
        feed(&mut decoder, "task:assigned", r#"{"message":"a"}"#);
        let again = feed(&mut decoder, "collaboration:started", r#"{"message":"b"}"#);
        assert_eq!(again, Applied::Line { status_changed: false });
        assert_eq!(decoder.status(), StreamStatus::Running);
    }

    #[test]
    fn completed_straight_from_connecting_is_done() {
        let mut decoder = StreamDecoder::new();
        let applied = feed(&mut decoder, "task:completed", r#"{"message":"ok"}"#);
        assert_eq!(applied, Applied::Terminal(StreamStatus::Done));
    }

    #[test]
    fn failed_and_error_tags_fail_the_stream() {
        for tag in ["task:failed", "task:error"] {
            let mut decoder = StreamDecoder::new();
            feed(&mut decoder, "task:assigned", r#"{"message":"a"}"#);
            let applied = feed(&mut decoder, tag, r#"{"message":"💥 boom"}"#);
            assert_eq!(applied, Applied::Terminal(StreamStatus::Failed));
            assert_eq!(decoder.lines()[1].message, "boom");
        }
    }

    #[test]
    fn events_after_terminal_are_ignored() {
        let mut decoder = StreamDecoder::new();
        feed(&mut decoder, "task:completed", r#"{"message":"ok"}"#);
        assert_eq!(
            feed(&mut decoder, "task:failed", r#"{"message":"late"}"#),
            Applied::Ignored
        );
        assert_eq!(decoder.status(), StreamStatus::Done);
        assert_eq!(decoder.lines().len(), 1);
        assert_eq!(
            decoder.connection_lost(at(), Instant::now()),
            Applied::Ignored
        );
    }

    #[test]
    fn unknown_event_renders_with_fallback_and_keeps_status() {
        let mut decoder = StreamDecoder::new();
        let applied = feed(&mut decoder, "some:future:event", r#"{"message":"hello"}"#);
        assert_eq!(applied, Applied::Line { status_changed: false });
        assert_eq!(decoder.status(), StreamStatus::Connecting);
        assert_eq!(decoder.lines()[0].style, FALLBACK_STYLE);
    }

    #[test]
    fn malformed_payload_is_skipped() {
        let mut decoder = StreamDecoder::new();
        let err = decoder
            .handle_frame("task:completed", "{oops", at(), Instant::now())
            .expect_err("malformed");
        assert_eq!(err.tag, "task:completed");
        assert!(decoder.lines().is_empty());
        assert_eq!(decoder.status(), StreamStatus::Connecting);

        feed(&mut decoder, "connected", r#"{"message":"still alive"}"#);
        assert_eq!(decoder.lines().len(), 1);
        assert_eq!(decoder.lines()[0].id, 0);
    }

    #[test]
    fn connection_loss_appends_synthetic_error() {
        let mut decoder = StreamDecoder::new();
        feed(&mut decoder, "task:assigned", r#"{"message":"a"}"#);
        let applied = decoder.connection_lost(at(), Instant::now());
        assert_eq!(applied, Applied::Terminal(StreamStatus::Failed));
        let last = decoder.lines().last().expect("line");
        assert_eq!(last.event, EventKind::TaskError);
        assert_eq!(last.message, CONNECTION_LOST_MESSAGE);
        assert_eq!(last.timestamp, at());
    }

    #[test]
    fn clock_freezes_on_terminal() {
        let start = Instant::now();
        let mut decoder = StreamDecoder::with_clock(ElapsedClock::start_at(start));
        assert!(decoder.tick(start + Duration::from_secs(3)));
        decoder.handle_event(
            StreamEvent::synthetic(EventKind::TaskCompleted, "ok", at()),
            start + Duration::from_secs(4),
        );
        assert_eq!(decoder.elapsed_secs(), 4);
        assert!(!decoder.tick(start + Duration::from_secs(30)));
        assert_eq!(decoder.elapsed_secs(), 4);
    }

    #[test]
    fn snapshot_badge_and_progress() {
        let mut snapshot = ProgressSnapshot::default();
        assert_eq!(snapshot.badge(), "Connecting…");
        assert_eq!(snapshot.progress(), None);

        snapshot.status = StreamStatus::Running;
        snapshot.elapsed_secs = 42;
        assert_eq!(snapshot.badge(), "Running — 42s");
        assert_eq!(snapshot.progress(), Some(0.7));

        snapshot.elapsed_secs = 600;
        assert_eq!(snapshot.progress(), Some(0.95));

        snapshot.status = StreamStatus::Failed;
        assert_eq!(snapshot.badge(), "Failed after 600s");
        assert!(snapshot.is_finished());
    }

    #[test]
    fn log_line_serializes_tag_as_string() {
        let mut decoder = StreamDecoder::new();
        feed(&mut decoder, "step:completed", r#"{"message":"x","duration":5}"#);
        let value = serde_json::to_value(&decoder.lines()[0]).expect("serialize");
        assert_eq!(value["event"], "step:completed");
        assert_eq!(value["duration"], 5);
        assert_eq!(value["style"]["tone"], "green");
    }
}
