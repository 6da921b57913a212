//! Plain-text rendering of progress snapshots.

use std::fmt::Display;
use std::io::{self, Write};

use chrono::{Local, TimeZone};
use loomiq_stream::{LogLine, ProgressSnapshot, StreamStatus};

/// Prints only what is new in each snapshot: unseen lines, then the status
/// badge when the status moved.
pub struct TerminalRenderer {
    json: bool,
    printed: usize,
    last_status: Option<StreamStatus>,
}

impl TerminalRenderer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            printed: 0,
            last_status: None,
        }
    }

    pub fn header(&self, task_id: &str, out: &mut impl Write) -> io::Result<()> {
        if self.json {
            return Ok(());
        }
        writeln!(out, "── task/{} ──", short_task_id(task_id))
    }

    pub fn render(&mut self, snapshot: &ProgressSnapshot, out: &mut impl Write) -> io::Result<()> {
        for line in snapshot.lines.iter().skip(self.printed) {
            if self.json {
                let encoded = serde_json::to_string(line).map_err(io::Error::other)?;
                writeln!(out, "{encoded}")?;
            } else {
                writeln!(out, "{}", format_line(line, &Local))?;
            }
        }
        self.printed = snapshot.lines.len();

        if self.last_status != Some(snapshot.status) {
            self.write_status(snapshot, out)?;
        }
        Ok(())
    }

    /// Final status, unless `render` already showed it.
    pub fn footer(&mut self, snapshot: &ProgressSnapshot, out: &mut impl Write) -> io::Result<()> {
        if self.last_status == Some(snapshot.status) {
            return Ok(());
        }
        self.write_status(snapshot, out)
    }

    fn write_status(&mut self, snapshot: &ProgressSnapshot, out: &mut impl Write) -> io::Result<()> {
        self.last_status = Some(snapshot.status);
        if self.json {
            let status = serde_json::json!({
                "status": snapshot.status,
                "elapsed_secs": snapshot.elapsed_secs,
                "badge": snapshot.badge(),
            });
            writeln!(out, "{status}")
        } else {
            writeln!(out, "[{}]", snapshot.badge())
        }
    }
}

/// `HH:MM:SS  icon  message  ⚡120ms`
pub fn format_line<Tz>(line: &LogLine, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let time = line.timestamp.with_timezone(tz).format("%H:%M:%S");
    let mut rendered = format!("{time}  {}  {}", line.style.icon, line.message);
    if let Some(ms) = line.duration.filter(|ms| *ms > 0) {
        rendered.push_str(&format!("  ⚡{ms}ms"));
    }
    rendered
}

/// First eight characters of a task id followed by an ellipsis.
pub fn short_task_id(task_id: &str) -> String {
    let short: String = task_id.chars().take(8).collect();
    if short.len() < task_id.len() {
        format!("{short}…")
    } else {
        short
    }
}
