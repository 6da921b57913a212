//! Incremental server-sent-event framing.

/// Event name applied when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One complete SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Event tag, `message` when the frame did not name one.
    pub fn tag(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT)
    }
}

/// Splits raw bytes into SSE lines and yields a frame at every blank line.
///
/// Lines end in CR, LF or CRLF, freely mixed. Only the unterminated tail of
/// the current line is buffered; finished fields are held until the frame is
/// dispatched.
#[derive(Default)]
pub struct FrameDecoder {
    line: Vec<u8>,
    // a CR ended the previous chunk; an LF opening the next one belongs to it
    after_cr: bool,
    event: Option<String>,
    data: Vec<String>,
    pending: usize,
}

impl FrameDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        let mut rest = chunk;
        if std::mem::take(&mut self.after_cr) && rest.first() == Some(&b'\n') {
            rest = &rest[1..];
            self.pending += 1;
        }

        while let Some(end) = rest.iter().position(|b| *b == b'\n' || *b == b'\r') {
            self.line.extend_from_slice(&rest[..end]);
            let mut consumed = end + 1;
            if rest[end] == b'\r' {
                match rest.get(end + 1) {
                    Some(b'\n') => consumed += 1,
                    Some(_) => {}
                    None => self.after_cr = true,
                }
            }
            self.pending += consumed;
            rest = &rest[consumed..];
            if let Some(frame) = self.finish_line() {
                frames.push(frame);
            }
        }

        self.line.extend_from_slice(rest);
        self.pending += rest.len();
        frames
    }

    /// Bytes received since the last blank line.
    pub fn pending_len(&self) -> usize {
        self.pending
    }

    fn finish_line(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            self.pending = 0;
            return self.dispatch();
        }
        let line = String::from_utf8_lossy(&line);
        // comments double as keep-alives
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };
        match field {
            "event" => self.event = Some(value.trim().to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` matter only for reconnecting, which never happens here
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take().filter(|name| !name.is_empty());
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
