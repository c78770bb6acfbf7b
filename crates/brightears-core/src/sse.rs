//! Incremental `text/event-stream` decoder.
//!
//! The decoder is fed raw byte chunks exactly as they arrive from the network
//! and yields complete [`SseFrame`]s. Output never depends on how the byte
//! stream was split into chunks.
//!
//! # Format
//!
//! ```text
//! : comment lines start with a colon
//! event: name
//! id: 42
//! data: {"type":"ping"}
//! data: continuation lines are joined with '\n'
//! <blank line dispatches the frame>
//! ```
//!
//! Lines end with `\n`, `\r\n`, or a lone `\r`. The `retry:` field is
//! ignored: reconnect timing is owned by the client's backoff policy.

use crate::error::ChatError;

/// Longest accepted line. Longer lines are a protocol violation.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, if present.
    pub event: Option<String>,
    /// Concatenated `data:` lines.
    pub data: String,
    /// Last event id seen on the stream, sent back as `Last-Event-ID` when
    /// the stream is reopened.
    pub id: Option<String>,
}

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the line being read.
    line: Vec<u8>,
    /// Previous byte was `\r`; a following `\n` belongs to the same break.
    skip_lf: bool,
    /// Pending `data:` lines, each followed by `\n`.
    data: String,
    /// Pending `event:` field.
    event: Option<String>,
    /// Last event id; persists across frames.
    last_id: Option<String>,
}

impl SseDecoder {
    /// Create a decoder at the start of a stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every frame it completes.
    ///
    /// # Errors
    ///
    /// - `ChatError::Decode` if a line grows beyond [`MAX_LINE_BYTES`]. The
    ///   offending line is discarded and the decoder stays usable.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, ChatError> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\n' => self.end_line(&mut frames),
                b'\r' => {
                    self.end_line(&mut frames);
                    self.skip_lf = true;
                },
                _ => {
                    if self.line.len() >= MAX_LINE_BYTES {
                        self.line.clear();
                        return Err(ChatError::Decode(format!(
                            "event-stream line exceeds {MAX_LINE_BYTES} bytes"
                        )));
                    }
                    self.line.push(byte);
                },
            }
        }

        Ok(frames)
    }

    fn end_line(&mut self, frames: &mut Vec<SseFrame>) {
        let line = std::mem::take(&mut self.line);

        if line.is_empty() {
            if let Some(frame) = self.dispatch() {
                frames.push(frame);
            }
            return;
        }

        let line = String::from_utf8_lossy(&line);
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            },
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            },
            _ => tracing::trace!(field, "ignoring unknown event-stream field"),
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        data.pop();

        Some(SseFrame {
            event: self.event.take(),
            data,
            id: self.last_id.clone(),
        })
    }
}
