// Incremental decoder for OpenAI-style server-sent events.

use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A piece of generated text
    Delta(String),
    /// `data: [DONE]`
    Done,
}

/// Buffers raw bytes until whole lines are available, so events split across
/// network chunks (or UTF-8 sequences split mid-character) decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest).into_iter().collect()
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim();

    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    if data.is_empty() {
        return None;
    }

    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            warn!("Skipping malformed stream event: {}", e);
            return None;
        }
    };

    parsed["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| SseEvent::Delta(s.to_string()))
}
