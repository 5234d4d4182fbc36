//! Server-Sent-Events decoding
//!
//! Parses the upstream SSE wire format:
//! ```text
//! event: response.output_text.delta
//! data: {"delta":"Hel"}
//!
//! data: [DONE]
//! ```
//!
//! The parser is incremental: network chunks can split an event anywhere and
//! complete events are only surfaced once their terminating blank line has
//! arrived.

use futures::stream::BoxStream;
use futures::StreamExt;
use quarry_core::UpstreamError;
use std::collections::VecDeque;

/// One decoded SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, when the upstream names its events
    pub event: Option<String>,

    /// `data:` payload; multiple data lines are joined with `\n`
    pub data: String,
}

impl SseEvent {
    /// Whether this is the `[DONE]` terminator
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE parser
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by this chunk
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        // An event ends at a blank line. CRLF upstreams produce \r\n\r\n.
        loop {
            let Some((boundary, sep_len)) = find_event_boundary(&self.buffer) else {
                break;
            };
            let raw_event: String = self.buffer.drain(..boundary + sep_len).collect();
            if let Some(event) = parse_event(&raw_event[..boundary]) {
                events.push(event);
            }
        }
        events
    }
}

fn find_event_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|i| (i, 2));
    let crlf = buffer.find("\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some((a, al)), Some((b, bl))) => {
            if b < a {
                Some((b, bl))
            } else {
                Some((a, al))
            }
        }
        (some, None) => some,
        (None, some) => some,
    }
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
        // comment lines (":") and unknown fields are ignored
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

/// Decode a reqwest response body into a stream of SSE events.
///
/// Transport errors surface as items; the stream ends when the body does.
pub fn sse_events(
    response: reqwest::Response,
) -> BoxStream<'static, Result<SseEvent, UpstreamError>> {
    let body = response.bytes_stream();
    futures::stream::unfold(
        (body, SseParser::new(), VecDeque::new()),
        |(mut body, mut parser, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (body, parser, pending)));
                }
                match body.next().await {
                    Some(Ok(bytes)) => pending.extend(parser.push(&bytes)),
                    Some(Err(e)) => {
                        let err = UpstreamError::message(format!("stream read failed: {e}"));
                        return Some((Err(err), (body, parser, pending)));
                    }
                    None => return None,
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"x\":1}");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn test_named_event() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: response.created\ndata: {}\n\n");
        assert_eq!(events[0].event.as_deref(), Some("response.created"));
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"del").is_empty());
        assert!(parser.push(b"ta\":\"Hi\"}").is_empty());
        let events = parser.push(b"\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"delta\":\"Hi\"}");
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: 1\n\ndata: 2\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 3);
        assert!(events[2].is_done());
    }

    #[test]
    fn test_crlf_delimiters() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: a\r\n\r\ndata: b\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
    }

    #[test]
    fn test_multi_line_data_joined() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn test_comment_only_block_skipped() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\n\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }
}
