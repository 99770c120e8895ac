use crate::error::{AppError, Result};

/// Buffer ceilings for one SSE line and one assembled event. Gemini sends a
/// whole base64 image in a single `data:` line, so both are sized in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SseLimits {
    pub max_line_bytes: usize,
    pub max_event_bytes: usize,
}

impl Default for SseLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 16 * 1024 * 1024,
            max_event_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Incremental decoder for `text/event-stream` bodies. Only `data:` fields
/// are kept; an event ends at a blank line and `[DONE]` ends the stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    limits: SseLimits,
    line: Vec<u8>,
    data: String,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SseLimits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds raw body bytes and returns the events completed by them. Fails
    /// once a line or an event outgrows its limit.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Result<Vec<String>> {
        let mut events = Vec::new();
        while !self.done && !bytes.is_empty() {
            match bytes.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.extend_line(&bytes[..pos])?;
                    bytes = &bytes[pos + 1..];
                    let line = std::mem::take(&mut self.line);
                    if let Some(event) = self.handle_line(&line)? {
                        events.push(event);
                    }
                }
                None => {
                    self.extend_line(bytes)?;
                    break;
                }
            }
        }
        Ok(events)
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Result<Option<String>> {
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            if let Some(event) = self.handle_line(&line)? {
                return Ok(Some(event));
            }
        }
        Ok(self.take_event())
    }

    fn extend_line(&mut self, bytes: &[u8]) -> Result<()> {
        if self.line.len() + bytes.len() > self.limits.max_line_bytes {
            return Err(AppError::Response(format!(
                "SSE line exceeds max_line_bytes={}",
                self.limits.max_line_bytes
            )));
        }
        self.line.extend_from_slice(bytes);
        Ok(())
    }

    fn handle_line(&mut self, raw: &[u8]) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');

        if line.is_empty() {
            return Ok(self.take_event());
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            let separator = usize::from(!self.data.is_empty());
            if self.data.len() + separator + rest.len() > self.limits.max_event_bytes {
                return Err(AppError::Response(format!(
                    "SSE event exceeds max_event_bytes={}",
                    self.limits.max_event_bytes
                )));
            }
            if separator == 1 {
                self.data.push('\n');
            }
            self.data.push_str(rest);
        }
        Ok(None)
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data);
        if data.trim() == "[DONE]" {
            self.done = true;
            return None;
        }
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_feeds() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"a\":").unwrap().is_empty());
        let events = decoder.feed(b"1}\r\n\r\ndata: {\"b\":2}\n\n").unwrap();
        assert_eq!(events, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
    }

    #[test]
    fn test_comments_and_other_fields_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed(b": keep-alive\nevent: message\ndata: x\nid: 3\n\n")
            .unwrap();
        assert_eq!(events, vec!["x".to_string()]);
    }

    #[test]
    fn test_multi_line_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: one\ndata: two\n\n").unwrap();
        assert_eq!(events, vec!["one\ntwo".to_string()]);
    }

    #[test]
    fn test_done_stops_the_stream() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed(b"data: a\n\ndata: [DONE]\n\ndata: b\n\n")
            .unwrap();
        assert_eq!(events, vec!["a".to_string()]);
        assert!(decoder.is_done());
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: tail").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), Some("tail".to_string()));
    }

    fn small_limits() -> SseLimits {
        SseLimits {
            max_line_bytes: 32,
            max_event_bytes: 48,
        }
    }

    #[test]
    fn test_unterminated_line_past_limit_fails() {
        let mut decoder = SseDecoder::with_limits(small_limits());
        assert!(decoder.feed(b"data: 0123456789").unwrap().is_empty());
        assert!(decoder.feed(b"0123456789").unwrap().is_empty());
        let err = decoder.feed(b"0123456789").unwrap_err();
        assert!(matches!(err, AppError::Response(msg) if msg.contains("max_line_bytes=32")));
    }

    #[test]
    fn test_event_without_blank_line_past_limit_fails() {
        let mut decoder = SseDecoder::with_limits(small_limits());
        for _ in 0..4 {
            assert!(decoder.feed(b"data: 0123456789\n").unwrap().is_empty());
        }
        let err = decoder.feed(b"data: 0123456789\n").unwrap_err();
        assert!(matches!(err, AppError::Response(msg) if msg.contains("max_event_bytes=48")));
    }

    #[test]
    fn test_events_within_limits_still_decode() {
        let mut decoder = SseDecoder::with_limits(small_limits());
        let events = decoder
            .feed(b"data: 0123456789\n\ndata: abcdefghij\n\n")
            .unwrap();
        assert_eq!(events, vec!["0123456789".to_string(), "abcdefghij".to_string()]);
    }

    #[test]
    fn test_default_limit_stops_a_body_without_newlines() {
        let mut decoder = SseDecoder::new();
        let mib = vec![b'A'; 1024 * 1024];
        let mut fed = 0;
        let err = loop {
            match decoder.feed(&mib) {
                Ok(events) => {
                    assert!(events.is_empty());
                    fed += mib.len();
                    assert!(fed <= 16 * 1024 * 1024);
                }
                Err(e) => break e,
            }
        };
        assert!(matches!(err, AppError::Response(_)));
        assert_eq!(fed, 16 * 1024 * 1024);
    }
}
