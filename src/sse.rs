/// Incremental decoder for a server-sent-events byte stream.
///
/// The HTTP client hands us the response body in arbitrary chunks, so a single
/// `data: ...` line can be split anywhere, including inside a UTF-8 sequence.
/// The decoder buffers bytes until a full line is available and dispatches an
/// event's accumulated data on the blank line that terminates it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the response body, returning every event data
    /// payload completed by it, in wire order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            self.process_line(line, &mut events);
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            // Blank line dispatches the event; an empty data buffer is not an event
            if !self.data_lines.is_empty() {
                events.push(self.data_lines.join("\n"));
                self.data_lines.clear();
            }
        } else if line.starts_with(':') {
            // Comment, ignored
        } else if let Some(value) = line.strip_prefix("data:") {
            // One optional leading space separates field name and value
            self.data_lines
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // Other fields (event:, id:, retry:) carry nothing for this protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data: hello\n\n"), vec!["hello"]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: hel").is_empty());
        assert!(decoder.feed(b"lo\n").is_empty());
        assert_eq!(decoder.feed(b"\n"), vec!["hello"]);
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: a\n\ndata: b\n\ndata: [DONE]\n\n");
        assert_eq!(events, vec!["a", "b", "[DONE]"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data: hi\r\n\r\n"), vec!["hi"]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data: one\ndata: two\n\n"), vec!["one\ntwo"]);
    }

    #[test]
    fn test_comments_and_other_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\nevent: message\nid: 7\ndata: x\n\n");
        assert_eq!(events, vec!["x"]);
    }

    #[test]
    fn test_space_payload_preserved() {
        // A one-space fragment arrives as "data:  " (field space + payload)
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data:  \n\n"), vec![" "]);
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: é\n\n".as_bytes();
        assert!(decoder.feed(&bytes[..7]).is_empty());
        assert_eq!(decoder.feed(&bytes[7..]), vec!["é"]);
    }

    #[test]
    fn test_blank_lines_without_data() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"\n\n: ping\n\n").is_empty());
    }
}
