//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks; frames end at a blank line. Only the
//! `data` field matters to the engine, so each complete frame is reduced to
//! its joined data lines.

/// Buffers partial frames across chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the data payloads of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some((end, sep_len)) = find_frame_end(&self.buf) {
            let frame = self.buf.drain(..end + sep_len).collect::<Vec<_>>();
            if let Some(data) = frame_data(&frame[..end]) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a trailing frame the server closed without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let frame = std::mem::take(&mut self.buf);
        frame_data(&frame)
    }
}

/// Start and length of the first blank line, which ends a frame.
///
/// Lines end in `\r\n`, `\n` or a bare `\r`. A `\r` closing a non-empty
/// line at the very end of the buffer may be half of a split `\r\n`, so the
/// decision waits for the next chunk.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    let mut i = 0;
    while i < buf.len() {
        let term = match buf[i] {
            b'\n' => 1,
            b'\r' => match buf.get(i + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                None if i == line_start => 1,
                None => return None,
            },
            _ => {
                i += 1;
                continue;
            }
        };
        if i == line_start {
            return Some((i, term));
        }
        i += term;
        line_start = i;
    }
    None
}

/// Joined `data:` lines of one frame, or `None` if it carried no data.
fn frame_data(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut data: Option<String> = None;

    for line in text.split(['\r', '\n']) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field != "data" {
            continue;
        }
        match &mut data {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: {\"messages\":[]}\n\n");
        assert_eq!(out, vec!["{\"messages\":[]}".to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"mess").is_empty());
        assert!(decoder.push(b"ages\":[]}\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: x\n\n"), vec!["{\"messages\":[]}", "x"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();
        let (a, b) = bytes.split_at(8);
        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec!["héllo"]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: a\ndata: b\n\n");
        assert_eq!(out, vec!["a\nb"]);
    }

    #[test]
    fn test_ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b": keep-alive\n\nevent: message\nid: 7\nretry: 100\ndata: x\n\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn test_crlf_frames() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(out, vec!["one", "two"]);
    }

    #[test]
    fn test_bare_cr_frames() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: one\r\rdata: a\rdata: b\r\r");
        assert_eq!(out, vec!["one", "a\nb"]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: one\r").is_empty());
        assert_eq!(decoder.push(b"\ndata: two\r\n\r"), vec!["one\ntwo"]);
        assert_eq!(decoder.push(b"\ndata: three\n\n"), vec!["three"]);
    }

    #[test]
    fn test_data_without_space() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data:tight\n\n"), vec!["tight"]);
    }

    #[test]
    fn test_trailing_frame_flushed() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: last").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("last"));
        assert!(decoder.finish().is_none());
    }
}
