//! Wire framing for the streaming protocol
//!
//! Every logical message travels as `~m~<byte length>~m~<payload>`. Several
//! frames can share one WebSocket text message, and one frame payload can hold
//! several JSON documents back to back. [`decode`] extracts JSON documents
//! directly from the raw text, [`split_frames`] parses the envelope strictly.

use serde::de::IgnoredAny;

use crate::error::FrameError;

/// Delimits the length prefix on both sides
pub const FRAME_MARKER: &str = "~m~";

/// Payload prefix of keep-alive frames (`~h~<n>`)
pub const HEARTBEAT_PREFIX: &str = "~h~";

/// Wrap a payload in the wire envelope. The length is the UTF-8 byte length.
pub fn encode(payload: &str) -> String {
    let len = payload.len().to_string();
    let mut out = String::with_capacity(payload.len() + len.len() + 2 * FRAME_MARKER.len());
    out.push_str(FRAME_MARKER);
    out.push_str(&len);
    out.push_str(FRAME_MARKER);
    out.push_str(payload);
    out
}

/// Extract every complete JSON object or array from `wire`, left to right.
///
/// Length prefixes are ignored and garbage between documents is skipped. A
/// span that turns out not to be JSON still yields the complete documents
/// nested inside it, and a bracket that never closes does not hide the
/// documents after it. Only a document cut off at the end of the text is
/// dropped; the rest of it usually arrives with the next message.
///
/// Runs in a single pass: every byte is scanned once by a small JSON
/// recognizer and each emitted span is validated once more by serde_json.
pub fn decode(wire: &str) -> Vec<&str> {
    let mut scanner = Scanner::default();
    scanner.scan(wire.as_bytes());

    scanner
        .spans
        .into_iter()
        .map(|(start, end)| &wire[start..end])
        .filter(|candidate| serde_json::from_str::<IgnoredAny>(candidate).is_ok())
        .collect()
}

/// What the innermost open container accepts next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    KeyOrEnd,
    Key,
    Colon,
    ValueOrEnd,
    Value,
    CommaOrEnd,
}

struct Open {
    closer: u8,
    start: usize,
    expect: Expect,
    /// `spans.len()` when this container opened; a valid close replaces
    /// every nested span recorded since
    nested_from: usize,
}

#[derive(Default)]
struct Scanner {
    stack: Vec<Open>,
    /// Containers below this depth already hold a syntax error
    poisoned: usize,
    spans: Vec<(usize, usize)>,
}

impl Scanner {
    fn scan(&mut self, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if self.stack.is_empty() {
                if b == b'{' || b == b'[' {
                    self.open(b, i);
                }
                i += 1;
                continue;
            }

            match b {
                b'"' => match string_end(bytes, i) {
                    Some(end) => {
                        self.string();
                        i = end;
                        continue;
                    }
                    // unterminated string: everything still open is the tail
                    None => return,
                },
                b'{' | b'[' => {
                    self.value();
                    self.open(b, i);
                }
                b'}' | b']' => self.close(b, i),
                b',' => self.comma(),
                b':' => self.colon(),
                b' ' | b'\t' | b'\n' | b'\r' => {}
                _ if is_token_byte(b) => {
                    let end = token_end(bytes, i);
                    self.scalar(&bytes[i..end]);
                    i = end;
                    continue;
                }
                _ => self.fail(),
            }
            i += 1;
        }
    }

    fn open(&mut self, opener: u8, at: usize) {
        let (closer, expect) = if opener == b'{' {
            (b'}', Expect::KeyOrEnd)
        } else {
            (b']', Expect::ValueOrEnd)
        };
        self.stack.push(Open {
            closer,
            start: at,
            expect,
            nested_from: self.spans.len(),
        });
    }

    fn close(&mut self, closer: u8, at: usize) {
        let Some(top) = self.stack.last() else {
            return;
        };
        if top.closer != closer {
            // nothing open can close cleanly any more; start over, keeping
            // the documents already found inside
            self.stack.clear();
            self.poisoned = 0;
            return;
        }
        if !matches!(
            top.expect,
            Expect::KeyOrEnd | Expect::ValueOrEnd | Expect::CommaOrEnd
        ) {
            self.fail();
        }

        let Some(open) = self.stack.pop() else {
            return;
        };
        let depth = self.stack.len();
        if depth >= self.poisoned {
            self.spans.truncate(open.nested_from);
            self.spans.push((open.start, at + 1));
        } else {
            self.poisoned = depth;
        }
    }

    fn string(&mut self) {
        let next = match self.expect() {
            Some(Expect::KeyOrEnd | Expect::Key) => Expect::Colon,
            Some(Expect::ValueOrEnd | Expect::Value) => Expect::CommaOrEnd,
            _ => return self.fail(),
        };
        self.set_expect(next);
    }

    fn scalar(&mut self, token: &[u8]) {
        if !is_literal(token) && !is_number(token) {
            return self.fail();
        }
        self.value();
    }

    /// A value starts in the innermost container
    fn value(&mut self) {
        match self.expect() {
            Some(Expect::ValueOrEnd | Expect::Value) => self.set_expect(Expect::CommaOrEnd),
            _ => self.fail(),
        }
    }

    fn comma(&mut self) {
        match self.stack.last() {
            Some(top) if top.expect == Expect::CommaOrEnd => {
                let next = if top.closer == b'}' {
                    Expect::Key
                } else {
                    Expect::Value
                };
                self.set_expect(next);
            }
            _ => self.fail(),
        }
    }

    fn colon(&mut self) {
        match self.expect() {
            Some(Expect::Colon) => self.set_expect(Expect::Value),
            _ => self.fail(),
        }
    }

    fn expect(&self) -> Option<Expect> {
        self.stack.last().map(|top| top.expect)
    }

    fn set_expect(&mut self, expect: Expect) {
        if let Some(top) = self.stack.last_mut() {
            top.expect = expect;
        }
    }

    /// Every container open right now can no longer be a document
    fn fail(&mut self) {
        self.poisoned = self.stack.len();
    }
}

/// Offset just past the closing quote of the string opening at `start`
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            return Some(i + 1);
        }
    }
    None
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')
}

fn token_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| !is_token_byte(b))
        .map_or(bytes.len(), |len| start + len)
}

fn is_literal(token: &[u8]) -> bool {
    matches!(token, b"true" | b"false" | b"null")
}

fn is_number(token: &[u8]) -> bool {
    let digits = |from: usize| {
        token[from..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(token.len(), |len| from + len)
    };

    let mut i = usize::from(token.first() == Some(&b'-'));
    match token.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => i = digits(i),
        _ => return false,
    }
    if token.get(i) == Some(&b'.') {
        let end = digits(i + 1);
        if end == i + 1 {
            return false;
        }
        i = end;
    }
    if matches!(token.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(token.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let end = digits(i);
        if end == i {
            return false;
        }
        i = end;
    }
    i == token.len()
}

/// One length-prefixed unit of the wire stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub payload: &'a str,
}

impl<'a> Frame<'a> {
    pub fn is_heartbeat(&self) -> bool {
        self.payload.starts_with(HEARTBEAT_PREFIX)
    }
}

/// Strictly split `wire` into frames.
///
/// Iteration stops after the first malformed frame; the error carries the
/// byte offset where the damage starts.
pub fn split_frames(wire: &str) -> Frames<'_> {
    Frames {
        wire,
        offset: 0,
        done: false,
    }
}

pub struct Frames<'a> {
    wire: &'a str,
    offset: usize,
    done: bool,
}

impl<'a> Frames<'a> {
    fn malformed(&mut self, reason: impl Into<String>) -> Option<Result<Frame<'a>, FrameError>> {
        self.done = true;
        Some(Err(FrameError::MalformedFrame {
            offset: self.offset,
            reason: reason.into(),
        }))
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<Frame<'a>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.wire.len() {
            return None;
        }

        let rest = &self.wire[self.offset..];
        let Some(after_marker) = rest.strip_prefix(FRAME_MARKER) else {
            return self.malformed("missing frame marker");
        };
        let Some(len_end) = after_marker.find(FRAME_MARKER) else {
            return self.malformed("unterminated length prefix");
        };

        let digits = &after_marker[..len_end];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return self.malformed(format!("non-numeric length prefix: {:?}", digits));
        }
        let Ok(len) = digits.parse::<usize>() else {
            return self.malformed(format!("length prefix out of range: {}", digits));
        };

        let start = FRAME_MARKER.len() + len_end + FRAME_MARKER.len();
        let end = start + len;
        let Some(payload) = rest.get(start..end) else {
            return self.malformed(format!(
                "declared length {} does not match payload ({} bytes available)",
                len,
                rest.len() - start
            ));
        };

        self.offset += end;
        Some(Ok(Frame { payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESCALE: &str = r#"{"m":"timescale_update","p":["cs_abc123",{"sds_1":{"s":[{"i":0,"v":[1700000000,100.0,105.0,99.5,103.2,15000.0]}]}}]}"#;

    #[test]
    fn test_encode_prefixes_byte_length() {
        assert_eq!(encode(r#"{"m":"x"}"#), r#"~m~9~m~{"m":"x"}"#);
        // "é" is two bytes in UTF-8
        assert_eq!(encode(r#"["é"]"#), r#"~m~6~m~["é"]"#);
        assert_eq!(encode(""), "~m~0~m~");
    }

    #[test]
    fn test_decode_encoded_payload_round_trips() {
        for payload in [TIMESCALE, r#"{"m":"qsd","p":["qs_x",{"n":"NASDAQ:NVDA","s":"ok","v":{"description":"NVIDIA \"Corp\" \\ ünïcode"}}]}"#, "[]", "[1,[2,[3]]]"] {
            let wire = encode(payload);
            assert_eq!(decode(&wire), vec![payload]);
        }
    }

    #[test]
    fn test_decode_back_to_back_documents() {
        let wire = format!(r#"{}{{"m":"series_completed","p":["cs_abc123","sds_1","streaming","s1"]}}"#, TIMESCALE);
        let fragments = decode(&wire);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], TIMESCALE);
        assert!(fragments[1].starts_with(r#"{"m":"series_completed""#));
        for fragment in fragments {
            serde_json::from_str::<serde_json::Value>(fragment).unwrap();
        }
    }

    #[test]
    fn test_decode_multiple_frames_with_heartbeat() {
        let wire = format!(
            "{}{}{}",
            encode("~h~7"),
            encode(r#"{"m":"series_loading","p":["cs_abc123","sds_1","s1"]}"#),
            encode(TIMESCALE)
        );
        let fragments = decode(&wire);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[1], TIMESCALE);
    }

    #[test]
    fn test_decode_truncated_tail_is_dropped() {
        let cut = &TIMESCALE[..40];
        assert!(decode(&encode(cut)).is_empty());

        let cut_mid_string = r#"~m~80~m~{"m":"qsd","p":["qs_x",{"n":"NASDAQ:NV"#;
        assert!(decode(cut_mid_string).is_empty());
    }

    #[test]
    fn test_decode_keeps_complete_documents_before_truncated_tail() {
        let wire = format!("{}{}", encode(TIMESCALE), &encode(TIMESCALE)[..50]);
        assert_eq!(decode(&wire), vec![TIMESCALE]);
    }

    #[test]
    fn test_decode_brackets_inside_strings() {
        let payload = r#"{"m":"symbol_error","p":["cs_1","sds_sym_1","bad ] } [ { symbol"]}"#;
        assert_eq!(decode(&encode(payload)), vec![payload]);
    }

    #[test]
    fn test_decode_skips_invalid_balanced_span() {
        let wire = r#"{not json}{"m":"ok"}"#;
        assert_eq!(decode(wire), vec![r#"{"m":"ok"}"#]);
    }

    #[test]
    fn test_decode_recovers_after_mismatched_bracket() {
        let wire = r#"{"a":[1}{"m":"ok"}"#;
        assert_eq!(decode(wire), vec![r#"{"m":"ok"}"#]);
    }

    #[test]
    fn test_decode_unclosed_opener_keeps_later_documents() {
        let wire = r#"[1,{"m":"ok","p":[]}"#;
        assert_eq!(decode(wire), vec![r#"{"m":"ok","p":[]}"#]);

        let wire = format!(
            r#"~m~999~m~{{"m":"series_loading","p":["cs_abc123"{}"#,
            encode(TIMESCALE)
        );
        assert_eq!(decode(&wire), vec![TIMESCALE]);
    }

    #[test]
    fn test_decode_keeps_documents_nested_in_mismatched_span() {
        let wire = r#"{"a":[{"m":"one"},{"m":"two"}}{"m":"three"}"#;
        assert_eq!(
            decode(wire),
            vec![r#"{"m":"one"}"#, r#"{"m":"two"}"#, r#"{"m":"three"}"#]
        );
    }

    #[test]
    fn test_decode_keeps_documents_nested_in_invalid_span() {
        assert_eq!(decode(r#"{x{"a":1}}"#), vec![r#"{"a":1}"#]);
        // missing comma between the two elements
        assert_eq!(
            decode(r#"[{"a":1}{"b":[2]}]"#),
            vec![r#"{"a":1}"#, r#"{"b":[2]}"#]
        );
    }

    #[test]
    fn test_decode_outermost_valid_document_wins() {
        let payload = r#"{"m":"du","p":["cs_1",{"sds_1":{"s":[{"i":0,"v":[1,-2.5e3,0,true,null]}]}}]}"#;
        assert_eq!(decode(&format!("garbage{}]]", payload)), vec![payload]);
    }

    #[test]
    fn test_decode_rejects_non_json_scalars() {
        assert!(decode("[01]").is_empty());
        assert!(decode("[1.]").is_empty());
        assert!(decode("[True]").is_empty());
        assert_eq!(decode("[-0.5E+2, false]"), vec!["[-0.5E+2, false]"]);
    }

    #[test]
    fn test_decode_deep_unbalanced_input_is_linear() {
        let wire = "[".repeat(200_000);
        assert!(decode(&wire).is_empty());

        let wire = format!("{}{}", "{\"a\":".repeat(50_000), "]");
        assert!(decode(&wire).is_empty());

        let wire = format!("{}{}", "[".repeat(100_000), r#"{"m":"ok"}"#.repeat(1_000));
        assert_eq!(decode(&wire).len(), 1_000);
    }

    #[test]
    fn test_split_frames() {
        let wire = format!("{}{}", encode("~h~1"), encode(TIMESCALE));
        let frames: Vec<_> = split_frames(&wire).collect::<Result<_, _>>().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_heartbeat());
        assert_eq!(frames[0].payload, "~h~1");
        assert!(!frames[1].is_heartbeat());
        assert_eq!(frames[1].payload, TIMESCALE);
    }

    #[test]
    fn test_split_frames_non_numeric_length() {
        let wire = r#"~m~abc~m~{"m":"x"}"#;
        let mut frames = split_frames(wire);
        match frames.next() {
            Some(Err(FrameError::MalformedFrame { offset, reason })) => {
                assert_eq!(offset, 0);
                assert!(reason.contains("non-numeric"));
            }
            other => panic!("expected malformed frame, got {:?}", other),
        }
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_split_frames_length_overrun() {
        let good = encode("~h~3");
        let wire = format!(r#"{}~m~99~m~{{"m":"x"}}"#, good);
        let results: Vec<_> = split_frames(&wire).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(FrameError::MalformedFrame { offset, .. }) => assert_eq!(*offset, good.len()),
            other => panic!("expected malformed frame, got {:?}", other),
        }
    }

    #[test]
    fn test_split_frames_rejects_char_length() {
        // a declared length of 3 ends inside the two-byte "é"
        let wire = r#"~m~3~m~["é"]"#;
        assert!(matches!(
            split_frames(wire).next(),
            Some(Err(FrameError::MalformedFrame { .. }))
        ));
    }

    #[test]
    fn test_split_frames_missing_marker() {
        let wire = r#"{"session_id":"x"}"#;
        assert!(matches!(
            split_frames(wire).next(),
            Some(Err(FrameError::MalformedFrame { .. }))
        ));
    }
}
