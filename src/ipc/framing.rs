//! Newline framing for the agent's stdout stream.
//!
//! Stdout arrives in arbitrary chunks. [`LineFramer`] accumulates bytes and
//! yields each complete `\n`-terminated line, keeping the unterminated tail
//! for the next chunk.
//!
//! # Wire Format
//!
//! ```text
//! {"id":1,"result":{}}\n
//! {"id":2,"result":{"rateLimits":{...}}}\n
//! ```
//!
//! Lines are yielded without the trailing `\n`. Blank lines are passed
//! through; skipping them is the caller's job.

use thiserror::Error;

/// Maximum size of a single line (1MB). The app-server replies are a few
/// hundred bytes, so anything near this is a misbehaving peer.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("line exceeds maximum of {limit} bytes")]
    TooLarge { limit: usize },
}

/// An overflowing push, together with the lines completed before the
/// offending one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOverflow {
    /// Complete lines that preceded the oversized line, in stream order.
    pub lines: Vec<String>,
    pub error: FrameError,
}

/// Splits a byte stream into lines.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_bytes: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_limit(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes,
        }
    }

    /// Append `chunk` and return every line it completes.
    ///
    /// Bytes are decoded as UTF-8 only once a line is complete, so a
    /// multi-byte character split across chunks survives intact. Invalid
    /// sequences are replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns [`FrameOverflow`] if any complete line, or the pending tail,
    /// is longer than the configured limit. The overflow still carries the
    /// lines completed before it, so the result does not depend on how the
    /// stream was chunked.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, FrameOverflow> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if end - start > self.max_line_bytes {
                return Err(self.overflow(lines));
            }
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_line_bytes {
            return Err(self.overflow(lines));
        }

        Ok(lines)
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    fn overflow(&mut self, lines: Vec<String>) -> FrameOverflow {
        self.buffer.clear();
        FrameOverflow {
            lines,
            error: FrameError::TooLarge {
                limit: self.max_line_bytes,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STREAM: &[u8] = b"{\"id\":1,\"result\":{}}\n\n  \n{\"id\":2,\"result\":{\"note\":\"\xc3\xa9t\xc3\xa9\"}}\r\nnoise\n";

    fn collect(framer: &mut LineFramer, chunks: &[&[u8]]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|chunk| framer.push(chunk).expect("Push failed"))
            .collect()
    }

    #[test]
    fn test_single_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.push(STREAM).unwrap();

        assert_eq!(
            lines,
            vec![
                "{\"id\":1,\"result\":{}}".to_string(),
                String::new(),
                "  ".to_string(),
                "{\"id\":2,\"result\":{\"note\":\"été\"}}\r".to_string(),
                "noise".to_string(),
            ]
        );
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_retains_partial_tail() {
        let mut framer = LineFramer::new();

        assert_eq!(framer.push(b"{\"id\":1,").unwrap(), Vec::<String>::new());
        assert_eq!(framer.pending(), b"{\"id\":1,");

        let lines = framer.push(b"\"result\":{}}\n{\"id\"").unwrap();
        assert_eq!(lines, vec!["{\"id\":1,\"result\":{}}".to_string()]);
        assert_eq!(framer.pending(), b"{\"id\"");
    }

    #[test]
    fn test_chunking_invariance_two_way_splits() {
        let expected = LineFramer::new().push(STREAM).unwrap();

        for split in 0..=STREAM.len() {
            let mut framer = LineFramer::new();
            let (a, b) = STREAM.split_at(split);
            assert_eq!(collect(&mut framer, &[a, b]), expected, "split at {split}");
        }
    }

    #[test]
    fn test_chunking_invariance_byte_at_a_time() {
        let expected = LineFramer::new().push(STREAM).unwrap();

        let chunks: Vec<&[u8]> = STREAM.chunks(1).collect();
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, &chunks), expected);
    }

    #[test]
    fn test_chunking_invariance_three_way_splits() {
        let expected = LineFramer::new().push(STREAM).unwrap();

        for first in 0..=STREAM.len() {
            for second in first..=STREAM.len() {
                let mut framer = LineFramer::new();
                let chunks = [&STREAM[..first], &STREAM[first..second], &STREAM[second..]];
                assert_eq!(collect(&mut framer, &chunks), expected);
            }
        }
    }

    #[test]
    fn test_rejects_oversized_pending_tail() {
        let mut framer = LineFramer::with_limit(8);

        assert!(framer.push(b"12345678").is_ok());
        assert_eq!(
            framer.push(b"9"),
            Err(FrameOverflow {
                lines: Vec::new(),
                error: FrameError::TooLarge { limit: 8 },
            })
        );
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_rejects_oversized_complete_line() {
        let mut framer = LineFramer::with_limit(4);
        let result = framer.push(b"ok\n0123456789\n");
        assert_eq!(
            result,
            Err(FrameOverflow {
                lines: vec!["ok".to_string()],
                error: FrameError::TooLarge { limit: 4 },
            })
        );
    }

    #[test]
    fn test_overflow_keeps_preceding_lines_regardless_of_chunking() {
        let stream: &[u8] = b"first\nsecond\n0123456789";

        let mut whole = LineFramer::with_limit(8);
        let overflow = whole.push(stream).expect_err("Expected overflow");
        assert_eq!(overflow.lines, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(overflow.error, FrameError::TooLarge { limit: 8 });
        assert!(whole.pending().is_empty());

        for split in 0..=stream.len() {
            let (a, b) = stream.split_at(split);
            let mut framer = LineFramer::with_limit(8);

            let mut lines = Vec::new();
            let mut error = None;
            for chunk in [a, b] {
                match framer.push(chunk) {
                    Ok(more) => lines.extend(more),
                    Err(overflow) => {
                        lines.extend(overflow.lines);
                        error = Some(overflow.error);
                        break;
                    }
                }
            }

            assert_eq!(lines, overflow.lines, "split at {split}");
            assert_eq!(error, Some(overflow.error.clone()), "split at {split}");
        }
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let mut framer = LineFramer::with_limit(4);
        assert_eq!(framer.push(b"abcd\n").unwrap(), vec!["abcd".to_string()]);
    }
}
