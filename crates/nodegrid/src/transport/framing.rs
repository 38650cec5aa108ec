//! Newline-delimited JSON framing.

use std::io::{self, BufRead, Read, Write};

use serde::Serialize;
use thiserror::Error;

/// Largest accepted frame, excluding the newline delimiter.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Errors surfaced while reading or writing a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// No newline appeared within the frame limit.
    #[error("frame too large: exceeds {max_size} byte limit")]
    TooLarge {
        /// Limit in bytes.
        max_size: usize,
    },
    /// The message could not be serialised.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    /// Reading or writing the stream failed.
    #[error("frame IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reads one frame, including its trailing newline if present.
///
/// Returns `Ok(None)` at a clean end of stream. A final unterminated line is
/// returned as-is.
///
/// # Errors
///
/// Returns `FrameError::TooLarge` when no newline appears within the limit,
/// and `FrameError::Io` for read failures.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError> {
    read_frame_into(reader, &mut Vec::new())
}

/// Reads one frame, appending to `pending` first.
///
/// Bytes read before an IO error stay in `pending`, so a read that timed out
/// mid-line resumes where it stopped on the next call. On success the frame
/// is moved out and `pending` is left empty.
///
/// # Errors
///
/// As for [`read_frame`]. `pending` is cleared when the frame is too large.
pub fn read_frame_into<R: BufRead>(
    reader: &mut R,
    pending: &mut Vec<u8>,
) -> Result<Option<Vec<u8>>, FrameError> {
    let remaining = (MAX_FRAME_BYTES + 1).saturating_sub(pending.len());
    let limit = u64::try_from(remaining).unwrap_or(u64::MAX);
    let read = reader.by_ref().take(limit).read_until(b'\n', pending)?;
    if read == 0 && pending.is_empty() {
        return Ok(None);
    }
    if pending.len() > MAX_FRAME_BYTES && pending.last() != Some(&b'\n') {
        pending.clear();
        return Err(FrameError::TooLarge {
            max_size: MAX_FRAME_BYTES,
        });
    }
    Ok(Some(std::mem::take(pending)))
}

/// Serialises `message` as one JSON line and flushes.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), FrameError> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn reads_successive_frames() {
        let mut reader = Cursor::new(b"{\"a\":1}\n{\"b\":2}".to_vec());

        let first = read_frame(&mut reader).expect("first frame");
        let second = read_frame(&mut reader).expect("second frame");
        let end = read_frame(&mut reader).expect("end of stream");

        assert_eq!(first.as_deref(), Some(&b"{\"a\":1}\n"[..]));
        assert_eq!(second.as_deref(), Some(&b"{\"b\":2}"[..]));
        assert_eq!(end, None);
    }

    #[test]
    fn rejects_oversized_frames() {
        let mut reader = Cursor::new(vec![b'x'; MAX_FRAME_BYTES + 16]);
        let error = read_frame(&mut reader).expect_err("oversized frame");
        assert!(matches!(error, FrameError::TooLarge { .. }));
    }

    #[test]
    fn accepts_frame_at_limit() {
        let mut bytes = vec![b'x'; MAX_FRAME_BYTES];
        bytes.push(b'\n');
        let mut reader = Cursor::new(bytes);
        let frame = read_frame(&mut reader).expect("frame at limit").expect("some frame");
        assert_eq!(frame.len(), MAX_FRAME_BYTES + 1);
    }

    struct Stalling {
        chunks: Vec<io::Result<Vec<u8>>>,
    }

    impl Read for Stalling {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0)?;
            buf.get_mut(..chunk.len())
                .expect("chunk fits the read buffer")
                .copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn partial_frames_resume_after_a_timeout() {
        let mut reader = io::BufReader::new(Stalling {
            chunks: vec![
                Ok(b"{\"a\"".to_vec()),
                Err(io::Error::new(io::ErrorKind::WouldBlock, "slow peer")),
                Ok(b":1}\n".to_vec()),
            ],
        });
        let mut pending = Vec::new();

        let error = read_frame_into(&mut reader, &mut pending).expect_err("stalled read");
        assert!(matches!(error, FrameError::Io(_)));
        assert_eq!(pending, b"{\"a\"");

        let frame = read_frame_into(&mut reader, &mut pending).expect("resumed read");
        assert_eq!(frame.as_deref(), Some(&b"{\"a\":1}\n"[..]));
        assert!(pending.is_empty());
    }

    #[test]
    fn writes_newline_terminated_json() {
        let mut output = Vec::new();
        write_frame(&mut output, &json!({"kind": "value"})).expect("write frame");
        assert_eq!(output, b"{\"kind\":\"value\"}\n");
    }
}
