//! Byte-oriented run-length encoding for chunk voxel and light buffers.
//!
//! Each run is a length field followed by the repeated byte. Runs of up to
//! 128 bytes use a one-byte length (`len - 1`, high bit clear); longer runs
//! (up to 32 768) use a two-byte big-endian length `(len - 1) | 0x8000`.
//! Terrain buffers are dominated by long runs of air and stone, so a full
//! 128 KiB chunk buffer typically shrinks to a few hundred bytes.

/// Longest run encodable with a one-byte length field.
const SHORT_RUN: usize = 0x80;

/// Longest run encodable at all.
const MAX_RUN: usize = 0x8000;

/// Marks a two-byte length field.
const LONG_FLAG: u16 = 0x8000;

/// Errors that can occur during decoding.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The stream ends inside a run header.
    #[error("run truncated at byte {offset}")]
    Truncated {
        /// Offset of the incomplete run.
        offset: usize,
    },
    /// Decoded length does not match the expected length.
    #[error("decoded length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Expected number of bytes.
        expected: usize,
        /// Number of bytes the stream decodes to (or would, at the point it overflowed).
        actual: usize,
    },
}

/// Encodes `src` into a run-length stream. An empty input produces an empty output.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() / 16 + 8);
    let mut i = 0;
    while i < src.len() {
        let value = src[i];
        let mut len = 1;
        while i + len < src.len() && src[i + len] == value && len < MAX_RUN {
            len += 1;
        }
        write_run(&mut out, len, value);
        i += len;
    }
    out
}

fn write_run(out: &mut Vec<u8>, len: usize, value: u8) {
    debug_assert!((1..=MAX_RUN).contains(&len));
    let field = (len - 1) as u16;
    if len <= SHORT_RUN {
        out.push(field as u8);
    } else {
        out.extend_from_slice(&(field | LONG_FLAG).to_be_bytes());
    }
    out.push(value);
}

/// Decodes a run-length stream that must expand to exactly `expected_len` bytes.
///
/// Never panics on malformed input; a stream that would overflow
/// `expected_len` is rejected before the excess is allocated.
pub fn decode(src: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(expected_len);
    let mut pos = 0;
    while pos < src.len() {
        let head = src[pos];
        let (len, header) = if head & 0x80 == 0 {
            (head as usize + 1, 1)
        } else {
            let low = *src
                .get(pos + 1)
                .ok_or(CodecError::Truncated { offset: pos })?;
            let field = u16::from_be_bytes([head, low]) & !LONG_FLAG;
            (field as usize + 1, 2)
        };
        let value = *src
            .get(pos + header)
            .ok_or(CodecError::Truncated { offset: pos })?;

        let end = out.len() + len;
        if end > expected_len {
            return Err(CodecError::LengthMismatch {
                expected: expected_len,
                actual: end,
            });
        }
        out.resize(end, value);
        pos += header + 1;
    }
    if out.len() != expected_len {
        return Err(CodecError::LengthMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
