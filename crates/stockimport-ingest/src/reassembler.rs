//! Record reassembly across byte-range boundaries
//!
//! Byte ranges cut the resource at arbitrary points, so a record may start in
//! one chunk and end in the next. [`reassemble`] joins the unterminated tail of
//! the previous chunk (the carry) with the next chunk and splits on `\n`:
//!
//! ```text
//! carry "121017;17;20"  +  chunk "19-08-01;2\n121018;3"
//!   -> lines ["121017;17;2019-08-01;2"], carry "121018;3"
//! ```
//!
//! Everything works on raw bytes. A line is only handed out once its
//! terminator has been seen, so a multi-byte UTF-8 character split across two
//! ranges is whole again by the time the line is decoded.

/// Result of one reassembly step
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reassembled {
    /// Lines terminated inside this step, `\r\n` / `\n` stripped, in order
    pub lines: Vec<Vec<u8>>,
    /// Unterminated remainder to prepend to the next chunk
    pub carry: Vec<u8>,
}

/// Prepend `carry` to `chunk` and split the result on `\n`.
///
/// Every piece but the last is a completed line with one trailing `\r`
/// removed. The last piece, possibly empty, is the new carry. An empty chunk
/// still goes through the split and the whole carry comes back as carry.
pub fn reassemble(carry: &[u8], chunk: &[u8]) -> Reassembled {
    let mut joined = Vec::with_capacity(carry.len() + chunk.len());
    joined.extend_from_slice(carry);
    joined.extend_from_slice(chunk);

    let mut pieces: Vec<&[u8]> = joined.split(|b| *b == b'\n').collect();
    // split always yields at least one piece
    let tail = pieces.pop().unwrap_or_default().to_vec();

    let lines = pieces
        .into_iter()
        .map(|piece| piece.strip_suffix(b"\r").unwrap_or(piece).to_vec())
        .collect();

    Reassembled { lines, carry: tail }
}

/// Carry state owned by one import run.
///
/// Holds the fragment of the last chunk that has not been terminated yet.
/// Feeding chunks out of order corrupts records; the pipeline feeds them in
/// plan order from a single task.
#[derive(Debug, Default)]
pub struct CarryBuffer {
    pending: Vec<u8>,
}

impl CarryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble `chunk` against the current carry, keep the new carry and
    /// return the completed lines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let Reassembled { lines, carry } = reassemble(&self.pending, chunk);
        self.pending = carry;
        lines
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Hand out the carry at end of stream, leaving the buffer empty
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}
