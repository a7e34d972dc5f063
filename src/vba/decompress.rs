//! Decompressor for VBA module source streams.
//!
//! The format is a flag-byte driven LZ variant over a 4096-byte circular
//! window. Each flag byte describes up to eight items, least significant bit
//! first:
//!
//! - bit set: a 16-bit token `distance << shift | (length - 3)`, where
//!   `shift` depends on how far into the current 4096-byte chunk the output
//!   is. Bytes are copied one at a time so a token may reference bytes it
//!   has just produced.
//! - bit clear: a literal byte, except when a full chunk has just been
//!   completed, in which case a two-byte chunk marker follows and the rest of
//!   the flag byte is ignored.
//!
//! Two checks are added on top of the historical decoder: a token may not
//! reach further back than the bytes produced so far, and total output is
//! capped. Both reject the stream as corrupt.

use std::io::{Cursor, Read, Seek};

use tracing::debug;

use crate::error::{Result, VbaError};
use crate::io::StreamReader;

pub const WINDOW_SIZE: usize = 4096;

/// Default cap on one module's decompressed size.
pub const DEFAULT_MAX_OUTPUT: usize = 64 * 1024 * 1024;

/// Bytes between a module offset and its compressed data (tag and length, unused).
const STREAM_PREFIX_LEN: u64 = 3;

/// Bits of a token that encode the copy length at a given window position.
fn length_bits(win_pos: usize) -> u32 {
    match win_pos {
        0..=0x10 => 12,
        0x11..=0x20 => 11,
        0x21..=0x40 => 10,
        0x41..=0x80 => 9,
        0x81..=0x100 => 8,
        0x101..=0x200 => 7,
        0x201..=0x400 => 6,
        0x401..=0x800 => 5,
        _ => 4,
    }
}

struct Window {
    buf: [u8; WINDOW_SIZE],
    /// Total bytes produced; the physical index is `pos % WINDOW_SIZE`.
    pos: u64,
}

impl Window {
    fn new() -> Self {
        Self {
            buf: [0u8; WINDOW_SIZE],
            pos: 0,
        }
    }

    fn index(&self) -> usize {
        (self.pos % WINDOW_SIZE as u64) as usize
    }

    fn at_chunk_boundary(&self) -> bool {
        self.pos != 0 && self.index() == 0
    }

    fn push(&mut self, b: u8) {
        let i = self.index();
        self.buf[i] = b;
        self.pos += 1;
    }

    /// Expand a back-reference token in place.
    fn copy_token(&mut self, token: u16, offset: u64) -> Result<()> {
        let shift = length_bits(self.index());
        let token = u32::from(token);
        let length = (token & ((1 << shift) - 1)) + 3;
        let distance = u64::from(token >> shift);

        if distance >= self.pos {
            return Err(VbaError::corrupt(
                offset,
                format!(
                    "back-reference distance {} exceeds {} bytes of history",
                    distance + 1,
                    self.pos
                ),
            ));
        }

        for _ in 0..length {
            let src = ((self.pos - distance - 1) % WINDOW_SIZE as u64) as usize;
            self.push(self.buf[src]);
        }
        Ok(())
    }

    /// Bytes produced since the last full chunk.
    fn partial(&self) -> &[u8] {
        &self.buf[..self.index()]
    }
}

/// Decodes one module's compressed source at a time.
#[derive(Debug, Clone, Copy)]
pub struct Decompressor {
    max_output: usize,
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT)
    }
}

impl Decompressor {
    pub fn new(max_output: usize) -> Self {
        Self { max_output }
    }

    /// Decompress the module source stored at `offset` in `reader`.
    ///
    /// Running out of input between items ends the stream normally. Running
    /// out inside a token or chunk marker is an error, and nothing decoded so
    /// far is returned.
    pub fn decompress<R: Read + Seek>(
        &self,
        reader: &mut StreamReader<R>,
        offset: u32,
    ) -> Result<Vec<u8>> {
        reader.seek_to(u64::from(offset) + STREAM_PREFIX_LEN)?;

        let mut window = Window::new();
        let mut out = Vec::new();
        let mut clean = true;

        'stream: while let Some(flag) = reader.read_u8_or_eof()? {
            for bit in 0..8 {
                if flag & (1 << bit) != 0 {
                    let at = reader.position();
                    let token = reader.read_u16()?;
                    window.copy_token(token, at)?;
                    clean = true;
                } else if window.at_chunk_boundary() && clean {
                    reader.read_u16()?;
                    self.append(&mut out, &window.buf, reader.position())?;
                    clean = false;
                    break;
                } else {
                    match reader.read_u8_or_eof()? {
                        Some(b) => window.push(b),
                        None => break 'stream,
                    }
                    clean = true;
                }

                if window.pos > self.max_output as u64 {
                    return Err(VbaError::corrupt(
                        reader.position(),
                        format!("decompressed size exceeds {} bytes", self.max_output),
                    ));
                }
            }
        }

        self.append(&mut out, window.partial(), reader.position())?;
        debug!(offset, bytes = out.len(), "module decompressed");
        Ok(out)
    }

    fn append(&self, out: &mut Vec<u8>, bytes: &[u8], offset: u64) -> Result<()> {
        if out.len() + bytes.len() > self.max_output {
            return Err(VbaError::corrupt(
                offset,
                format!("decompressed size exceeds {} bytes", self.max_output),
            ));
        }
        out.try_reserve(bytes.len())
            .map_err(VbaError::allocation(out.len() + bytes.len()))?;
        out.extend_from_slice(bytes);
        Ok(())
    }
}

/// Decompress module source held in memory.
pub fn decompress_slice(data: &[u8], offset: u32, max_output: usize) -> Result<Vec<u8>> {
    let mut reader = StreamReader::new(Cursor::new(data))?;
    Decompressor::new(max_output).decompress(&mut reader, offset)
}
