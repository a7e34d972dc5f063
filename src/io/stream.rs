use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{Result, VbaError};

/// A saved stream position, restored with [`StreamReader::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(u64);

/// Sequential, seekable reader with "read exactly N or fail" semantics.
///
/// All multi-byte integers are little-endian on disk and are returned in
/// host order. The current offset is tracked locally so that error values
/// can report it without another seek.
pub struct StreamReader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read + Seek> StreamReader<R> {
    /// Wrap a reader, starting from its current position.
    pub fn new(mut inner: R) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self { inner, pos })
    }

    /// Current byte offset from the start of the stream.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Seek to an absolute offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.pos = self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Move forward `n` bytes. Skipping past the end is allowed; the next read fails.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let target = self
            .pos
            .checked_add(n)
            .ok_or_else(|| VbaError::corrupt(self.pos, "skip overflows stream offset"))?;
        self.move_to(target)
    }

    /// Move back `n` bytes, un-reading data that was just consumed.
    pub fn rewind(&mut self, n: u64) -> Result<()> {
        let target = self
            .pos
            .checked_sub(n)
            .ok_or_else(|| VbaError::corrupt(self.pos, "rewind before start of stream"))?;
        self.move_to(target)
    }

    /// Relative move to `target`, so a buffered reader keeps its buffer
    /// when the target is inside it.
    fn move_to(&mut self, target: u64) -> Result<()> {
        let delta = match (i64::try_from(target), i64::try_from(self.pos)) {
            (Ok(t), Ok(p)) => t - p,
            _ => return Err(VbaError::corrupt(self.pos, "seek beyond addressable offset")),
        };
        self.inner.seek_relative(delta)?;
        self.pos = target;
        Ok(())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.pos)
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        self.move_to(checkpoint.0)
    }

    /// Read exactly `n` bytes into a freshly allocated buffer.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(n).map_err(VbaError::allocation(n))?;
        buf.resize(n, 0);
        let res = self.inner.read_exact(&mut buf);
        self.finish(res, n)?;
        Ok(buf)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        let res = self.inner.read_exact(&mut buf);
        self.finish(res, N)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let res = self.inner.read_u8();
        self.finish(res, 1)
    }

    /// Read one byte, returning `None` at a clean end of stream.
    pub fn read_u8_or_eof(&mut self) -> Result<Option<u8>> {
        match self.read_u8() {
            Ok(b) => Ok(Some(b)),
            Err(VbaError::ShortRead { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let res = self.inner.read_u16::<LittleEndian>();
        self.finish(res, 2)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let res = self.inner.read_i16::<LittleEndian>();
        self.finish(res, 2)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let res = self.inner.read_u32::<LittleEndian>();
        self.finish(res, 4)
    }

    /// Try to match a fixed pattern at the current position.
    ///
    /// On a match the pattern is consumed. On a mismatch the position is
    /// restored to where it was before the probe. If fewer than `N` bytes
    /// remain, the remainder is consumed and `false` is returned; the next
    /// read will then report the short stream.
    pub fn probe<const N: usize>(&mut self, pattern: &[u8; N]) -> Result<bool> {
        let mark = self.checkpoint();
        let mut buf = [0u8; N];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => {
                self.pos += N as u64;
                if buf == *pattern {
                    return Ok(true);
                }
                self.restore(mark)?;
                Ok(false)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.pos = self.inner.seek(SeekFrom::End(0))?;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn finish<T>(&mut self, res: io::Result<T>, needed: usize) -> Result<T> {
        match res {
            Ok(v) => {
                self.pos += needed as u64;
                Ok(v)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                let offset = self.pos;
                // read_exact leaves the position unspecified on a short read
                self.pos = self.inner.seek(SeekFrom::End(0))?;
                Err(VbaError::ShortRead { offset, needed })
            }
            Err(e) => Err(e.into()),
        }
    }
}
