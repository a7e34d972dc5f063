//! Error type shared by the project parser, the decompressor and the extractor.

use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`VbaError`].
///
/// Callers that only care about "why did extraction fail" match on this
/// instead of the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Open, read, short read or seek failure.
    Io,
    /// The stream is not a project this crate understands.
    UnknownFormat,
    /// Structural mismatch, invalid length or decompression bounds violation.
    CorruptStream,
    /// A buffer sized from untrusted input could not be allocated.
    Allocation,
}

#[derive(Debug, Error)]
pub enum VbaError {
    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("unexpected end of stream at offset {offset:#x} (need {needed} bytes)")]
    ShortRead { offset: u64, needed: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid project magic {found:02x?}")]
    BadMagic { found: [u8; 2] },

    #[error("unknown VBA version signature {signature:02x?}")]
    UnknownFormat { signature: [u8; 4] },

    #[error("corrupt stream at offset {offset:#x}: {reason}")]
    CorruptStream { offset: u64, reason: String },

    #[error("no module table found (stop pattern at offset {offset:#x})")]
    NoModuleTable { offset: u64 },

    #[error("module {index} has no decodable name")]
    UnnamedModule { index: usize },

    #[error("failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },
}

impl VbaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VbaError::Open { .. } | VbaError::ShortRead { .. } | VbaError::Io(_) => ErrorKind::Io,
            VbaError::BadMagic { .. } | VbaError::UnknownFormat { .. } => ErrorKind::UnknownFormat,
            VbaError::CorruptStream { .. }
            | VbaError::NoModuleTable { .. }
            | VbaError::UnnamedModule { .. } => ErrorKind::CorruptStream,
            VbaError::Allocation { .. } => ErrorKind::Allocation,
        }
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        VbaError::CorruptStream {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn allocation(bytes: usize) -> impl FnOnce(TryReserveError) -> Self {
        move |_| VbaError::Allocation { bytes }
    }
}

pub type Result<T> = std::result::Result<T, VbaError>;
