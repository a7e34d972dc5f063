//! VBA project parsing and module source extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: version table, fixed byte patterns and the project/module types
//! - [`parser`]: state machine over the `_VBA_PROJECT` metadata stream
//! - [`decompress`]: the sliding-window decompressor for module source
//! - [`extractor`]: high-level API tying a storage directory to the two above
//!
//! ## Storage layout
//!
//! The caller unpacks the document's VBA storage to a directory. It holds:
//! 1. `_VBA_PROJECT`, the project metadata parsed here
//! 2. one stream per module, named after the module, with the compressed
//!    source at the offset recorded in the module table
//!
//! ## Limitations
//!
//! - Only the Office 97-2003 (VBA 5/6) layouts in [`VBA_VERSIONS`] are recognized
//! - Macro code is returned as raw bytes; it is never interpreted

mod decompress;
mod extractor;
mod parser;
mod structures;

pub use decompress::{DEFAULT_MAX_OUTPUT, Decompressor, WINDOW_SIZE, decompress_slice};
pub use extractor::{ExtractOptions, VbaExtractor, extract_module, read_project};
pub use parser::{ProjectParser, decode_padded_name};
pub use structures::*;
