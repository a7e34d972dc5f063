//! # vbaextract
//!
//! Extract VBA macro module source from Office 97-2003 documents.
//!
//! The caller unpacks a document's VBA storage (a compound-file directory)
//! to disk. This crate parses the storage's `_VBA_PROJECT` stream to find the
//! macro modules and their source offsets, then decompresses each module's
//! source so it can be handed to a scanner.
//!
//! All input is treated as hostile: every read is bounds checked, every
//! failure is reported as a [`VbaError`] with nothing partially returned,
//! and decompressed output is capped.
//!
//! ## Features
//!
//! - Project header recognition for Office 97 through 2003 and MacOffice 98/2001
//! - Module table parsing with the historical filler-block heuristics
//! - Sliding-window module source decompression with history and size checks
//!
//! ## Example
//!
//! ```no_run
//! use vbaextract::VbaExtractor;
//!
//! fn main() -> anyhow::Result<()> {
//!     let extractor = VbaExtractor::new();
//!     let project = extractor.read_project("storage/VBA".as_ref())?;
//!
//!     println!("{}: {} modules", project.version, project.len());
//!     for (module, source) in extractor.extract_all(&project) {
//!         match source {
//!             Ok(bytes) => println!("{:?}: {} bytes", module.name(), bytes.len()),
//!             Err(e) => eprintln!("{:?}: {}", module.name(), e),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod vba;

pub use cli::Cli;
pub use error::{ErrorKind, Result, VbaError};
pub use io::StreamReader;
pub use vba::{
    ExtractOptions, ModuleEntry, ProjectDescriptor, VbaExtractor, VersionEntry, extract_module,
    read_project,
};
