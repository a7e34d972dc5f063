use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, VbaError};
use crate::io::{StreamReader, open_member};

use super::decompress::{DEFAULT_MAX_OUTPUT, Decompressor};
use super::parser::ProjectParser;
use super::structures::{ModuleEntry, PROJECT_STREAM, ProjectDescriptor};

/// Limits and names used while extracting a project.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Largest decompressed size accepted for a single module.
    pub max_output_size: usize,
    /// Name of the project metadata member inside the storage directory.
    pub project_stream: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_output_size: DEFAULT_MAX_OUTPUT,
            project_stream: PROJECT_STREAM.to_string(),
        }
    }
}

impl ExtractOptions {
    pub fn max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = bytes;
        self
    }

    pub fn project_stream(mut self, name: impl Into<String>) -> Self {
        self.project_stream = name.into();
        self
    }
}

/// Reads VBA projects from unpacked compound-file storages.
///
/// Every call opens its own stream handles, so one extractor can be shared
/// between threads.
#[derive(Debug, Clone, Default)]
pub struct VbaExtractor {
    options: ExtractOptions,
}

impl VbaExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Parse the project metadata stream in `dir`.
    pub fn read_project(&self, dir: &Path) -> Result<ProjectDescriptor> {
        debug!(dir = %dir.display(), "reading VBA project");
        let reader = open_member(dir, &self.options.project_stream)?;
        let parsed = ProjectParser::new(reader).parse()?;
        Ok(ProjectDescriptor::new(dir, parsed))
    }

    /// Decompress one module's source.
    pub fn extract_to_memory(
        &self,
        project: &ProjectDescriptor,
        entry: &ModuleEntry,
    ) -> Result<Vec<u8>> {
        let name = entry.name().ok_or(VbaError::UnnamedModule { index: entry.index })?;
        let mut reader = open_member(project.dir(), name)?;
        self.decompressor().decompress(&mut reader, entry.offset)
    }

    /// Decompress module source from an already opened stream.
    pub fn extract_from<R: std::io::Read + std::io::Seek>(
        &self,
        reader: R,
        entry: &ModuleEntry,
    ) -> Result<Vec<u8>> {
        let mut reader = StreamReader::new(reader)?;
        self.decompressor().decompress(&mut reader, entry.offset)
    }

    /// Decompress every module in table order.
    pub fn extract_all<'a>(
        &'a self,
        project: &'a ProjectDescriptor,
    ) -> impl Iterator<Item = (&'a ModuleEntry, Result<Vec<u8>>)> + 'a {
        project
            .iter()
            .map(move |entry| (entry, self.extract_to_memory(project, entry)))
    }

    /// Path of the stream holding `entry`'s source, if it has a name.
    pub fn module_path(&self, project: &ProjectDescriptor, entry: &ModuleEntry) -> Option<PathBuf> {
        entry.name().map(|name| project.dir().join(name))
    }

    fn decompressor(&self) -> Decompressor {
        Decompressor::new(self.options.max_output_size)
    }
}

/// Parse the project in `dir` with default options.
pub fn read_project(dir: impl AsRef<Path>) -> Result<ProjectDescriptor> {
    VbaExtractor::new().read_project(dir.as_ref())
}

/// Decompress one module of `project` with default options.
pub fn extract_module(project: &ProjectDescriptor, entry: &ModuleEntry) -> Result<Vec<u8>> {
    VbaExtractor::new().extract_to_memory(project, entry)
}
