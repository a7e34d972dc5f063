use std::fmt;
use std::path::{Path, PathBuf};

/// Project metadata stream magic.
pub const PROJECT_MAGIC: [u8; 2] = [0xCC, 0x61];

/// Name of the project metadata member inside a VBA storage.
pub const PROJECT_STREAM: &str = "_VBA_PROJECT";

/// Filler block that may follow a reference record.
pub const MIDDLE_PROBE: [u8; 20] = [
    0x00, 0x00, 0xE1, 0x2E, 0x45, 0x0D, 0x8F, 0xE0, 0x1A, 0x10, 0x85, 0x2E, 0x02, 0x60, 0x8C, 0x4D,
    0x0B, 0xB4, 0x00, 0x00,
];

/// Filler block that may follow the reference section.
pub const END_PROBE: [u8; 20] = [
    0x00, 0x00, 0x2E, 0xC9, 0x27, 0x8E, 0x64, 0x12, 0x1C, 0x10, 0x8A, 0x2F, 0x04, 0x02, 0x24, 0x00,
    0x9C, 0x02, 0x00, 0x00,
];

/// When found after the type record table, the project carries no module table.
pub const STOP_PATTERN: [u8; 8] = [0x06, 0x02, 0x01, 0x00, 0x08, 0x02, 0x00, 0x00];

/// Platform that produced the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Mac,
}

/// One known project header signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionEntry {
    pub signature: [u8; 4],
    pub name: &'static str,
    pub vba_version: u8,
    pub platform: Platform,
}

impl VersionEntry {
    const fn new(signature: [u8; 4], name: &'static str, vba_version: u8, platform: Platform) -> Self {
        Self {
            signature,
            name,
            vba_version,
            platform,
        }
    }

    /// Find the entry whose signature matches exactly.
    pub fn lookup(signature: &[u8; 4]) -> Option<&'static VersionEntry> {
        VBA_VERSIONS.iter().find(|v| v.signature == *signature)
    }

    pub fn is_mac(&self) -> bool {
        self.platform == Platform::Mac
    }
}

impl fmt::Display for VersionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (VBA {})", self.name, self.vba_version)
    }
}

pub static VBA_VERSIONS: [VersionEntry; 10] = [
    VersionEntry::new([0x5E, 0x00, 0x00, 0x01], "Office 97", 5, Platform::Windows),
    VersionEntry::new([0x5F, 0x00, 0x00, 0x01], "Office 97 SR1", 5, Platform::Windows),
    VersionEntry::new([0x65, 0x00, 0x00, 0x01], "Office 2000 alpha?", 6, Platform::Windows),
    VersionEntry::new([0x6B, 0x00, 0x00, 0x01], "Office 2000 beta?", 6, Platform::Windows),
    VersionEntry::new([0x6D, 0x00, 0x00, 0x01], "Office 2000", 6, Platform::Windows),
    VersionEntry::new([0x70, 0x00, 0x00, 0x01], "Office XP beta 1/2", 6, Platform::Windows),
    VersionEntry::new([0x73, 0x00, 0x00, 0x01], "Office XP", 6, Platform::Windows),
    VersionEntry::new([0x79, 0x00, 0x00, 0x01], "Office 2003", 6, Platform::Windows),
    VersionEntry::new([0x60, 0x00, 0x00, 0x0E], "MacOffice 98", 5, Platform::Mac),
    VersionEntry::new([0x62, 0x00, 0x00, 0x0E], "MacOffice 2001", 5, Platform::Mac),
];

/// Fixed-layout fields that follow the version signature.
///
/// Most of these have no known meaning; they are kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectHeader {
    /// Expected to be 0x00FF, not enforced.
    pub sentinel: u16,
    pub lid_a: u32,
    pub lid_b: u32,
    pub charset: u16,
    pub len_a: u16,
    pub unknown_b: u32,
    pub unknown_c: u32,
    pub len_b: u16,
    pub len_c: u16,
    pub len_d: u16,
}

/// Outcome of the reference record section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceScan {
    /// Records consumed as `*\G` or `*\C` references.
    pub records: usize,
    /// Seeded from [`ProjectHeader::len_c`], bumped once per completed `*\C` pair.
    pub expected_records: u32,
    /// A `*\C` record was seen whose partner has not arrived yet.
    pub pending_pair: bool,
}

/// One macro module listed in the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    /// Position in the module table.
    pub index: usize,
    /// Display-oriented transliteration of the stored name. `None` when the
    /// stored name decodes to nothing.
    pub name: Option<String>,
    /// Offset of the compressed source inside the module's stream.
    pub offset: u32,
}

impl ModuleEntry {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Everything the parser learned from a project metadata stream.
#[derive(Debug, Clone)]
pub struct ParsedProject {
    pub version: &'static VersionEntry,
    pub header: ProjectHeader,
    pub references: ReferenceScan,
    pub modules: Vec<ModuleEntry>,
}

/// A parsed project bound to the storage directory it came from.
#[derive(Debug, Clone)]
pub struct ProjectDescriptor {
    dir: PathBuf,
    pub version: &'static VersionEntry,
    pub header: ProjectHeader,
    pub references: ReferenceScan,
    modules: Vec<ModuleEntry>,
}

impl ProjectDescriptor {
    pub fn new(dir: impl Into<PathBuf>, parsed: ParsedProject) -> Self {
        Self {
            dir: dir.into(),
            version: parsed.version,
            header: parsed.header,
            references: parsed.references,
            modules: parsed.modules,
        }
    }

    /// Storage directory holding the project and module streams.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModuleEntry> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl<'a> IntoIterator for &'a ProjectDescriptor {
    type Item = &'a ModuleEntry;
    type IntoIter = std::slice::Iter<'a, ModuleEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.iter()
    }
}
