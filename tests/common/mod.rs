//! Builders for synthetic `_VBA_PROJECT` streams and module source streams.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use vbaextract::vba::{END_PROBE, MIDDLE_PROBE, PROJECT_MAGIC, PROJECT_STREAM, STOP_PATTERN, WINDOW_SIZE};

pub const OFFICE_2000: [u8; 4] = [0x6D, 0x00, 0x00, 0x01];

/// Name bytes with the two-byte stride the format uses.
pub fn padded(name: &str) -> Vec<u8> {
    name.bytes().flat_map(|b| [b, 0]).collect()
}

fn reference(name: &str) -> Vec<u8> {
    let body = padded(name);
    let mut v = (body.len() as u16).to_le_bytes().to_vec();
    v.extend_from_slice(&body);
    v
}

pub struct ProjectBuilder {
    signature: [u8; 4],
    references: Vec<u8>,
    end_filler: bool,
    stop: bool,
    modules: Vec<Vec<u8>>,
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self {
            signature: OFFICE_2000,
            references: Vec::new(),
            end_filler: false,
            stop: false,
            modules: Vec::new(),
        }
    }

    pub fn signature(mut self, signature: [u8; 4]) -> Self {
        self.signature = signature;
        self
    }

    /// A `*\G` record with its 12-byte trailer.
    pub fn registered(mut self, name: &str) -> Self {
        self.references.extend(reference(&format!("*\\G{}", name)));
        self.references.extend_from_slice(&[0x5A; 12]);
        self
    }

    /// Two `*\C` records, the second with its 12-byte trailer.
    pub fn control_pair(mut self, name: &str) -> Self {
        self.references.extend(reference(&format!("*\\C{}", name)));
        self.references.extend(reference(&format!("*\\C{}", name)));
        self.references.extend_from_slice(&[0x5A; 12]);
        self
    }

    pub fn middle_filler(mut self) -> Self {
        self.references.extend_from_slice(&MIDDLE_PROBE);
        self
    }

    pub fn end_filler(mut self) -> Self {
        self.end_filler = true;
        self
    }

    pub fn stop_pattern(mut self) -> Self {
        self.stop = true;
        self
    }

    /// Module table entry with the given raw (already padded) name bytes.
    pub fn raw_module(mut self, name: &[u8], offset: u32) -> Self {
        let mut m = Vec::new();
        m.extend_from_slice(&(name.len() as u16).to_le_bytes());
        m.extend_from_slice(name);
        m.extend_from_slice(&(name.len() as u16).to_le_bytes());
        m.extend_from_slice(name);
        m.extend_from_slice(&2u16.to_le_bytes());
        m.extend_from_slice(&[0u8; 2 + 2]);
        m.extend_from_slice(&[0u8; 8]);
        m.push(1);
        m.extend_from_slice(&[0x77; 8]);
        m.extend_from_slice(&[0u8; 6]);
        m.extend_from_slice(&offset.to_le_bytes());
        m.extend_from_slice(&[0u8; 2]);
        self.modules.push(m);
        self
    }

    pub fn module(self, name: &str, offset: u32) -> Self {
        let raw = padded(name);
        self.raw_module(&raw, offset)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut v = PROJECT_MAGIC.to_vec();
        v.extend_from_slice(&self.signature);
        v.extend_from_slice(&0x00FFu16.to_le_bytes());
        v.extend_from_slice(&0x0409u32.to_le_bytes());
        v.extend_from_slice(&0x0409u32.to_le_bytes());
        v.extend_from_slice(&1252u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&3u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());

        v.extend_from_slice(&self.references);
        if self.end_filler {
            v.extend_from_slice(&END_PROBE);
        }

        // type record table; a count below 6 also ends the reference section
        v.extend_from_slice(&2u16.to_le_bytes());
        v.extend_from_slice(&[0x10, 0x00, 0x20, 0x00]);
        v.extend_from_slice(&[0u8; 4]);
        if self.stop {
            v.extend_from_slice(&STOP_PATTERN);
        } else {
            v.extend_from_slice(&[0x06, 0x02, 0x01, 0x00, 0x08, 0x02, 0x00, 0x01]);
        }

        for sentinel in [0x0000u16, 0x1234, 0xFFFF] {
            v.extend_from_slice(&sentinel.to_le_bytes());
        }
        v.extend_from_slice(&4u16.to_le_bytes());
        v.extend_from_slice(&[0xEE; 4]);
        v.extend_from_slice(&0xFFFFu16.to_le_bytes());
        v.extend_from_slice(&[0u8; 100]);

        v.extend_from_slice(&(self.modules.len() as u16).to_le_bytes());
        for m in &self.modules {
            v.extend_from_slice(m);
        }
        v
    }

    /// Write the project stream into `dir`.
    pub fn write_to(&self, dir: &Path) {
        fs::write(dir.join(PROJECT_STREAM), self.build()).unwrap();
    }
}

/// Encode `data` using literals only, with chunk markers where the decoder expects them.
pub fn compress_literals(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    let mut clean = true;
    let mut i = 0;

    while i < data.len() {
        out.push(0x00);
        for _ in 0..8 {
            if pos != 0 && pos % WINDOW_SIZE == 0 && clean {
                out.extend_from_slice(&[0x00, 0x00]);
                clean = false;
                break;
            }
            if i == data.len() {
                break;
            }
            out.push(data[i]);
            i += 1;
            pos += 1;
            clean = true;
        }
    }
    if pos != 0 && pos % WINDOW_SIZE == 0 && clean {
        out.extend_from_slice(&[0x00, 0x00, 0x00]);
    }
    out
}

/// A module stream with `compressed` stored at `offset`.
pub fn module_stream(offset: u32, compressed: &[u8]) -> Vec<u8> {
    let mut v = vec![0xAA; offset as usize];
    v.push(0x01);
    v.extend_from_slice(&(compressed.len() as u16).to_le_bytes());
    v.extend_from_slice(compressed);
    v
}

/// Write a module stream holding `source` at `offset` into `dir/name`.
pub fn write_module(dir: &Path, name: &str, offset: u32, source: &[u8]) {
    fs::write(dir.join(name), module_stream(offset, &compress_literals(source))).unwrap();
}
