//! Parser for the `_VBA_PROJECT` metadata stream of Office 97-2003 documents.
//!
//! The layout is undocumented and differs between Office releases. Parsing
//! proceeds through four stages:
//!
//! 1. **Header**: magic, version signature and a run of fixed fields.
//! 2. **References**: variable-length `*\G` / `*\C` records, each possibly
//!    followed by a known 20-byte filler block.
//! 3. **Trailer**: an optional filler block, a type record table and a
//!    sequence of sentinel-delimited skips.
//! 4. **Module table**: one entry per macro module with its name and the
//!    offset of its compressed source.
//!
//! The filler probes are heuristics rather than validated checkpoints: when a
//! block does not match, the position is restored and parsing resynchronizes
//! on whatever follows. Structurally divergent documents can therefore fail
//! to parse even though they are well formed.

use std::io::{Read, Seek};

use tracing::{debug, trace};

use crate::error::{Result, VbaError};
use crate::io::StreamReader;

use super::structures::*;

/// Sentinel meaning "no skip follows".
const NO_SKIP: u16 = 0xFFFF;

/// Reference records shorter than this end the record section.
const MIN_RECORD_LEN: i16 = 6;

/// Trailing bytes after a `*\G` record and after the second record of a `*\C` pair.
const REFERENCE_TRAILER_LEN: usize = 12;

/// Reference record type, from the prefix of its decoded name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    /// `*\G`: registered type library.
    Registered,
    /// `*\C`: control reference, stored as a pair of records.
    Control,
    Other,
}

impl RecordKind {
    // TODO: check whether `*\H` (like `*\G`) and `*\D` (like `*\C`) records exist
    fn classify(name: Option<&str>) -> Self {
        match name {
            Some(n) if n.starts_with("*\\G") => RecordKind::Registered,
            Some(n) if n.starts_with("*\\C") => RecordKind::Control,
            _ => RecordKind::Other,
        }
    }
}

/// Transliterate a stored name for display.
///
/// Names are stored with a two-byte stride; only the even-indexed bytes are
/// looked at. Printable ASCII is copied, a control byte below 10 becomes
/// `_<digit>_` and any other non-printable byte becomes `_`. This is lossy on
/// purpose: it is what module stream names are matched against on disk.
///
/// Returns `None` for an empty name or one whose first byte is NUL.
pub fn decode_padded_name(raw: &[u8]) -> Option<String> {
    match raw.first() {
        None | Some(0) => return None,
        Some(_) => {}
    }

    let mut name = String::with_capacity(raw.len());
    for &b in raw.iter().step_by(2) {
        if (0x20..=0x7E).contains(&b) {
            name.push(char::from(b));
        } else {
            if b < 10 {
                name.push('_');
                name.push(char::from(b'0' + b));
            }
            name.push('_');
        }
    }
    Some(name)
}

/// State machine over a project metadata stream.
pub struct ProjectParser<R> {
    reader: StreamReader<R>,
}

impl<R: Read + Seek> ProjectParser<R> {
    pub fn new(reader: StreamReader<R>) -> Self {
        Self { reader }
    }

    /// Run all stages. Any failure discards everything parsed so far.
    pub fn parse(mut self) -> Result<ParsedProject> {
        let (version, header) = self.read_header()?;
        let references = self.scan_references(header.len_c)?;
        self.skip_trailer()?;
        let modules = self.read_module_table()?;

        debug!(
            end_offset = self.reader.position(),
            modules = modules.len(),
            "project parsed"
        );

        Ok(ParsedProject {
            version,
            header,
            references,
            modules,
        })
    }

    fn read_header(&mut self) -> Result<(&'static VersionEntry, ProjectHeader)> {
        let magic = self.reader.read_array::<2>()?;
        if magic != PROJECT_MAGIC {
            return Err(VbaError::BadMagic { found: magic });
        }

        let signature = self.reader.read_array::<4>()?;
        let version =
            VersionEntry::lookup(&signature).ok_or(VbaError::UnknownFormat { signature })?;
        debug!(project = version.name, vba_version = version.vba_version, "VBA project");

        let header = ProjectHeader {
            sentinel: self.reader.read_u16()?,
            lid_a: self.reader.read_u32()?,
            lid_b: self.reader.read_u32()?,
            charset: self.reader.read_u16()?,
            len_a: self.reader.read_u16()?,
            unknown_b: self.reader.read_u32()?,
            unknown_c: self.reader.read_u32()?,
            len_b: self.reader.read_u16()?,
            len_c: self.reader.read_u16()?,
            len_d: self.reader.read_u16()?,
        };
        debug!(?header, "project header");

        Ok((version, header))
    }

    /// Consume reference records until a short length or an unknown record type.
    fn scan_references(&mut self, seed: u16) -> Result<ReferenceScan> {
        let mut scan = ReferenceScan {
            expected_records: u32::from(seed),
            ..ReferenceScan::default()
        };

        loop {
            // Signed on disk: a length with the top bit set also ends the section.
            let length = self.reader.read_i16()?;
            if length < MIN_RECORD_LEN {
                self.reader.rewind(2)?;
                break;
            }

            let raw = self.reader.read_bytes(length as usize)?;
            let name = decode_padded_name(&raw);
            debug!(record = scan.records, length, name = ?name, "reference record");

            match RecordKind::classify(name.as_deref()) {
                RecordKind::Registered => {
                    self.reader.read_array::<REFERENCE_TRAILER_LEN>()?;
                }
                RecordKind::Control if scan.pending_pair => {
                    self.reader.read_array::<REFERENCE_TRAILER_LEN>()?;
                    scan.expected_records += 1;
                    scan.pending_pair = false;
                }
                RecordKind::Control => scan.pending_pair = true,
                RecordKind::Other => {
                    self.reader.rewind(length as u64 + 2)?;
                    break;
                }
            }
            scan.records += 1;

            if self.reader.probe(&MIDDLE_PROBE)? {
                trace!(offset = self.reader.position(), "skipped middle filler");
            }
        }

        Ok(scan)
    }

    fn skip_trailer(&mut self) -> Result<()> {
        if self.reader.probe(&END_PROBE)? {
            trace!(offset = self.reader.position(), "skipped end filler");
        }

        let type_records = self.reader.read_u16()?;
        debug!(type_records, "type record table");
        self.reader.skip(2 * u64::from(type_records))?;
        self.reader.skip(4)?;

        let octet_offset = self.reader.position();
        if self.reader.read_array::<8>()? == STOP_PATTERN {
            return Err(VbaError::NoModuleTable {
                offset: octet_offset,
            });
        }

        while self.reader.read_u16()? != NO_SKIP {}

        for _ in 0..2 {
            let n = self.reader.read_u16()?;
            if n != NO_SKIP {
                self.reader.skip(u64::from(n))?;
            }
        }
        self.reader.skip(100)
    }

    fn read_module_table(&mut self) -> Result<Vec<ModuleEntry>> {
        let count = usize::from(self.reader.read_u16()?);
        debug!(count, "module table");

        let mut modules = Vec::new();
        modules
            .try_reserve_exact(count)
            .map_err(VbaError::allocation(count * std::mem::size_of::<ModuleEntry>()))?;

        for index in 0..count {
            modules.push(self.read_module(index)?);
        }
        Ok(modules)
    }

    fn read_module(&mut self, index: usize) -> Result<ModuleEntry> {
        let name_len = self.reader.read_u16()?;
        let raw = self.reader.read_bytes(usize::from(name_len))?;
        let name = decode_padded_name(&raw);

        // second copy of the name, unused
        let other_len = self.reader.read_u16()?;
        self.reader.skip(u64::from(other_len))?;

        let sentinel = self.reader.read_u16()?;
        if sentinel == NO_SKIP {
            self.reader.skip(2)?;
            let n = self.reader.read_u16()?;
            self.reader.skip(u64::from(n))?;
        } else {
            self.reader.skip(2 + u64::from(sentinel))?;
        }

        self.reader.skip(8)?;
        let blocks = self.reader.read_u8()?;
        self.reader.skip(8 * u64::from(blocks))?;
        self.reader.skip(6)?;

        let offset = self.reader.read_u32()?;
        self.reader.skip(2)?;

        debug!(index, name = ?name, offset, "module");
        Ok(ModuleEntry {
            index,
            name,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    fn padded(name: &str) -> Vec<u8> {
        name.bytes().flat_map(|b| [b, 0]).collect()
    }

    fn record(name: &str) -> Vec<u8> {
        let body = padded(name);
        let mut v = (body.len() as i16).to_le_bytes().to_vec();
        v.extend_from_slice(&body);
        v
    }

    fn parser(data: Vec<u8>) -> ProjectParser<Cursor<Vec<u8>>> {
        ProjectParser::new(StreamReader::new(Cursor::new(data)).unwrap())
    }

    /// Reference records followed by a terminator and enough padding that
    /// the filler probes never run out of input.
    fn references(records: &[Vec<u8>]) -> Vec<u8> {
        let mut v: Vec<u8> = records.concat();
        v.extend_from_slice(&[0u8; 32]);
        v
    }

    fn control_pair_tail() -> Vec<u8> {
        let mut v = record("*\\C{pair}");
        v.extend_from_slice(&[0xAB; 12]);
        v
    }

    #[test]
    fn decode_printable_name() {
        assert_eq!(decode_padded_name(&padded("Module1")).as_deref(), Some("Module1"));
    }

    #[test]
    fn decode_marks_control_bytes() {
        let raw = [b'A', 0, 0x03, 0, 0x1F, 0, 0xC8, 0, b'z', 0];
        assert_eq!(decode_padded_name(&raw).as_deref(), Some("A_3___z"));
    }

    #[test]
    fn decode_empty_or_nul_led_is_none() {
        assert_eq!(decode_padded_name(&[]), None);
        assert_eq!(decode_padded_name(&[0, 0, b'A', 0]), None);
    }

    #[test]
    fn decode_odd_length_reads_last_byte() {
        assert_eq!(decode_padded_name(b"A\0B").as_deref(), Some("AB"));
    }

    #[test]
    fn single_control_record_leaves_pair_pending() {
        let data = references(&[record("*\\C{one}")]);
        let mut p = parser(data);
        let scan = p.scan_references(7).unwrap();
        assert!(scan.pending_pair);
        assert_eq!(scan.expected_records, 7);
        assert_eq!(scan.records, 1);
    }

    #[test]
    fn control_pair_counts_once() {
        let data = references(&[record("*\\C{one}"), control_pair_tail()]);
        let mut p = parser(data);
        let scan = p.scan_references(7).unwrap();
        assert!(!scan.pending_pair);
        assert_eq!(scan.expected_records, 8);
        assert_eq!(scan.records, 2);
    }

    #[test]
    fn three_control_records_are_pair_plus_pending() {
        let data = references(&[record("*\\C{one}"), control_pair_tail(), record("*\\C{three}")]);
        let mut p = parser(data);
        let scan = p.scan_references(0).unwrap();
        assert!(scan.pending_pair);
        assert_eq!(scan.expected_records, 1);
        assert_eq!(scan.records, 3);
    }

    #[test]
    fn registered_record_skips_trailer_and_filler() {
        let mut g = record("*\\G{lib}");
        g.extend_from_slice(&[0x11; 12]);
        g.extend_from_slice(&MIDDLE_PROBE);
        let data = references(&[g.clone()]);
        let mut p = parser(data);
        let scan = p.scan_references(0).unwrap();
        assert_eq!(scan.records, 1);
        assert_eq!(p.reader.position(), g.len() as u64);
    }

    #[test]
    fn unknown_record_is_unread() {
        let g = {
            let mut g = record("*\\G{lib}");
            g.extend_from_slice(&[0x11; 12]);
            g
        };
        let data = references(&[g.clone(), record("Module1")]);
        let mut p = parser(data);
        let scan = p.scan_references(0).unwrap();
        assert_eq!(scan.records, 1);
        assert_eq!(p.reader.position(), g.len() as u64);
    }

    #[test]
    fn negative_length_ends_section() {
        let mut data = 0x8001u16.to_le_bytes().to_vec();
        data.extend_from_slice(&[0u8; 8]);
        let mut p = parser(data);
        let scan = p.scan_references(0).unwrap();
        assert_eq!(scan.records, 0);
        assert_eq!(p.reader.position(), 0);
    }

    #[test]
    fn truncated_registered_trailer_fails() {
        let mut data = record("*\\G{lib}");
        data.extend_from_slice(&[0x11; 5]);
        let err = parser(data).scan_references(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn bad_magic_is_unknown_format() {
        let err = parser(vec![0xD0, 0xCF, 0, 0, 0, 0]).parse().unwrap_err();
        assert!(matches!(err, VbaError::BadMagic { .. }));
        assert_eq!(err.kind(), ErrorKind::UnknownFormat);
    }

    #[test]
    fn unknown_signature_is_rejected() {
        let mut data = PROJECT_MAGIC.to_vec();
        data.extend_from_slice(&[0x99, 0x00, 0x00, 0x01]);
        data.extend_from_slice(&[0u8; 64]);
        match parser(data).parse() {
            Err(VbaError::UnknownFormat { signature }) => {
                assert_eq!(signature, [0x99, 0x00, 0x00, 0x01]);
            }
            other => panic!("expected UnknownFormat, got {:?}", other),
        }
    }

    #[test]
    fn stop_pattern_means_no_modules() {
        // type record count 1, its two bytes, four unknown bytes, then the pattern
        let mut data = 1u16.to_le_bytes().to_vec();
        data.extend_from_slice(&[0u8; 2 + 4]);
        data.extend_from_slice(&STOP_PATTERN);
        data.extend_from_slice(&[0u8; 16]);
        let err = parser(data).skip_trailer().unwrap_err();
        match err {
            VbaError::NoModuleTable { offset } => assert_eq!(offset, 8),
            other => panic!("expected NoModuleTable, got {:?}", other),
        }
    }

    #[test]
    fn trailer_honours_optional_skips() {
        let mut data = 0u16.to_le_bytes().to_vec();
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&[1u8; 8]);
        data.extend_from_slice(&[0x12, 0x34, 0xFF, 0xFF]);
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&[0u8; 3]);
        data.extend_from_slice(&[0xFF, 0xFF]);
        let before_fixed = data.len() as u64;
        data.extend_from_slice(&[0u8; 120]);

        let mut p = parser(data);
        p.skip_trailer().unwrap();
        assert_eq!(p.reader.position(), before_fixed + 100);
    }

    #[test]
    fn module_entry_layout() {
        let mut data = 1u16.to_le_bytes().to_vec();
        let name = padded("Module1");
        data.extend_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(&name);
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&NO_SKIP.to_le_bytes());
        data.extend_from_slice(&[0u8; 2]);
        data.extend_from_slice(&5u16.to_le_bytes());
        data.extend_from_slice(&[0u8; 5]);
        data.extend_from_slice(&[0u8; 8]);
        data.push(2);
        data.extend_from_slice(&[0u8; 16 + 6]);
        data.extend_from_slice(&0x0000_1234u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 2]);

        let modules = parser(data).read_module_table().unwrap();
        assert_eq!(
            modules,
            vec![ModuleEntry {
                index: 0,
                name: Some("Module1".to_string()),
                offset: 0x1234,
            }]
        );
    }

    #[test]
    fn truncated_module_table_returns_nothing() {
        let mut data = 2u16.to_le_bytes().to_vec();
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&[b'M', 0]);
        let err = parser(data).read_module_table().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
