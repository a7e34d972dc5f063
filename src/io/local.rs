use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::StreamReader;
use crate::error::{Result, VbaError};

/// Reader over a compound-file member that has been unpacked to disk.
pub type MemberReader = StreamReader<BufReader<File>>;

/// Open the member `name` inside the storage directory `dir` read-only.
///
/// Member names come from untrusted project metadata, so anything that is
/// not a plain file name is refused before touching the filesystem.
pub fn open_member(dir: &Path, name: &str) -> Result<MemberReader> {
    if !is_plain_name(name) {
        return Err(VbaError::corrupt(
            0,
            format!("member name {:?} is not a plain file name", name),
        ));
    }
    let path = dir.join(name);
    let file = File::open(&path).map_err(|source| VbaError::Open { path, source })?;
    StreamReader::new(BufReader::new(file))
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
