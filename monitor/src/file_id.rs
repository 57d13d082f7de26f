//! Identity of an open file, used to detect rotation.
//!
//! A rotation replaces the file behind a path with a different one. The path
//! stays the same, so the tailer compares the identity of the file it holds
//! with the identity of the file currently at the path.

use std::fmt;
use std::fs::{File, Metadata};
use std::io;

/// Device and inode of a file.
///
/// On platforms without inodes the creation time stands in for the inode;
/// this is weaker but still changes when a file is recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    /// Identity of an open file handle.
    pub fn from_file(file: &File) -> io::Result<Self> {
        Ok(Self::from_metadata(&file.metadata()?))
    }

    /// Identity taken from already fetched metadata.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Identity taken from already fetched metadata.
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos() as u64);
        Self { dev: 0, ino: created }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}
