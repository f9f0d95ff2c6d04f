//! The on-disk chunk database.
//!
//! A database file is the magic `CDB1` followed by length-prefixed records,
//! each one zlib-compressed chunk of file contents:
//!
//! ```text
//! +------+-----------+-----------------+-----------+-----------------+
//! | CDB1 | len (u32) | compressed data | len (u32) | compressed data | ...
//! +------+-----------+-----------------+-----------+-----------------+
//! ```
//!
//! The file is memory-mapped once per [`Database`] handle. Chunk spans handed
//! out by a [`ChunkCursor`] borrow from that mapping, so they are free to
//! produce and stay valid for as long as the handle lives.

pub mod chunk;
pub mod codec;
pub mod writer;

pub use chunk::{ChunkFile, DbChunk};
pub use codec::{compress, decompress_into};
pub use writer::{DatabaseWriter, WriteStats};

use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::errors::{CodeDbError, CodeDbResult};

pub const MAGIC: &[u8; 4] = b"CDB1";
pub(crate) const LEN_PREFIX: usize = 4;

/// Sequential producer of compressed chunk spans.
///
/// Implementations are not expected to be thread-safe; the search pipeline
/// only ever calls `next_chunk` while holding its dispatch lock.
pub trait ChunkSource<'a> {
    /// Returns the next span, or `None` once the source is exhausted
    fn next_chunk(&mut self) -> CodeDbResult<Option<&'a [u8]>>;
}

/// A read-only, memory-mapped database file
#[derive(Debug)]
pub struct Database {
    mmap: Mmap,
    path: PathBuf,
}

impl Database {
    /// Maps the database file and validates its header
    pub fn open(path: &Path) -> CodeDbResult<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CodeDbError::database_error(format!(
                "{} does not exist, run build first",
                path.display()
            )),
            _ => CodeDbError::database_error(format!("cannot open {}: {}", path.display(), e)),
        })?;

        // The builder replaces the file by rename, never in place, so the
        // mapping cannot change underneath us.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            CodeDbError::database_error(format!("cannot map {}: {}", path.display(), e))
        })?;

        if mmap.len() < MAGIC.len() || &mmap[..MAGIC.len()] != MAGIC {
            return Err(CodeDbError::database_error(format!(
                "{} is not a codedb database",
                path.display()
            )));
        }

        debug!("Opened database {} ({} bytes)", path.display(), mmap.len());
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the mapped file in bytes
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.len() == MAGIC.len()
    }

    /// A fresh cursor positioned at the first chunk
    pub fn chunks(&self) -> ChunkCursor<'_> {
        ChunkCursor::new(&self.mmap[MAGIC.len()..])
    }
}

/// Walks the records of a database body in file order
#[derive(Debug, Clone)]
pub struct ChunkCursor<'a> {
    data: &'a [u8],
    pos: usize,
    index: usize,
}

impl<'a> ChunkCursor<'a> {
    /// Cursor over a record body (the bytes after the magic)
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            index: 0,
        }
    }
}

impl<'a> ChunkSource<'a> for ChunkCursor<'a> {
    fn next_chunk(&mut self) -> CodeDbResult<Option<&'a [u8]>> {
        let remaining = &self.data[self.pos..];
        if remaining.is_empty() {
            return Ok(None);
        }

        let prefix: [u8; LEN_PREFIX] = remaining
            .get(..LEN_PREFIX)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                CodeDbError::database_error(format!(
                    "truncated length prefix for chunk {}",
                    self.index
                ))
            })?;
        let len = u32::from_le_bytes(prefix) as usize;

        let span = remaining
            .get(LEN_PREFIX..LEN_PREFIX + len)
            .ok_or_else(|| {
                CodeDbError::database_error(format!(
                    "chunk {} claims {} bytes but only {} remain",
                    self.index,
                    len,
                    remaining.len() - LEN_PREFIX
                ))
            })?;

        trace!("Chunk {}: {} compressed bytes", self.index, len);
        self.pos += LEN_PREFIX + len;
        self.index += 1;
        Ok(Some(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn body(records: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for r in records {
            out.extend_from_slice(&(r.len() as u32).to_le_bytes());
            out.extend_from_slice(r);
        }
        out
    }

    #[test]
    fn test_cursor_walks_records_in_order() {
        let data = body(&[b"first", b"", b"third"]);
        let mut cursor = ChunkCursor::new(&data);

        assert_eq!(cursor.next_chunk().unwrap(), Some(&b"first"[..]));
        assert_eq!(cursor.next_chunk().unwrap(), Some(&b""[..]));
        assert_eq!(cursor.next_chunk().unwrap(), Some(&b"third"[..]));
        assert_eq!(cursor.next_chunk().unwrap(), None);
        assert_eq!(cursor.next_chunk().unwrap(), None);
        assert_eq!(cursor.index, 3);
    }

    #[test]
    fn test_cursor_rejects_truncation() {
        let mut data = body(&[b"whole", b"partial"]);
        data.truncate(data.len() - 3);
        let mut cursor = ChunkCursor::new(&data);
        assert!(cursor.next_chunk().unwrap().is_some());
        assert!(matches!(cursor.next_chunk(), Err(CodeDbError::Database(_))));

        let short = [1u8, 0];
        let mut cursor = ChunkCursor::new(&short);
        assert!(matches!(cursor.next_chunk(), Err(CodeDbError::Database(_))));
    }

    #[test]
    fn test_open_validates_header() {
        let dir = tempdir().unwrap();

        let missing = Database::open(&dir.path().join("db")).unwrap_err();
        assert!(missing.to_string().contains("run build first"));

        let bogus = dir.path().join("bogus");
        std::fs::write(&bogus, b"not a database").unwrap();
        assert!(matches!(Database::open(&bogus), Err(CodeDbError::Database(_))));

        let empty = dir.path().join("empty");
        std::fs::write(&empty, MAGIC).unwrap();
        let db = Database::open(&empty).unwrap();
        assert!(db.is_empty());
        assert_eq!(db.len(), MAGIC.len());
        assert_eq!(db.path(), empty.as_path());
        assert_eq!(db.chunks().next_chunk().unwrap(), None);
    }
}
