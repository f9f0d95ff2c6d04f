use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::chunk::{encode_file, encoded_len};
use super::codec::compress;
use super::MAGIC;
use crate::errors::{CodeDbError, CodeDbResult};

/// Totals reported after a database has been written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub files: usize,
    pub chunks: usize,
    pub raw_bytes: u64,
    pub compressed_bytes: u64,
}

/// Packs files into chunks and writes a database file.
///
/// A chunk is closed as soon as it holds at least `chunk_size` raw bytes, so
/// one oversized file still ends up in a single chunk. Chunks are compressed
/// in parallel on `finish` but written in the order files were added.
#[derive(Debug)]
pub struct DatabaseWriter {
    chunk_size: usize,
    current: Vec<u8>,
    chunks: Vec<Vec<u8>>,
    files: usize,
}

impl DatabaseWriter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            current: Vec::new(),
            chunks: Vec::new(),
            files: 0,
        }
    }

    pub fn add_file(&mut self, path: &str, content: &str) -> CodeDbResult<()> {
        if path.is_empty() || path.contains('\0') || content.contains('\0') {
            return Err(CodeDbError::database_error(format!(
                "cannot store '{}': empty path or NUL byte",
                path
            )));
        }

        if self.current.is_empty() {
            self.current.reserve(encoded_len(path, content).max(self.chunk_size));
        }
        encode_file(&mut self.current, path, content);
        self.files += 1;

        if self.current.len() >= self.chunk_size {
            self.seal_chunk();
        }
        Ok(())
    }

    /// Ends the current chunk early; no-op when it is empty
    pub fn seal_chunk(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
    }

    /// Compresses every chunk and atomically replaces `path`
    pub fn finish(mut self, path: &Path) -> CodeDbResult<WriteStats> {
        self.seal_chunk();

        let raw_bytes = self.chunks.iter().map(|c| c.len() as u64).sum();
        debug!("Compressing {} chunks", self.chunks.len());
        let compressed: Vec<Vec<u8>> = self
            .chunks
            .par_iter()
            .map(|raw| compress(raw))
            .collect::<CodeDbResult<_>>()?;

        let tmp = path.with_extension("tmp");
        let mut out = BufWriter::new(File::create(&tmp)?);
        out.write_all(MAGIC)?;
        for chunk in &compressed {
            let len = u32::try_from(chunk.len()).map_err(|_| {
                CodeDbError::database_error("compressed chunk exceeds 4 GiB")
            })?;
            out.write_all(&len.to_le_bytes())?;
            out.write_all(chunk)?;
        }
        out.into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;
        fs::rename(&tmp, path)?;

        let stats = WriteStats {
            files: self.files,
            chunks: compressed.len(),
            raw_bytes,
            compressed_bytes: compressed.iter().map(|c| c.len() as u64).sum(),
        };
        info!(
            "Wrote {}: {} files in {} chunks ({} -> {} bytes)",
            path.display(),
            stats.files,
            stats.chunks,
            stats.raw_bytes,
            stats.compressed_bytes
        );
        Ok(stats)
    }
}
