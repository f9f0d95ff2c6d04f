//! Ordered parallel search over a chunk database.
//!
//! # Pipeline
//!
//! ```text
//!            +--------------------- Sequencer (one lock) ---------------------+
//!            |  ChunkCursor -> ticket -> free slot -> pending queue -> sink   |
//!            +-----^----------------------------------------------|---------+
//!                  | acquire_next                          report |
//!   worker 0 ------+-- decompress -> search_chunk -> format ------+
//!   worker 1 ------+-- decompress -> search_chunk -> format ------+
//!   ...
//! ```
//!
//! Workers pull chunks in database order, decode and scan them without
//! holding any lock, and hand the formatted output back. The sequencer only
//! writes a chunk's output once every earlier chunk has been written, so the
//! result is byte-for-byte the same as a single-threaded scan.
//!
//! # Components
//!
//! - [`pool`]: the slot arena, pending queue and in-order flush
//! - [`worker`]: the per-thread acquire / scan / report loop
//! - [`matcher`]: pattern compilation and per-chunk line matching
//! - [`engine`]: thread and buffer sizing, one pass per pattern
pub mod engine;
pub mod matcher;
pub mod pool;
pub mod worker;

pub use engine::{find, run_pass, FindOptions};
pub use matcher::{search_chunk, FileFilter, PatternOptions, PatternPair};
pub use pool::{Sequencer, Slot};
pub use worker::{run_worker, ChunkScanner, PatternScanner, ScanOutcome};

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;
    use std::io::{self, Write};
    use std::sync::Arc;

    use crate::database::ChunkSource;
    use crate::errors::{CodeDbError, CodeDbResult};

    /// Serves in-memory chunks in order
    #[derive(Debug)]
    pub struct VecSource<'a> {
        chunks: &'a [Vec<u8>],
        next: usize,
    }

    impl<'a> VecSource<'a> {
        pub fn new(chunks: &'a [Vec<u8>]) -> Self {
            Self { chunks, next: 0 }
        }
    }

    impl<'a> ChunkSource<'a> for VecSource<'a> {
        fn next_chunk(&mut self) -> CodeDbResult<Option<&'a [u8]>> {
            let chunk = self.chunks.get(self.next).map(Vec::as_slice);
            self.next += 1;
            Ok(chunk)
        }
    }

    /// Serves its chunks, then reports a corrupt database instead of ending
    #[derive(Debug)]
    pub struct FailingSource<'a> {
        inner: VecSource<'a>,
    }

    impl<'a> FailingSource<'a> {
        pub fn new(chunks: &'a [Vec<u8>]) -> Self {
            Self {
                inner: VecSource::new(chunks),
            }
        }
    }

    impl<'a> ChunkSource<'a> for FailingSource<'a> {
        fn next_chunk(&mut self) -> CodeDbResult<Option<&'a [u8]>> {
            match self.inner.next_chunk()? {
                Some(chunk) => Ok(Some(chunk)),
                None => Err(CodeDbError::database_error("truncated database")),
            }
        }
    }

    /// A sink whose contents stay visible while the sequencer owns it
    #[derive(Debug, Clone, Default)]
    pub struct SharedSink {
        buf: Arc<Mutex<Vec<u8>>>,
        broken: bool,
    }

    impl SharedSink {
        pub fn broken() -> Self {
            Self {
                broken: true,
                ..Self::default()
            }
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buf.lock()).into_owned()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
            }
            self.buf.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
