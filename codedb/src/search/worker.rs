use std::io::Write;
use std::thread;
use tracing::trace;

use super::matcher::{search_chunk, PatternPair};
use super::pool::Sequencer;
use crate::database::{decompress_into, ChunkSource, DbChunk};
use crate::errors::{CodeDbError, CodeDbResult};
use crate::results::LineFormatter;

/// What scanning one chunk produced, for metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub decoded_bytes: usize,
    pub matches: usize,
}

/// Turns one compressed span into formatted output.
///
/// Shared by all workers of a pass; `scratch` is the calling worker's own
/// reusable decode buffer.
pub trait ChunkScanner: Sync {
    fn scan(&self, input: &[u8], scratch: &mut Vec<u8>, out: &mut String)
        -> CodeDbResult<ScanOutcome>;
}

/// Decompresses a chunk and formats every line matching a [`PatternPair`]
#[derive(Debug, Clone)]
pub struct PatternScanner {
    patterns: PatternPair,
    trim: bool,
}

impl PatternScanner {
    pub fn new(patterns: PatternPair, trim: bool) -> Self {
        Self { patterns, trim }
    }
}

impl ChunkScanner for PatternScanner {
    fn scan(
        &self,
        input: &[u8],
        scratch: &mut Vec<u8>,
        out: &mut String,
    ) -> CodeDbResult<ScanOutcome> {
        decompress_into(input, scratch)?;
        let chunk = DbChunk::from_bytes(scratch.as_slice())?;

        let mut formatter = LineFormatter::new(out, self.trim);
        search_chunk(&chunk, &self.patterns, &mut formatter)?;

        Ok(ScanOutcome {
            decoded_bytes: chunk.len(),
            matches: formatter.matches(),
        })
    }
}

/// Fails the pass if the owning worker unwinds, so nobody waits forever on
/// the slot it was holding.
struct AbortOnPanic<'s, 'a, S, W>
where
    S: ChunkSource<'a>,
    W: Write,
{
    sequencer: &'s Sequencer<'a, S, W>,
}

impl<'s, 'a, S, W> Drop for AbortOnPanic<'s, 'a, S, W>
where
    S: ChunkSource<'a>,
    W: Write,
{
    fn drop(&mut self) {
        if thread::panicking() {
            self.sequencer.abort(CodeDbError::WorkerPanicked);
        }
    }
}

/// One worker: acquire, scan, report, until the sequencer runs dry.
///
/// A scan error fails the whole pass; partial output past a bad chunk is
/// never written.
pub fn run_worker<'a, S, W, C>(sequencer: &Sequencer<'a, S, W>, scanner: &C)
where
    S: ChunkSource<'a>,
    W: Write,
    C: ChunkScanner + ?Sized,
{
    let _guard = AbortOnPanic { sequencer };
    let metrics = sequencer.metrics();
    let mut scratch = Vec::new();

    while let Some(mut slot) = sequencer.acquire_next() {
        match scanner.scan(slot.input(), &mut scratch, slot.output_mut()) {
            Ok(outcome) => {
                trace!(
                    "Slot {}: {} bytes decoded, {} matches",
                    slot.index(),
                    outcome.decoded_bytes,
                    outcome.matches
                );
                metrics.record_decode(outcome.decoded_bytes as u64);
                metrics.record_matches(outcome.matches as u64);
                sequencer.report(slot);
            }
            Err(e) => {
                sequencer.abort(e);
                return;
            }
        }
    }
}
