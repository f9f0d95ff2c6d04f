//! The reorder buffer that keeps parallel find output in database order.
//!
//! # Slots
//!
//! A fixed arena of slots is allocated once per pass. Each slot is on exactly
//! one of two index-linked lists:
//!
//! ```text
//!  free list:      free -> s3 -> s0 -> None
//!  pending queue:  tail -> s1 -> s4 -> s2 <- head
//!                  (oldest dispatch)  (newest dispatch)
//! ```
//!
//! `acquire_next` pulls the next span from the chunk source, pops a free slot,
//! and appends it at `head`. `report` marks a slot ready and, if it is the
//! `tail`, writes out every contiguous ready slot and returns them to the
//! free list. Output therefore appears in dispatch order no matter which
//! worker finishes first.
//!
//! # Ownership
//!
//! The list links live only inside the mutex. A slot's output buffer is moved
//! out to the worker in a [`Slot`] handle and moved back on `report`, so the
//! worker owns it exclusively in between and never touches shared state
//! without the lock.
//!
//! # Dispatch order
//!
//! A worker may pull a span and then wait for a free slot. Every pull takes a
//! ticket, and slots are handed out strictly in ticket order, so a waiter that
//! wakes early can never overtake a span that was pulled before its own.

use parking_lot::{Condvar, Mutex};
use std::io::Write;
use std::marker::PhantomData;
use tracing::{debug, error, trace};

use crate::database::ChunkSource;
use crate::errors::{CodeDbError, CodeDbResult};
use crate::metrics::{PassStats, SearchMetrics};

#[derive(Debug, Default)]
struct SlotEntry {
    ready: bool,
    next: Option<usize>,
    output: String,
}

#[derive(Debug)]
struct PoolState<S, W> {
    source: S,
    exhausted: bool,
    sink: W,
    slots: Vec<SlotEntry>,
    free: Option<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    in_flight: usize,
    tickets_issued: u64,
    tickets_served: u64,
    failure: Option<CodeDbError>,
}

/// A dispatched chunk, exclusively owned by one worker until reported
#[derive(Debug)]
pub struct Slot<'a> {
    index: usize,
    input: &'a [u8],
    output: String,
}

impl<'a> Slot<'a> {
    /// The compressed span this slot was dispatched with
    pub fn input(&self) -> &'a [u8] {
        self.input
    }

    /// Formatted output for this chunk; empty when the slot is dispatched
    pub fn output_mut(&mut self) -> &mut String {
        &mut self.output
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Arena index, stable for the life of the pass
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Bounded buffer pool plus in-order flusher shared by every worker of a pass
#[derive(Debug)]
pub struct Sequencer<'a, S, W> {
    state: Mutex<PoolState<S, W>>,
    slot_freed: Condvar,
    buffer_count: usize,
    metrics: SearchMetrics,
    _spans: PhantomData<&'a [u8]>,
}

impl<'a, S, W> Sequencer<'a, S, W>
where
    S: ChunkSource<'a>,
    W: Write,
{
    pub fn new(source: S, sink: W, buffer_count: usize) -> Self {
        let buffer_count = buffer_count.max(1);

        // Thread the free list through the arena: 0 -> 1 -> ... -> n-1.
        let slots = (0..buffer_count)
            .map(|i| SlotEntry {
                next: (i + 1 < buffer_count).then_some(i + 1),
                ..SlotEntry::default()
            })
            .collect();

        debug!("Created sequencer with {} slots", buffer_count);
        Self {
            state: Mutex::new(PoolState {
                source,
                exhausted: false,
                sink,
                slots,
                free: Some(0),
                head: None,
                tail: None,
                in_flight: 0,
                tickets_issued: 0,
                tickets_served: 0,
                failure: None,
            }),
            slot_freed: Condvar::new(),
            buffer_count,
            metrics: SearchMetrics::new(),
            _spans: PhantomData,
        }
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    pub fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    /// Hands out the next chunk, blocking while every slot is in use.
    ///
    /// Returns `None` once the source is exhausted or the pass has failed;
    /// a worker seeing `None` must stop. A source error fails the pass.
    pub fn acquire_next(&self) -> Option<Slot<'a>> {
        let mut state = self.state.lock();
        if state.failure.is_some() || state.exhausted {
            return None;
        }

        let input = match state.source.next_chunk() {
            Ok(Some(input)) => input,
            Ok(None) => {
                trace!("Chunk source exhausted");
                state.exhausted = true;
                return None;
            }
            Err(e) => {
                Self::record_failure(&mut state, e);
                self.slot_freed.notify_all();
                return None;
            }
        };

        let ticket = state.tickets_issued;
        state.tickets_issued += 1;

        let mut waited = false;
        let index = loop {
            if state.failure.is_some() {
                return None;
            }
            if state.tickets_served == ticket {
                if let Some(index) = state.free {
                    break index;
                }
            }
            if !waited && state.free.is_none() {
                self.metrics.record_wait();
                waited = true;
            }
            self.slot_freed.wait(&mut state);
        };

        let state = &mut *state;
        state.tickets_served += 1;
        state.free = state.slots[index].next;

        let entry = &mut state.slots[index];
        entry.ready = false;
        entry.next = None;
        let mut output = std::mem::take(&mut entry.output);
        output.clear();

        match state.head {
            Some(head) => state.slots[head].next = Some(index),
            None => state.tail = Some(index),
        }
        state.head = Some(index);
        state.in_flight += 1;
        self.metrics.record_dispatch(state.in_flight);
        trace!("Dispatched ticket {} to slot {}", ticket, index);

        // Later tickets may be parked even though slots remain free.
        if state.tickets_issued > state.tickets_served && state.free.is_some() {
            self.slot_freed.notify_all();
        }

        Some(Slot {
            index,
            input,
            output,
        })
    }

    /// Returns a finished slot.
    ///
    /// If it is the oldest pending slot, its output and that of every
    /// contiguous ready successor is written to the sink and those slots go
    /// back on the free list. Otherwise the output stays buffered. Never
    /// blocks on other workers.
    pub fn report(&self, slot: Slot<'a>) {
        let Slot { index, output, .. } = slot;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.failure.is_some() {
            // Flushing past a failed chunk would break ordering.
            return;
        }

        state.slots[index].output = output;
        state.slots[index].ready = true;
        if state.tail != Some(index) {
            trace!("Slot {} ready, waiting on slot {:?}", index, state.tail);
            return;
        }

        let mut cursor = Some(index);
        let mut flushed = 0;
        while let Some(i) = cursor {
            let entry = &mut state.slots[i];
            if !entry.ready {
                break;
            }
            if let Err(e) = state.sink.write_all(entry.output.as_bytes()) {
                Self::record_failure(state, e.into());
                self.slot_freed.notify_all();
                return;
            }

            cursor = entry.next;
            entry.ready = false;
            entry.next = state.free;
            state.free = Some(i);
            state.in_flight -= 1;
            flushed += 1;
        }

        state.tail = cursor;
        if cursor.is_none() {
            state.head = None;
        }
        self.metrics.record_flush(flushed);
        self.slot_freed.notify_all();
    }

    /// Fails the pass: nothing more is dispatched or flushed.
    ///
    /// Only the first error is kept.
    pub fn abort(&self, err: CodeDbError) {
        let mut state = self.state.lock();
        Self::record_failure(&mut state, err);
        self.slot_freed.notify_all();
    }

    /// Ends the pass, returning the sink or the error that failed it
    pub fn finish(self) -> CodeDbResult<(W, PassStats)> {
        let mut state = self.state.into_inner();
        if let Some(err) = state.failure.take() {
            return Err(err);
        }
        debug_assert_eq!(state.in_flight, 0, "pass finished with unflushed slots");

        state.sink.flush()?;
        self.metrics.log_stats();
        Ok((state.sink, self.metrics.get_stats()))
    }

    fn record_failure(state: &mut PoolState<S, W>, err: CodeDbError) {
        if state.failure.is_none() {
            error!("Find pass failed: {}", err);
            state.failure = Some(err);
        } else {
            debug!("Ignoring secondary failure: {}", err);
        }
    }
}
