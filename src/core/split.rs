//! Split packet reassembly and segmentation.
//!
//! Fragments of one logical message share a split sequence number and may
//! arrive in any order. The assembler buffers them until every index in
//! `0..chunk_count` has been seen, then yields the concatenation once.
//!
//! The store is bounded: at most `max_pending` incomplete messages are held,
//! the oldest being evicted on overflow, and assemblies older than the
//! timeout are dropped whenever a new fragment arrives.
//!
//! A completed message's state is removed, so its split sequence number is
//! free for the next message. The completed chunks are kept until the
//! timeout: a fragment byte-identical to one of them is a retransmission and
//! is ignored, anything else under that number starts a new message.

use crate::core::packet::SplitFragment;
use crate::error::{ProtocolError, Result};
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default limit on concurrently incomplete messages.
pub const DEFAULT_MAX_PENDING: usize = 64;

/// Default lifetime of an incomplete message.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Assembly {
    chunks: Vec<Option<Bytes>>,
    received: usize,
    started_at: Instant,
}

impl Assembly {
    fn new(chunk_count: u16, now: Instant) -> Self {
        Self {
            chunks: vec![None; chunk_count as usize],
            received: 0,
            started_at: now,
        }
    }

    fn is_complete(&self) -> bool {
        self.received == self.chunks.len()
    }

    fn into_chunks(self) -> Vec<Bytes> {
        self.chunks.into_iter().flatten().collect()
    }
}

fn concat(chunks: &[Bytes]) -> Bytes {
    let total = chunks.iter().map(Bytes::len).sum();
    let mut out = BytesMut::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out.freeze()
}

/// Chunks of a message that already completed.
#[derive(Debug)]
struct Completed {
    chunks: Vec<Bytes>,
    finished_at: Instant,
}

impl Completed {
    fn is_retransmission(&self, chunk_count: u16, chunk_index: u16, data: &Bytes) -> bool {
        self.chunks.len() == chunk_count as usize
            && self.chunks.get(chunk_index as usize) == Some(data)
    }
}

/// Counters describing the assembler's current state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub pending: usize,
    pub completed: u64,
    pub evicted: u64,
    pub duplicates_ignored: u64,
}

/// Buffers split fragments keyed by their split sequence number.
#[derive(Debug)]
pub struct SplitAssembler {
    pending: HashMap<u16, Assembly>,
    /// Insertion order of `pending` keys, oldest first.
    order: VecDeque<u16>,
    completed: HashMap<u16, Completed>,
    /// Insertion order of `completed` keys, oldest first.
    completed_order: VecDeque<u16>,
    max_pending: usize,
    timeout: Duration,
    stats: AssemblerStats,
}

impl Default for SplitAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl SplitAssembler {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_MAX_PENDING, DEFAULT_TIMEOUT)
    }

    pub fn with_settings(max_pending: usize, timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            order: VecDeque::new(),
            completed: HashMap::new(),
            completed_order: VecDeque::new(),
            max_pending: max_pending.max(1),
            timeout,
            stats: AssemblerStats::default(),
        }
    }

    /// Store a fragment; returns the reassembled message when it was the last
    /// one missing.
    pub fn add_fragment(&mut self, fragment: SplitFragment) -> Option<Bytes> {
        self.add_fragment_at(fragment, Instant::now())
    }

    fn add_fragment_at(&mut self, fragment: SplitFragment, now: Instant) -> Option<Bytes> {
        self.expire(now);

        let SplitFragment {
            sequence_number,
            chunk_count,
            chunk_index,
            data,
        } = fragment;

        if chunk_count == 0 || chunk_index >= chunk_count {
            warn!(sequence_number, chunk_index, chunk_count, "Ignoring fragment outside its chunk count");
            return None;
        }

        if let Some(done) = self.completed.get(&sequence_number) {
            if done.is_retransmission(chunk_count, chunk_index, &data) {
                trace!(sequence_number, chunk_index, "Retransmitted fragment ignored");
                self.stats.duplicates_ignored += 1;
                return None;
            }
            debug!(sequence_number, "Split sequence number reused for a new message");
            self.forget_completed(sequence_number);
        }

        if let Some(existing) = self.pending.get(&sequence_number) {
            if existing.chunks.len() != chunk_count as usize {
                warn!(
                    sequence_number,
                    previous = existing.chunks.len(),
                    chunk_count,
                    "Chunk count changed mid-assembly, restarting"
                );
                self.remove_pending(sequence_number);
            }
        }

        if !self.pending.contains_key(&sequence_number) {
            if self.pending.len() >= self.max_pending {
                self.evict_oldest();
            }
            self.pending
                .insert(sequence_number, Assembly::new(chunk_count, now));
            self.order.push_back(sequence_number);
        }

        let assembly = self.pending.get_mut(&sequence_number)?;
        let slot = &mut assembly.chunks[chunk_index as usize];
        if slot.is_none() {
            assembly.received += 1;
        }
        *slot = Some(data);

        trace!(
            sequence_number,
            chunk = chunk_index + 1,
            chunk_count,
            received = assembly.received,
            "Stored split fragment"
        );

        if !assembly.is_complete() {
            return None;
        }

        let chunks = self.remove_pending(sequence_number)?.into_chunks();
        let message = concat(&chunks);
        self.remember_completed(sequence_number, chunks, now);
        self.stats.completed += 1;

        debug!(sequence_number, bytes = message.len(), "Split message reassembled");
        Some(message)
    }

    /// Number of incomplete messages currently held.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> AssemblerStats {
        AssemblerStats {
            pending: self.pending.len(),
            ..self.stats
        }
    }

    fn remove_pending(&mut self, sequence_number: u16) -> Option<Assembly> {
        self.order.retain(|seq| *seq != sequence_number);
        self.pending.remove(&sequence_number)
    }

    fn remember_completed(&mut self, sequence_number: u16, chunks: Vec<Bytes>, now: Instant) {
        self.completed.insert(
            sequence_number,
            Completed {
                chunks,
                finished_at: now,
            },
        );
        self.completed_order.push_back(sequence_number);
        while self.completed.len() > self.max_pending {
            match self.completed_order.pop_front() {
                Some(oldest) => {
                    self.completed.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn forget_completed(&mut self, sequence_number: u16) {
        self.completed_order.retain(|seq| *seq != sequence_number);
        self.completed.remove(&sequence_number);
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            if let Some(assembly) = self.pending.remove(&oldest) {
                warn!(
                    sequence_number = oldest,
                    received = assembly.received,
                    chunk_count = assembly.chunks.len(),
                    "Split store full, evicting oldest incomplete message"
                );
                self.stats.evicted += 1;
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        let timeout = self.timeout;
        let before = self.pending.len();
        self.pending
            .retain(|_, assembly| now.saturating_duration_since(assembly.started_at) < timeout);
        let expired = before - self.pending.len();
        if expired > 0 {
            let pending = &self.pending;
            self.order.retain(|seq| pending.contains_key(seq));
            self.stats.evicted += expired as u64;
            debug!(expired, "Expired stale split assemblies");
        }

        self.completed
            .retain(|_, done| now.saturating_duration_since(done.finished_at) < timeout);
        let completed = &self.completed;
        self.completed_order.retain(|seq| completed.contains_key(seq));
    }
}

/// Segment `message` (command id included) into fragments carrying at most
/// `max_chunk` bytes each.
pub fn split_payload(
    message: &Bytes,
    max_chunk: usize,
    sequence_number: u16,
) -> Result<Vec<SplitFragment>> {
    if max_chunk == 0 {
        return Err(ProtocolError::Custom(
            "split chunk size must be non-zero".to_string(),
        ));
    }
    let chunk_count = message.len().div_ceil(max_chunk).max(1);
    let chunk_count = u16::try_from(chunk_count).map_err(|_| {
        ProtocolError::Custom(format!(
            "message of {} bytes needs more than {} fragments",
            message.len(),
            u16::MAX
        ))
    })?;

    Ok((0..chunk_count)
        .map(|index| {
            let start = index as usize * max_chunk;
            let end = (start + max_chunk).min(message.len());
            SplitFragment {
                sequence_number,
                chunk_count,
                chunk_index: index,
                data: message.slice(start..end),
            }
        })
        .collect())
}
