use std::collections::BTreeMap;

use tracing::warn;

/// Outcome of admitting a frame to the reorderer.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    /// Frames released in sequence order (possibly empty while a gap is open).
    Released(Vec<T>),
    /// The sequence number was already released or buffered.
    Stale { sequence: u64, expected: u64 },
}

/// Restores per-direction sequence order for frames that may arrive out of
/// order at the transport level.
///
/// Frames ahead of the expected sequence number are held back until the gap
/// fills. When more than `window` frames are held, the gap is assumed lost and
/// release resumes from the lowest held sequence number.
#[derive(Debug)]
pub struct SequenceReorderer<T> {
    next_expected: Option<u64>,
    pending: BTreeMap<u64, T>,
    window: usize,
    skipped: u64,
}

impl<T> SequenceReorderer<T> {
    pub fn new(window: usize) -> Self {
        Self {
            next_expected: None,
            pending: BTreeMap::new(),
            window: window.max(1),
            skipped: 0,
        }
    }

    /// Sets the first sequence number that will be released. Without this the
    /// first admitted frame defines it.
    pub fn expect_next(&mut self, sequence: u64) {
        if self.next_expected.is_none() {
            self.next_expected = Some(sequence);
        }
    }

    pub fn next_expected(&self) -> Option<u64> {
        self.next_expected
    }

    /// Number of frames currently held back.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Total number of sequence numbers given up on after window overflow.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn push(&mut self, sequence: u64, item: T) -> Admission<T> {
        let expected = *self.next_expected.get_or_insert(sequence);

        if sequence < expected || self.pending.contains_key(&sequence) {
            return Admission::Stale { sequence, expected };
        }

        self.pending.insert(sequence, item);
        let mut released = self.release_contiguous();

        while self.pending.len() > self.window {
            let Some(&lowest) = self.pending.keys().next() else {
                break;
            };
            let current = self.next_expected.unwrap_or(lowest);
            let gap = lowest.saturating_sub(current);
            warn!(
                expected = current,
                resume_at = lowest,
                gap,
                "Reorder window exceeded, skipping missing frames"
            );
            self.skipped += gap;
            self.next_expected = Some(lowest);
            released.extend(self.release_contiguous());
        }

        Admission::Released(released)
    }

    /// Releases everything still held, in sequence order, ignoring gaps.
    pub fn drain(&mut self) -> Vec<T> {
        let drained = std::mem::take(&mut self.pending);
        if let Some(&last) = drained.keys().next_back() {
            self.next_expected = Some(last + 1);
        }
        drained.into_values().collect()
    }

    fn release_contiguous(&mut self) -> Vec<T> {
        let mut released = Vec::new();
        while let Some(expected) = self.next_expected {
            match self.pending.remove(&expected) {
                Some(item) => {
                    released.push(item);
                    self.next_expected = Some(expected + 1);
                }
                None => break,
            }
        }
        released
    }
}
