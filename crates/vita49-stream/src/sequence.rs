use std::collections::HashMap;
use std::fmt;

/// Packet counters are 4 bits.
pub const PACKET_COUNT_MODULUS: u16 = 16;

/// VRL frame counters are 12 bits.
pub const FRAME_COUNT_MODULUS: u16 = vita49_frame::FRAME_COUNT_MODULUS;

/// A counter observed out of sequence.
///
/// Counts `expected` (inclusive) up to `observed` (exclusive) were not seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapReport {
    pub key: u64,
    pub expected: u16,
    pub observed: u16,
    pub modulus: u16,
}

impl GapReport {
    /// Number of counter values skipped.
    pub fn missing(&self) -> u16 {
        (self.observed + self.modulus - self.expected) % self.modulus
    }
}

impl fmt::Display for GapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {}, got {} ({} missing)",
            self.expected,
            self.observed,
            self.missing()
        )
    }
}

/// Modulo counters per stream key.
///
/// The first observation of a key sets its baseline. Afterwards every
/// mismatch is reported once and tracking resynchronises to the observed
/// value.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    modulus: u16,
    last: HashMap<u64, u16>,
}

impl SequenceTracker {
    pub fn new(modulus: u16) -> Self {
        Self {
            modulus: modulus.max(1),
            last: HashMap::new(),
        }
    }

    /// Tracker for 4-bit packet counters.
    pub fn packets() -> Self {
        Self::new(PACKET_COUNT_MODULUS)
    }

    /// Tracker for 12-bit frame counters.
    pub fn frames() -> Self {
        Self::new(FRAME_COUNT_MODULUS)
    }

    pub fn modulus(&self) -> u16 {
        self.modulus
    }

    /// Counter expected next for `key`, or `None` before its first observation.
    pub fn next_expected(&self, key: u64) -> Option<u16> {
        self.last.get(&key).map(|&last| (last + 1) % self.modulus)
    }

    /// Record `counter` for `key`, reporting a gap if it was not the one
    /// expected.
    pub fn observe(&mut self, key: u64, counter: u16) -> Option<GapReport> {
        let counter = counter % self.modulus;
        let gap = self
            .next_expected(key)
            .filter(|&expected| expected != counter)
            .map(|expected| GapReport {
                key,
                expected,
                observed: counter,
                modulus: self.modulus,
            });
        self.last.insert(key, counter);
        gap
    }

    /// Allocate the next outgoing counter for `key`, starting at 0.
    pub fn assign(&mut self, key: u64) -> u16 {
        let counter = self.next_expected(key).unwrap_or(0);
        self.last.insert(key, counter);
        counter
    }

    /// Number of keys seen.
    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }
}
