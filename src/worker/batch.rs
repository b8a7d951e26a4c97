//! Batch accumulator - per-worker flush state machine
//!
//! Collects claimed envelopes until a size or age threshold fires a flush.
//! The states are implicit in the data: empty (no envelopes), accumulating
//! (some envelopes, age clock running), flushing (`take()` hands the batch
//! to the writer and resets to empty). Flush readiness is checked after
//! every claim cycle rather than on a separate timer, so worst-case flush
//! latency is the claim block timeout plus the maximum batch age.

use std::time::{Duration, Instant};

use crate::record::Envelope;

/// In-memory batch owned by a single worker. No locking: never shared.
pub struct BatchAccumulator {
    envelopes: Vec<Envelope>,
    /// When the first member of the current batch was added
    opened_at: Option<Instant>,
    max_size: usize,
    max_age: Duration,
}

impl BatchAccumulator {
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        Self {
            envelopes: Vec::with_capacity(max_size),
            opened_at: None,
            max_size,
            max_age,
        }
    }

    /// Append claimed envelopes, starting the age clock on the first one
    pub fn extend(&mut self, claimed: Vec<Envelope>) {
        if claimed.is_empty() {
            return;
        }
        if self.envelopes.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.envelopes.extend(claimed);
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Remaining capacity before the size threshold
    pub fn remaining(&self) -> usize {
        self.max_size.saturating_sub(self.envelopes.len())
    }

    /// Whether the size or age threshold has fired, whichever first
    pub fn should_flush(&self) -> bool {
        if self.envelopes.is_empty() {
            return false;
        }
        if self.envelopes.len() >= self.max_size {
            return true;
        }
        self.opened_at
            .map(|t| t.elapsed() >= self.max_age)
            .unwrap_or(false)
    }

    /// Hand the batch over for flushing and reset to empty.
    ///
    /// A batch is flushed exactly once: whatever the writer does with it,
    /// nothing returns here. Failed records redeliver via the transport.
    pub fn take(&mut self) -> Vec<Envelope> {
        self.opened_at = None;
        std::mem::take(&mut self.envelopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DeliveryHandle, Envelope, QueuedWrite, WriteRecord};

    fn envelope(i: u32) -> Envelope {
        Envelope::from_queued(
            QueuedWrite {
                record: WriteRecord::new("write", i, "payload"),
                write_id: format!("{i:016x}"),
                queued_at: chrono::Utc::now(),
            },
            DeliveryHandle(format!("$JS.ACK.{i}")),
        )
    }

    fn envelopes(n: u32) -> Vec<Envelope> {
        (0..n).map(envelope).collect()
    }

    #[test]
    fn test_empty_never_flushes() {
        let acc = BatchAccumulator::new(10, Duration::from_millis(0));
        assert!(!acc.should_flush());
    }

    #[test]
    fn test_size_trigger_fires_before_age() {
        // Age threshold far away; count alone must fire
        let mut acc = BatchAccumulator::new(3, Duration::from_secs(3600));
        acc.extend(envelopes(2));
        assert!(!acc.should_flush());
        acc.extend(envelopes(1));
        assert!(acc.should_flush());
    }

    #[test]
    fn test_age_trigger_fires_with_single_record() {
        let mut acc = BatchAccumulator::new(1000, Duration::from_millis(20));
        acc.extend(envelopes(1));
        assert!(!acc.should_flush());
        std::thread::sleep(Duration::from_millis(30));
        assert!(acc.should_flush());
    }

    #[test]
    fn test_age_clock_starts_at_first_member() {
        let mut acc = BatchAccumulator::new(1000, Duration::from_millis(40));
        acc.extend(envelopes(1));
        std::thread::sleep(Duration::from_millis(25));
        // Later members do not restart the clock
        acc.extend(envelopes(1));
        std::thread::sleep(Duration::from_millis(25));
        assert!(acc.should_flush());
    }

    #[test]
    fn test_take_resets_to_empty() {
        let mut acc = BatchAccumulator::new(2, Duration::from_secs(3600));
        acc.extend(envelopes(2));
        assert!(acc.should_flush());

        let batch = acc.take();
        assert_eq!(batch.len(), 2);
        assert!(acc.is_empty());
        assert!(!acc.should_flush());

        // Next batch gets a fresh age clock
        acc.extend(envelopes(1));
        assert_eq!(acc.len(), 1);
        assert!(!acc.should_flush());
    }

    #[test]
    fn test_remaining_capacity() {
        let mut acc = BatchAccumulator::new(5, Duration::from_secs(1));
        assert_eq!(acc.remaining(), 5);
        acc.extend(envelopes(3));
        assert_eq!(acc.remaining(), 2);
    }
}
