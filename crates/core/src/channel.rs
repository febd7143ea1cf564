//! Lossy radio channel simulator with seeded randomness.
//!
//! Serialized fragments go in, a damaged and shuffled copy of the traffic
//! comes out. All effects are reproducible given the same seed.
//!
//! # Simulated Effects
//!
//! - **Loss**: fragment never arrives (Bernoulli per fragment)
//! - **Corruption**: one byte of the fragment is flipped
//! - **Duplication**: a second copy is delivered
//! - **Reordering**: each copy is held back by up to `reorder_window` slots
//!
//! # Implementation
//!
//! Time is counted in send slots rather than wall-clock time: every `send`
//! advances the clock by one slot. Copies wait in a min-heap keyed by
//! delivery slot and are released once the clock reaches it.
//!
//! # Determinism
//!
//! All randomness comes from a seeded ChaCha8 RNG. Given the same seed and
//! inputs, outputs are bit-identical.

use crate::error::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Configuration for channel simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    /// Fragment loss probability [0.0, 1.0]
    pub loss_rate: f64,

    /// Probability that a delivered fragment has one byte flipped
    pub corruption_rate: f64,

    /// Probability that a fragment is delivered twice
    pub duplicate_rate: f64,

    /// Maximum hold-back in slots; 0 keeps send order
    pub reorder_window: usize,

    /// Random seed for determinism
    pub seed: u64,
}

impl ChannelConfig {
    /// Create a configuration with no impairments (perfect channel).
    pub fn perfect(seed: u64) -> Self {
        Self {
            loss_rate: 0.0,
            corruption_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_window: 0,
            seed,
        }
    }

    /// Create a default configuration with moderate impairments.
    pub fn default_with_seed(seed: u64) -> Self {
        Self {
            loss_rate: 0.05,
            corruption_rate: 0.02,
            duplicate_rate: 0.02,
            reorder_window: 4,
            seed,
        }
    }

    /// # Errors
    /// `Error::Config` if a rate is outside [0.0, 1.0].
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("loss_rate", self.loss_rate),
            ("corruption_rate", self.corruption_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::Config(format!("{name} must be in [0, 1], got {rate}")));
            }
        }
        Ok(())
    }
}

/// A fragment copy with its delivery slot.
#[derive(Debug, Clone)]
struct Scheduled {
    bytes: Vec<u8>,
    slot: u64,
    /// Tie-breaker keeping send order within a slot
    seq: u64,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.slot, self.seq) == (other.slot, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earlier slot = higher priority)
        (other.slot, other.seq).cmp(&(self.slot, self.seq))
    }
}

/// Channel simulator implementing loss, corruption, duplication and reordering.
///
/// # Thread Safety
/// Not thread-safe; use one instance per thread or synchronize externally.
#[derive(Debug)]
pub struct ChannelSimulator {
    config: ChannelConfig,
    rng: ChaCha8Rng,
    queue: BinaryHeap<Scheduled>,
    clock: u64,
    next_seq: u64,
    stats: ChannelStats,
}

impl ChannelSimulator {
    /// Create a new channel simulator with the given configuration.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            queue: BinaryHeap::new(),
            clock: 0,
            next_seq: 0,
            stats: ChannelStats::default(),
        }
    }

    /// Put one serialized fragment on the air.
    pub fn send(&mut self, bytes: Vec<u8>) {
        self.stats.sent += 1;
        self.clock += 1;

        if self.roll(self.config.loss_rate) {
            self.stats.dropped += 1;
            return;
        }

        if self.roll(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            let copy = bytes.clone();
            self.schedule(copy);
        }
        self.schedule(bytes);
    }

    fn roll(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.gen::<f64>() < probability
    }

    fn schedule(&mut self, mut bytes: Vec<u8>) {
        if !bytes.is_empty() && self.roll(self.config.corruption_rate) {
            let position = self.rng.gen_range(0..bytes.len());
            let mask: u8 = self.rng.gen_range(1..=u8::MAX);
            bytes[position] ^= mask;
            self.stats.corrupted += 1;
        }

        let delay = match self.config.reorder_window {
            0 => 0,
            window => self.rng.gen_range(0..=window as u64),
        };
        self.queue.push(Scheduled {
            bytes,
            slot: self.clock + delay,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Take the next copy whose delivery slot has come.
    pub fn recv(&mut self) -> Option<Vec<u8>> {
        if self.queue.peek()?.slot > self.clock {
            return None;
        }
        let scheduled = self.queue.pop()?;
        self.stats.delivered += 1;
        Some(scheduled.bytes)
    }

    /// Deliver everything still in flight, in delivery order.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        let mut delivered = Vec::with_capacity(self.queue.len());
        while let Some(scheduled) = self.queue.pop() {
            delivered.push(scheduled.bytes);
            self.stats.delivered += 1;
        }
        delivered
    }

    /// Send a whole transmission and collect what comes out the other end.
    pub fn transmit<I>(&mut self, fragments: I) -> Vec<Vec<u8>>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut delivered = Vec::new();
        for bytes in fragments {
            self.send(bytes);
            while let Some(copy) = self.recv() {
                delivered.push(copy);
            }
        }
        delivered.extend(self.drain());
        delivered
    }

    /// Check if any copies are currently in flight.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            in_flight: self.queue.len(),
            ..self.stats
        }
    }
}

/// Statistics about channel behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Fragments put on the air
    pub sent: u64,

    pub dropped: u64,

    /// Copies with a flipped byte
    pub corrupted: u64,

    /// Fragments delivered twice
    pub duplicated: u64,

    /// Copies handed to the receiver
    pub delivered: u64,

    pub in_flight: usize,
}

impl ChannelStats {
    /// Compute fragment loss rate.
    pub fn loss_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.dropped as f64 / self.sent as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fragment(id: u8) -> Vec<u8> {
        vec![id; 8]
    }

    #[test]
    fn test_perfect_channel() {
        let mut sim = ChannelSimulator::new(ChannelConfig::perfect(42));

        let out = sim.transmit((0..10).map(make_fragment));
        assert_eq!(out, (0..10).map(make_fragment).collect::<Vec<_>>());

        let stats = sim.stats();
        assert_eq!(stats.sent, 10);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.delivered, 10);
        assert!(!sim.has_pending());
    }

    #[test]
    fn test_fragment_loss() {
        let config = ChannelConfig {
            loss_rate: 0.5,
            ..ChannelConfig::perfect(42)
        };
        let mut sim = ChannelSimulator::new(config);
        let out = sim.transmit((0..100).map(make_fragment));

        let stats = sim.stats();
        assert_eq!(stats.sent, 100);
        // Allow 30-70% range due to randomness
        assert!(stats.dropped >= 30 && stats.dropped <= 70);
        assert_eq!(out.len() as u64, 100 - stats.dropped);
    }

    #[test]
    fn test_corruption_flips_one_byte() {
        let config = ChannelConfig {
            corruption_rate: 1.0,
            ..ChannelConfig::perfect(7)
        };
        let mut sim = ChannelSimulator::new(config);
        let out = sim.transmit(vec![vec![0u8; 16]]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].iter().filter(|&&b| b != 0).count(), 1);
        assert_eq!(sim.stats().corrupted, 1);
    }

    #[test]
    fn test_duplication() {
        let config = ChannelConfig {
            duplicate_rate: 1.0,
            ..ChannelConfig::perfect(7)
        };
        let mut sim = ChannelSimulator::new(config);
        let out = sim.transmit((0..5).map(make_fragment));
        assert_eq!(out.len(), 10);
        assert_eq!(sim.stats().duplicated, 5);
    }

    #[test]
    fn test_reordering() {
        let config = ChannelConfig {
            reorder_window: 6,
            ..ChannelConfig::perfect(99)
        };
        let mut sim = ChannelSimulator::new(config);
        let out = sim.transmit((0..30).map(make_fragment));

        let order: Vec<u8> = out.iter().map(|f| f[0]).collect();
        assert_eq!(order.len(), 30);
        assert!(order.windows(2).any(|w| w[1] < w[0]), "expected some reordering");

        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..30).collect::<Vec<u8>>());
    }

    #[test]
    fn test_determinism() {
        let config = ChannelConfig::default_with_seed(12345);
        let mut sim1 = ChannelSimulator::new(config);
        let mut sim2 = ChannelSimulator::new(config);

        let out1 = sim1.transmit((0..50).map(make_fragment));
        let out2 = sim2.transmit((0..50).map(make_fragment));
        assert_eq!(out1, out2);
        assert_eq!(sim1.stats(), sim2.stats());
    }

    #[test]
    fn test_validate() {
        assert!(ChannelConfig::default_with_seed(1).validate().is_ok());
        let bad = ChannelConfig {
            loss_rate: 1.5,
            ..ChannelConfig::perfect(1)
        };
        assert!(matches!(bad.validate(), Err(Error::Config(_))));
    }
}
