//! Transfer statistics and aggregate metrics.
//!
//! [`TransferStats`] describes one transmission as seen by one end. The
//! sender fills the compression and keying fields, the receiver adds the
//! fragment counters of its session. [`Metrics`] folds many of them into
//! totals for reporting.
//!
//! # Thread Safety
//!
//! `Metrics` is a plain value. Keep one per thread and [`Metrics::merge`]
//! them at the end, or wrap a shared one in a mutex.

use crate::compressor::CompressionReport;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Statistics of one transmission.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferStats {
    /// `compressed_size / canonical_size`
    pub compression_ratio: f64,

    /// Fragments produced by the sender (data + parity)
    pub fragments_sent: usize,

    /// Distinct fragments accepted by the receiver
    pub fragments_received: usize,

    pub duplicates: usize,

    /// Fragments discarded on a digest or tag failure
    pub integrity_failures: usize,

    /// Data fragments rebuilt from parity
    pub recovered_fragments: usize,

    /// Stream spans left unrecovered
    pub unrecoverable_gaps: usize,

    /// Keyed symbols, gaps included
    pub symbols: usize,

    /// Air time at the configured speed, `<BT>` and `<AR>` included
    pub keying_time: Duration,
}

/// Aggregate metrics over many transmissions.
#[derive(Debug, Clone)]
pub struct Metrics {
    // === Timing ===
    /// When collection started
    pub start_time: Instant,

    /// When collection ended (set on completion)
    pub end_time: Option<Instant>,

    // === Sending ===
    /// Documents compressed and fragmented
    pub documents_sent: u64,

    /// Canonical MML bytes of all sent documents
    pub canonical_bytes: u64,

    /// MML-C bytes of all sent documents
    pub compressed_bytes: u64,

    /// Fragments handed to the channel
    pub fragments_sent: u64,

    /// Symbols keyed
    pub symbols_sent: u64,

    /// Total air time
    pub keying_time: Duration,

    // === Channel ===
    /// Fragments dropped by the channel
    pub fragments_dropped: u64,

    /// Fragments that arrived after a higher index of the same transmission
    pub fragments_reordered: u64,

    // === Receiving ===
    /// Fragments accepted by the reassembler
    pub fragments_received: u64,

    /// Duplicate fragments ignored
    pub fragments_duplicate: u64,

    /// Fragments that could not be parsed
    pub fragments_invalid: u64,

    /// Fragments discarded on a digest or tag failure
    pub integrity_failures: u64,

    /// Data fragments rebuilt from parity
    pub fragments_recovered: u64,

    /// Unrecovered stream spans
    pub unrecoverable_gaps: u64,

    // === Outcome ===
    /// Documents delivered complete
    pub documents_complete: u64,

    /// Documents delivered with loss markers
    pub documents_partial: u64,

    /// Sessions ended by a fatal error
    pub documents_failed: u64,
}

impl Metrics {
    /// Create new metrics with start time set to now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            documents_sent: 0,
            canonical_bytes: 0,
            compressed_bytes: 0,
            fragments_sent: 0,
            symbols_sent: 0,
            keying_time: Duration::ZERO,
            fragments_dropped: 0,
            fragments_reordered: 0,
            fragments_received: 0,
            fragments_duplicate: 0,
            fragments_invalid: 0,
            integrity_failures: 0,
            fragments_recovered: 0,
            unrecoverable_gaps: 0,
            documents_complete: 0,
            documents_partial: 0,
            documents_failed: 0,
        }
    }

    /// Mark collection as complete.
    pub fn complete(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Get total duration (or current elapsed if not complete).
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// Account for one sent document.
    pub fn record_send(&mut self, report: &CompressionReport, stats: &TransferStats) {
        self.documents_sent += 1;
        self.canonical_bytes += report.canonical_size as u64;
        self.compressed_bytes += report.compressed_size as u64;
        self.fragments_sent += stats.fragments_sent as u64;
        self.symbols_sent += stats.symbols as u64;
        self.keying_time += stats.keying_time;
    }

    /// Account for one finished reception.
    pub fn record_reception(&mut self, stats: &TransferStats, complete: bool) {
        self.fragments_received += stats.fragments_received as u64;
        self.fragments_duplicate += stats.duplicates as u64;
        self.integrity_failures += stats.integrity_failures as u64;
        self.fragments_recovered += stats.recovered_fragments as u64;
        self.unrecoverable_gaps += stats.unrecoverable_gaps as u64;
        if complete {
            self.documents_complete += 1;
        } else {
            self.documents_partial += 1;
        }
    }

    /// Fold per-thread metrics into `self`.
    pub fn merge(&mut self, other: &Metrics) {
        self.start_time = self.start_time.min(other.start_time);
        self.end_time = match (self.end_time, other.end_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.documents_sent += other.documents_sent;
        self.canonical_bytes += other.canonical_bytes;
        self.compressed_bytes += other.compressed_bytes;
        self.fragments_sent += other.fragments_sent;
        self.symbols_sent += other.symbols_sent;
        self.keying_time += other.keying_time;
        self.fragments_dropped += other.fragments_dropped;
        self.fragments_reordered += other.fragments_reordered;
        self.fragments_received += other.fragments_received;
        self.fragments_duplicate += other.fragments_duplicate;
        self.fragments_invalid += other.fragments_invalid;
        self.integrity_failures += other.integrity_failures;
        self.fragments_recovered += other.fragments_recovered;
        self.unrecoverable_gaps += other.unrecoverable_gaps;
        self.documents_complete += other.documents_complete;
        self.documents_partial += other.documents_partial;
        self.documents_failed += other.documents_failed;
    }

    /// Compute compression ratio (compressed / canonical).
    ///
    /// Returns 0.0 if nothing was sent.
    pub fn compression_ratio(&self) -> f64 {
        if self.canonical_bytes == 0 {
            0.0
        } else {
            self.compressed_bytes as f64 / self.canonical_bytes as f64
        }
    }

    /// Compute fragment loss rate (dropped / sent).
    pub fn loss_rate(&self) -> f64 {
        if self.fragments_sent == 0 {
            0.0
        } else {
            self.fragments_dropped as f64 / self.fragments_sent as f64
        }
    }

    /// Share of finished documents that arrived complete.
    pub fn delivery_rate(&self) -> f64 {
        let finished = self.documents_complete + self.documents_partial + self.documents_failed;
        if finished == 0 {
            0.0
        } else {
            self.documents_complete as f64 / finished as f64
        }
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Transfer Summary ===");
        let _ = writeln!(out, "Duration: {} ms", self.duration().as_millis());
        let _ = writeln!(out);
        let _ = writeln!(out, "=== Compression ===");
        let _ = writeln!(out, "Documents: {}", self.documents_sent);
        let _ = writeln!(out, "Canonical bytes: {}", self.canonical_bytes);
        let _ = writeln!(out, "Compressed bytes: {}", self.compressed_bytes);
        let _ = writeln!(out, "Ratio: {:.1}%", self.compression_ratio() * 100.0);
        let _ = writeln!(out);
        let _ = writeln!(out, "=== Keying ===");
        let _ = writeln!(out, "Symbols: {}", self.symbols_sent);
        let _ = writeln!(out, "Air time: {:.1} s", self.keying_time.as_secs_f64());
        let _ = writeln!(out);
        let _ = writeln!(out, "=== Channel ===");
        let _ = writeln!(out, "Fragments sent: {}", self.fragments_sent);
        let _ = writeln!(
            out,
            "Fragments dropped: {} ({:.2}%)",
            self.fragments_dropped,
            self.loss_rate() * 100.0
        );
        let _ = writeln!(out, "Fragments reordered: {}", self.fragments_reordered);
        let _ = writeln!(out);
        let _ = writeln!(out, "=== Reassembly ===");
        let _ = writeln!(out, "Fragments received: {}", self.fragments_received);
        let _ = writeln!(out, "Duplicates: {}", self.fragments_duplicate);
        let _ = writeln!(out, "Invalid: {}", self.fragments_invalid);
        let _ = writeln!(out, "Integrity failures: {}", self.integrity_failures);
        let _ = writeln!(out, "Recovered from parity: {}", self.fragments_recovered);
        let _ = writeln!(out, "Unrecoverable gaps: {}", self.unrecoverable_gaps);
        let _ = writeln!(out);
        let _ = writeln!(out, "=== Delivery ===");
        let _ = writeln!(out, "Complete: {}", self.documents_complete);
        let _ = writeln!(out, "Partial: {}", self.documents_partial);
        let _ = writeln!(out, "Failed: {}", self.documents_failed);
        out
    }

    /// Export metrics as a simple text format (for parsing/testing).
    pub fn export_text(&self) -> String {
        format!(
            "duration_ms={}\n\
             documents_sent={}\n\
             compression_ratio={:.4}\n\
             symbols_sent={}\n\
             keying_time_ms={}\n\
             fragments_sent={}\n\
             fragments_dropped={}\n\
             loss_rate={:.4}\n\
             fragments_reordered={}\n\
             fragments_received={}\n\
             fragments_duplicate={}\n\
             fragments_invalid={}\n\
             integrity_failures={}\n\
             fragments_recovered={}\n\
             unrecoverable_gaps={}\n\
             documents_complete={}\n\
             documents_partial={}\n\
             documents_failed={}\n",
            self.duration().as_millis(),
            self.documents_sent,
            self.compression_ratio(),
            self.symbols_sent,
            self.keying_time.as_millis(),
            self.fragments_sent,
            self.fragments_dropped,
            self.loss_rate(),
            self.fragments_reordered,
            self.fragments_received,
            self.fragments_duplicate,
            self.fragments_invalid,
            self.integrity_failures,
            self.fragments_recovered,
            self.unrecoverable_gaps,
            self.documents_complete,
            self.documents_partial,
            self.documents_failed,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper for tracking reordering.
///
/// Tracks the highest sequence index seen per transmission to detect
/// out-of-order arrival.
#[derive(Debug, Default)]
pub struct ReorderTracker {
    highest: HashMap<u32, u16>,
}

impl ReorderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fragment and return true if it arrived out of order.
    pub fn track(&mut self, transmission_id: u32, sequence_index: u16) -> bool {
        let highest = self.highest.entry(transmission_id).or_insert(sequence_index);
        let reordered = sequence_index < *highest;
        *highest = (*highest).max(sequence_index);
        reordered
    }

    /// Forget a finished transmission.
    pub fn clear(&mut self, transmission_id: u32) {
        self.highest.remove(&transmission_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert!(metrics.end_time.is_none());
        assert!(metrics.duration().as_millis() < 100);
        assert_eq!(metrics.delivery_rate(), 0.0);
    }

    #[test]
    fn test_record_send_and_ratio() {
        let mut metrics = Metrics::new();
        let report = CompressionReport {
            compressed_size: 750,
            canonical_size: 1000,
            ratio: 0.75,
            adaptive_entries: 0,
        };
        let stats = TransferStats {
            fragments_sent: 12,
            symbols: 4000,
            keying_time: Duration::from_secs(90),
            ..TransferStats::default()
        };
        metrics.record_send(&report, &stats);

        assert_eq!(metrics.compression_ratio(), 0.75);
        assert_eq!(metrics.fragments_sent, 12);
        metrics.fragments_dropped = 3;
        assert_eq!(metrics.loss_rate(), 0.25);
    }

    #[test]
    fn test_record_reception_and_merge() {
        let mut a = Metrics::new();
        let stats = TransferStats {
            fragments_received: 5,
            recovered_fragments: 1,
            ..TransferStats::default()
        };
        a.record_reception(&stats, true);

        let mut b = Metrics::new();
        b.record_reception(
            &TransferStats {
                unrecoverable_gaps: 2,
                ..stats
            },
            false,
        );
        b.documents_failed = 1;

        a.merge(&b);
        assert_eq!(a.fragments_received, 10);
        assert_eq!(a.fragments_recovered, 2);
        assert_eq!(a.unrecoverable_gaps, 2);
        assert_eq!(a.documents_complete, 1);
        assert_eq!(a.documents_partial, 1);
        assert!((a.delivery_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_reorder_tracker() {
        let mut tracker = ReorderTracker::new();

        assert!(!tracker.track(0, 0));
        assert!(!tracker.track(0, 1));
        assert!(!tracker.track(0, 2));
        assert!(tracker.track(0, 1));

        // Different transmission
        assert!(!tracker.track(1, 5));
        assert!(tracker.track(1, 3));

        tracker.clear(1);
        assert!(!tracker.track(1, 0));
    }

    #[test]
    fn test_export_text() {
        let mut metrics = Metrics::new();
        metrics.documents_sent = 3;
        metrics.fragments_sent = 10;
        metrics.documents_complete = 2;

        let text = metrics.export_text();
        assert!(text.contains("documents_sent=3"));
        assert!(text.contains("fragments_sent=10"));
        assert!(text.contains("documents_complete=2"));
        assert!(metrics.summary().contains("Complete: 2"));
    }
}
