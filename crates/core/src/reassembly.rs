//! Fragment reassembly with parity repair and bounded memory.
//!
//! The reassembler keeps one session per transmission id and drives it
//! through a small state machine:
//!
//! ```text
//!   fragment arrival          end of transmission
//!        |                   (explicit, inferred, timeout)
//!        v                            |
//!   Collecting --------------------> Repairing ----> Complete   (no gaps)
//!        ^  |                                   \--> Failed     (gaps recorded)
//!        |  | eager XOR repair per group
//!        +--+
//! ```
//!
//! # Design
//!
//! - **Bounded window**: at most `max_sessions` sessions in flight; finished
//!   ids are remembered in a bounded list so late fragments are ignored
//! - **Local failures stay local**: duplicates, digest or tag failures and
//!   layout mismatches are counted and discarded, the session carries on
//! - **Eager repair**: a group missing exactly one data fragment is rebuilt
//!   from its parity as soon as the parity is present
//! - **Inferred end**: a session finishes once every data position is filled,
//!   or every index has arrived or been confirmed corrupted
//!
//! # Thread Safety
//!
//! Sessions live behind their own lock inside a shared map, so fragments of
//! different transmissions are processed concurrently while the mutations of
//! one session are serialized. All methods take `&self`.

use crate::config::TransportConfig;
use crate::error::{Error, ReassemblyError, Result};
use crate::fragment::{xor_into, Fragment, StreamLayout};
use crate::security::IntegrityKey;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Finished transmission ids remembered to ignore late fragments.
const FINISHED_MEMORY: usize = 1024;

/// Lifecycle of a receiving session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Collecting,
    Repairing,
    /// Every stream byte recovered
    Complete,
    /// Channel closed with unrecoverable gaps
    Failed,
}

/// A span of the packed stream that could not be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    /// Byte offset in the packed stream
    pub offset: usize,
    pub len: usize,
}

impl Gap {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Counters of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// `total_fragments` announced by the sender
    pub fragments_expected: usize,
    /// Distinct fragments accepted
    pub fragments_received: usize,
    pub duplicates: usize,
    /// Digest or authentication failures
    pub integrity_failures: usize,
    pub layout_mismatches: usize,
    /// Data fragments rebuilt from parity
    pub recovered_fragments: usize,
}

/// Final result of a session.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub transmission_id: u32,
    pub layout: StreamLayout,
    /// `Complete` or `Failed`
    pub state: SessionState,
    /// Packed stream; bytes inside gaps are zero
    pub stream: Vec<u8>,
    /// Unrecovered spans, merged and in stream order
    pub gaps: Vec<Gap>,
    /// Data fragment indices that were never recovered
    pub missing: Vec<u16>,
    pub stats: SessionStats,
}

impl Assembled {
    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// The stream with every byte inside a gap replaced by `None`.
    pub fn known_bytes(&self) -> Vec<Option<u8>> {
        let mut bytes: Vec<Option<u8>> = self.stream.iter().copied().map(Some).collect();
        for gap in &self.gaps {
            for slot in &mut bytes[gap.range()] {
                *slot = None;
            }
        }
        bytes
    }
}

#[derive(Debug)]
struct Session {
    transmission_id: u32,
    layout: StreamLayout,
    /// Payload per sequence index
    slots: Vec<Option<Vec<u8>>>,
    /// Indices that arrived only with a bad digest or tag
    corrupted: Vec<bool>,
    state: SessionState,
    last_activity: Instant,
    stats: SessionStats,
}

impl Session {
    fn new(transmission_id: u32, layout: StreamLayout, now: Instant) -> Self {
        let total = usize::from(layout.total_fragments);
        Self {
            transmission_id,
            layout,
            slots: vec![None; total],
            corrupted: vec![false; total],
            state: SessionState::Collecting,
            last_activity: now,
            stats: SessionStats {
                fragments_expected: total,
                ..SessionStats::default()
            },
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Complete | SessionState::Failed)
    }

    /// Store a fragment. Returns true once the session can be finished.
    fn insert(&mut self, fragment: Fragment, check: Result<()>, now: Instant) -> bool {
        self.last_activity = now;
        let index = usize::from(fragment.sequence_index);

        if fragment.layout != self.layout {
            self.stats.layout_mismatches += 1;
            warn!(
                transmission_id = self.transmission_id,
                index, "discarding fragment with mismatched layout"
            );
            return false;
        }
        if let Err(error) = check {
            self.stats.integrity_failures += 1;
            if self.slots[index].is_none() {
                self.corrupted[index] = true;
            }
            warn!(transmission_id = self.transmission_id, %error, "discarding fragment");
            return self.all_resolved();
        }
        if self.slots[index].is_some() {
            self.stats.duplicates += 1;
            debug!(transmission_id = self.transmission_id, index, "duplicate fragment");
            return false;
        }

        self.slots[index] = Some(fragment.payload);
        self.corrupted[index] = false;
        self.stats.fragments_received += 1;

        let data = self.layout.data_fragments;
        let group = match fragment.sequence_index.checked_sub(data) {
            Some(parity_group) => Some(parity_group),
            None => self.layout.group_of(fragment.sequence_index),
        };
        if let Some(group) = group {
            self.repair(group);
        }

        self.data_complete() || self.all_resolved()
    }

    /// Rebuild the single missing data fragment of `group`, if possible.
    fn repair(&mut self, group: u16) {
        let members = self.layout.group_members(group);
        let parity_index = usize::from(self.layout.parity_index(group));
        let mut missing = members
            .clone()
            .filter(|&member| self.slots[usize::from(member)].is_none());
        let (Some(lost), None) = (missing.next(), missing.next()) else {
            return;
        };
        let Some(Some(parity)) = self.slots.get(parity_index) else {
            return;
        };

        let mut rebuilt = parity.clone();
        for member in members.filter(|&member| member != lost) {
            if let Some(payload) = &self.slots[usize::from(member)] {
                xor_into(&mut rebuilt, payload);
            }
        }
        rebuilt.truncate(self.layout.expected_payload_len(lost));

        let slot = usize::from(lost);
        self.slots[slot] = Some(rebuilt);
        self.corrupted[slot] = false;
        self.stats.recovered_fragments += 1;
        debug!(
            transmission_id = self.transmission_id,
            index = lost,
            "rebuilt fragment from parity"
        );
    }

    fn data_complete(&self) -> bool {
        self.slots[..usize::from(self.layout.data_fragments)]
            .iter()
            .all(Option::is_some)
    }

    fn all_resolved(&self) -> bool {
        self.slots
            .iter()
            .zip(&self.corrupted)
            .all(|(slot, corrupted)| slot.is_some() || *corrupted)
    }

    /// Close the session: final repair pass, then gap accounting.
    fn finish(&mut self) -> Assembled {
        self.state = SessionState::Repairing;
        for group in 0..self.layout.parity_fragments() {
            self.repair(group);
        }

        let mut stream = vec![0u8; self.layout.stream_len as usize];
        let mut gaps: Vec<Gap> = Vec::new();
        let mut missing = Vec::new();

        for index in 0..self.layout.data_fragments {
            let range = self.layout.byte_range(index);
            match self.slots.get_mut(usize::from(index)).and_then(Option::take) {
                Some(payload) => stream[range].copy_from_slice(&payload),
                None => {
                    missing.push(index);
                    match gaps.last_mut() {
                        Some(last) if last.offset + last.len == range.start => {
                            last.len += range.len();
                        }
                        _ => gaps.push(Gap {
                            offset: range.start,
                            len: range.len(),
                        }),
                    }
                }
            }
        }
        self.slots.clear();

        self.state = if missing.is_empty() {
            SessionState::Complete
        } else {
            SessionState::Failed
        };
        info!(
            transmission_id = self.transmission_id,
            state = ?self.state,
            received = self.stats.fragments_received,
            recovered = self.stats.recovered_fragments,
            gaps = gaps.len(),
            "session finished"
        );

        Assembled {
            transmission_id: self.transmission_id,
            layout: self.layout,
            state: self.state,
            stream,
            gaps,
            missing,
            stats: self.stats,
        }
    }
}

/// Bounded FIFO of finished transmission ids.
#[derive(Debug, Default)]
struct Finished {
    order: VecDeque<u32>,
    ids: HashSet<u32>,
}

impl Finished {
    fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    fn insert(&mut self, id: u32) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > FINISHED_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

/// Collects fragments of concurrent transmissions back into streams.
#[derive(Debug)]
pub struct Reassembler {
    /// Maximum sessions tracked simultaneously
    max_sessions: usize,

    /// Inactivity after which a session is closed
    timeout: Duration,

    /// Static dictionary version this receiver understands
    dictionary_version: u8,

    key: Option<IntegrityKey>,

    sessions: RwLock<HashMap<u32, Arc<Mutex<Session>>>>,

    finished: Mutex<Finished>,
}

impl Reassembler {
    /// Create a new reassembler.
    ///
    /// # Arguments
    /// - `max_sessions`: maximum number of transmissions tracked at once
    /// - `timeout`: inactivity before a session is closed by `check_timeouts`
    /// - `dictionary_version`: static dictionary version fragments must declare
    pub fn new(max_sessions: usize, timeout: Duration, dictionary_version: u8) -> Self {
        Self {
            max_sessions,
            timeout,
            dictionary_version,
            key: None,
            sessions: RwLock::new(HashMap::new()),
            finished: Mutex::new(Finished::default()),
        }
    }

    pub fn from_config(config: &TransportConfig, dictionary_version: u8) -> Self {
        Self::new(config.max_sessions, config.session_timeout, dictionary_version)
    }

    /// Require and check authentication tags.
    pub fn with_key(mut self, key: IntegrityKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Parse and insert a serialized fragment.
    ///
    /// # Errors
    /// Fragment parse errors (the fragment cannot be attributed to a session),
    /// plus everything [`Reassembler::insert`] returns.
    pub fn receive(&self, bytes: &[u8]) -> Result<Option<Assembled>> {
        let fragment = Fragment::deserialize(bytes)?;
        self.insert(fragment)
    }

    /// Insert a fragment, returning the finished session it completed.
    ///
    /// Duplicates, integrity failures and layout mismatches are counted in the
    /// session and otherwise ignored. Fragments of finished or cancelled
    /// transmissions are ignored.
    ///
    /// # Errors
    /// - `Error::DictionaryVersionMismatch` if the fragment declares another
    ///   static dictionary version; the transmission is closed without output
    /// - `ReassemblyError::WindowFull` if a new session would exceed `max_sessions`
    pub fn insert(&self, fragment: Fragment) -> Result<Option<Assembled>> {
        self.insert_at(fragment, Instant::now())
    }

    fn insert_at(&self, fragment: Fragment, now: Instant) -> Result<Option<Assembled>> {
        let id = fragment.transmission_id;
        if self.finished.lock().contains(id) {
            debug!(transmission_id = id, "fragment for finished transmission ignored");
            return Ok(None);
        }

        let found = fragment.layout.dictionary_version;
        if found != self.dictionary_version {
            self.sessions.write().remove(&id);
            self.finished.lock().insert(id);
            warn!(transmission_id = id, found, "dictionary version mismatch");
            return Err(Error::DictionaryVersionMismatch {
                expected: self.dictionary_version,
                found,
            });
        }

        let check = fragment.verify().and_then(|()| match &self.key {
            Some(key) => key.verify(&fragment),
            None => Ok(()),
        });

        let session = self.session_for(&fragment, now)?;
        let mut session = session.lock();
        if session.is_finished() {
            return Ok(None);
        }
        if !session.insert(fragment, check, now) {
            return Ok(None);
        }

        let assembled = session.finish();
        drop(session);
        self.retire(id);
        Ok(Some(assembled))
    }

    fn session_for(&self, fragment: &Fragment, now: Instant) -> Result<Arc<Mutex<Session>>> {
        let id = fragment.transmission_id;
        if let Some(session) = self.sessions.read().get(&id) {
            return Ok(Arc::clone(session));
        }

        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get(&id) {
            return Ok(Arc::clone(session));
        }
        if sessions.len() >= self.max_sessions {
            return Err(ReassemblyError::WindowFull {
                max: self.max_sessions,
            }
            .into());
        }
        debug!(
            transmission_id = id,
            total = fragment.layout.total_fragments,
            "opening session"
        );
        let session = Arc::new(Mutex::new(Session::new(id, fragment.layout, now)));
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    fn retire(&self, id: u32) -> Option<Arc<Mutex<Session>>> {
        let session = self.sessions.write().remove(&id);
        self.finished.lock().insert(id);
        session
    }

    /// Explicit "no more data" signal for a transmission.
    ///
    /// # Errors
    /// `ReassemblyError::UnknownSession` if no session is open for `id`.
    pub fn end_of_transmission(&self, id: u32) -> Result<Assembled> {
        let session = self
            .retire(id)
            .ok_or(ReassemblyError::UnknownSession(id))?;
        let mut session = session.lock();
        // A concurrent insert may have completed it after we retired it
        if session.is_finished() {
            return Err(ReassemblyError::UnknownSession(id).into());
        }
        Ok(session.finish())
    }

    /// Close sessions idle for longer than the timeout.
    pub fn check_timeouts(&self) -> Vec<Assembled> {
        self.check_timeouts_at(Instant::now())
    }

    /// [`Reassembler::check_timeouts`] against an explicit clock reading.
    pub fn check_timeouts_at(&self, now: Instant) -> Vec<Assembled> {
        let expired: Vec<u32> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| {
                now.saturating_duration_since(session.lock().last_activity) >= self.timeout
            })
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                let session = self.retire(id)?;
                let mut session = session.lock();
                if session.is_finished() {
                    return None;
                }
                warn!(transmission_id = id, "session timed out");
                Some(session.finish())
            })
            .collect()
    }

    /// Drop a session and its buffered fragments. Returns whether it existed.
    pub fn cancel(&self, id: u32) -> bool {
        let existed = self.retire(id).is_some();
        if existed {
            info!(transmission_id = id, "session cancelled");
        }
        existed
    }

    /// Current state of an open session.
    pub fn state(&self, id: u32) -> Option<SessionState> {
        self.sessions.read().get(&id).map(|s| s.lock().state)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if no session is open.
    pub fn is_idle(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedundancyLevel;
    use crate::fragment::{fragment, TransmissionMeta};

    fn make_fragments(id: u32, len: usize, redundancy: RedundancyLevel) -> (Vec<u8>, Vec<Fragment>) {
        let stream: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
        let meta = TransmissionMeta {
            transmission_id: id,
            dictionary_version: 1,
            strict_morse: false,
        };
        let fragments = fragment(&stream, 8, redundancy, meta).unwrap();
        (stream, fragments)
    }

    fn reassembler() -> Reassembler {
        Reassembler::new(8, Duration::from_secs(30), 1)
    }

    #[test]
    fn test_in_order_completes() {
        let r = reassembler();
        let (stream, fragments) = make_fragments(1, 40, RedundancyLevel::None);

        let mut result = None;
        for frag in fragments {
            assert!(result.is_none());
            result = r.insert(frag).unwrap();
        }
        let assembled = result.unwrap();
        assert!(assembled.is_complete());
        assert_eq!(assembled.stream, stream);
        assert!(assembled.gaps.is_empty());
        assert!(r.is_idle());
    }

    #[test]
    fn test_out_of_order_and_duplicates() {
        let r = reassembler();
        let (stream, fragments) = make_fragments(2, 40, RedundancyLevel::None);

        r.insert(fragments[4].clone()).unwrap();
        r.insert(fragments[4].clone()).unwrap();
        r.insert(fragments[0].clone()).unwrap();
        r.insert(fragments[2].clone()).unwrap();
        r.insert(fragments[1].clone()).unwrap();
        assert_eq!(r.state(2), Some(SessionState::Collecting));
        let assembled = r.insert(fragments[3].clone()).unwrap().unwrap();

        assert_eq!(assembled.stream, stream);
        assert_eq!(assembled.stats.duplicates, 1);
        assert_eq!(assembled.stats.fragments_received, 5);

        // Late copy after completion is ignored.
        assert!(r.insert(fragments[0].clone()).unwrap().is_none());
        assert_eq!(r.state(2), None);
    }

    #[test]
    fn test_parity_repairs_single_loss() {
        let r = reassembler();
        let (stream, fragments) = make_fragments(3, 40, RedundancyLevel::Standard);
        // 5 data fragments, parity for groups 0..4 and 4..5.

        let mut result = None;
        for frag in fragments.into_iter().filter(|f| f.sequence_index != 2) {
            if let Some(done) = r.insert(frag).unwrap() {
                result = Some(done);
            }
        }
        let assembled = result.unwrap();
        assert!(assembled.is_complete());
        assert_eq!(assembled.stream, stream);
        assert_eq!(assembled.stats.recovered_fragments, 1);
    }

    #[test]
    fn test_two_losses_in_group_leave_one_gap() {
        let r = reassembler();
        let (stream, fragments) = make_fragments(4, 40, RedundancyLevel::Standard);

        for frag in fragments.into_iter().filter(|f| !matches!(f.sequence_index, 1 | 2)) {
            assert!(r.insert(frag).unwrap().is_none());
        }
        let assembled = r.end_of_transmission(4).unwrap();

        assert_eq!(assembled.state, SessionState::Failed);
        assert_eq!(assembled.gaps, vec![Gap { offset: 8, len: 16 }]);
        assert_eq!(assembled.missing, vec![1, 2]);
        assert_eq!(&assembled.stream[..8], &stream[..8]);
        assert_eq!(&assembled.stream[24..], &stream[24..]);
        assert_eq!(assembled.known_bytes()[8], None);
        assert_eq!(assembled.known_bytes()[7], Some(stream[7]));
    }

    #[test]
    fn test_corrupted_fragment_counts_and_resolves() {
        let r = reassembler();
        let (_, fragments) = make_fragments(5, 24, RedundancyLevel::None);

        let mut bad = fragments[1].serialize();
        bad[crate::fragment::HEADER_SIZE] ^= 0xFF;

        assert!(r.insert(fragments[0].clone()).unwrap().is_none());
        assert!(r.receive(&bad).unwrap().is_none());
        // Every index has now arrived or been confirmed corrupted.
        let assembled = r.insert(fragments[2].clone()).unwrap().unwrap();

        assert_eq!(assembled.state, SessionState::Failed);
        assert_eq!(assembled.stats.integrity_failures, 1);
        assert_eq!(assembled.gaps, vec![Gap { offset: 8, len: 8 }]);
    }

    #[test]
    fn test_dictionary_version_mismatch() {
        let r = reassembler();
        let (_, mut fragments) = make_fragments(6, 24, RedundancyLevel::None);
        fragments[0].layout.dictionary_version = 9;

        assert!(matches!(
            r.insert(fragments[0].clone()),
            Err(Error::DictionaryVersionMismatch { expected: 1, found: 9 })
        ));
        // The transmission is closed; nothing is produced afterwards.
        assert!(r.insert(fragments[1].clone()).unwrap().is_none());
        assert!(r.insert(fragments[2].clone()).unwrap().is_none());
        assert!(r.is_idle());
    }

    #[test]
    fn test_layout_mismatch_discarded() {
        let r = reassembler();
        let (_, fragments) = make_fragments(7, 24, RedundancyLevel::None);
        let (_, other) = make_fragments(7, 40, RedundancyLevel::None);

        r.insert(fragments[0].clone()).unwrap();
        assert!(r.insert(other[1].clone()).unwrap().is_none());
        r.insert(fragments[1].clone()).unwrap();
        let assembled = r.insert(fragments[2].clone()).unwrap().unwrap();
        assert_eq!(assembled.stats.layout_mismatches, 1);
        assert!(assembled.is_complete());
    }

    #[test]
    fn test_window_full() {
        let r = Reassembler::new(2, Duration::from_secs(30), 1);
        for id in [10, 11] {
            let (_, fragments) = make_fragments(id, 24, RedundancyLevel::None);
            r.insert(fragments[0].clone()).unwrap();
        }
        let (_, fragments) = make_fragments(12, 24, RedundancyLevel::None);
        assert!(matches!(
            r.insert(fragments[0].clone()),
            Err(Error::Reassembly(ReassemblyError::WindowFull { max: 2 }))
        ));
    }

    #[test]
    fn test_timeout_closes_session() {
        let r = Reassembler::new(8, Duration::from_millis(50), 1);
        let (_, fragments) = make_fragments(13, 24, RedundancyLevel::None);
        r.insert(fragments[0].clone()).unwrap();

        assert!(r.check_timeouts().is_empty());
        let closed = r.check_timeouts_at(Instant::now() + Duration::from_millis(60));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].state, SessionState::Failed);
        assert_eq!(closed[0].missing, vec![1, 2]);
        assert!(r.is_idle());
    }

    #[test]
    fn test_cancel_releases_session() {
        let r = reassembler();
        let (_, fragments) = make_fragments(14, 24, RedundancyLevel::None);
        r.insert(fragments[0].clone()).unwrap();

        assert!(r.cancel(14));
        assert!(!r.cancel(14));
        assert!(r.is_idle());
        assert!(r.insert(fragments[1].clone()).unwrap().is_none());
        assert!(matches!(
            r.end_of_transmission(14),
            Err(Error::Reassembly(ReassemblyError::UnknownSession(14)))
        ));
    }

    #[test]
    fn test_authentication_required() {
        let key = IntegrityKey::new(b"secret".to_vec()).unwrap();
        let r = reassembler().with_key(key.clone());
        let (_, fragments) = make_fragments(15, 16, RedundancyLevel::None);

        let mut sealed = fragments[0].clone();
        key.seal(&mut sealed).unwrap();
        r.insert(sealed).unwrap();
        // Unsealed fragment is rejected like a corrupted one.
        let assembled = r.insert(fragments[1].clone()).unwrap().unwrap();
        assert_eq!(assembled.stats.integrity_failures, 1);
        assert_eq!(assembled.missing, vec![1]);
    }

    #[test]
    fn test_end_of_transmission_racing_last_fragment() {
        use std::sync::Barrier;
        use std::thread;

        let (stream, fragments) = make_fragments(16, 16, RedundancyLevel::None);
        for _ in 0..500 {
            let r = reassembler();
            r.insert(fragments[0].clone()).unwrap();
            let barrier = Barrier::new(2);

            let (inserted, ended) = thread::scope(|s| {
                let inserter = s.spawn(|| {
                    barrier.wait();
                    r.insert(fragments[1].clone()).unwrap()
                });
                let ender = s.spawn(|| {
                    barrier.wait();
                    r.end_of_transmission(16).ok()
                });
                (inserter.join().unwrap(), ender.join().unwrap())
            });

            let delivered: Vec<Assembled> = inserted.into_iter().chain(ended).collect();
            assert_eq!(delivered.len(), 1);
            if delivered[0].is_complete() {
                assert_eq!(delivered[0].stream, stream);
            } else {
                assert_eq!(delivered[0].missing, vec![1]);
            }
            assert!(r.is_idle());
        }
    }

    #[test]
    fn test_timeout_skips_session_finished_elsewhere() {
        let r = reassembler();
        let (_, fragments) = make_fragments(17, 16, RedundancyLevel::None);
        let start = Instant::now();
        r.insert_at(fragments[0].clone(), start).unwrap();

        let session = r.sessions.read().get(&17).cloned().unwrap();
        session.lock().finish();

        let later = start + Duration::from_secs(60);
        assert!(r.check_timeouts_at(later).is_empty());
        assert!(r.is_idle());
        assert!(matches!(
            r.end_of_transmission(17),
            Err(Error::Reassembly(ReassemblyError::UnknownSession(17)))
        ));
    }

    #[test]
    fn test_finished_memory_is_bounded() {
        let mut finished = Finished::default();
        for id in 0..(FINISHED_MEMORY as u32 + 10) {
            finished.insert(id);
        }
        assert!(!finished.contains(0));
        assert!(finished.contains(FINISHED_MEMORY as u32 + 9));
        assert_eq!(finished.order.len(), FINISHED_MEMORY);
    }
}
