//! Sender and receiver pipelines.
//!
//! ```text
//! sender:   Node -> Compressor -> SymbolCodec -> pack -> fragment (-> seal)
//! receiver: bytes -> Reassembler -> unpack -> SymbolCodec -> decompress -> Node
//! ```
//!
//! Both ends are `Sync`. A [`Sender`] holds only read-only state and can
//! compress documents on many threads at once; a [`Receiver`] serializes
//! work per transmission inside its reassembler.

use crate::compressor::{decompress, decompress_partial, CompressionReport, Compressor};
use crate::config::{MorseMode, TransportConfig};
use crate::dictionary::StaticDictionary;
use crate::error::Result;
use crate::fragment::{fragment, Fragment, TransmissionMeta};
use crate::markup::{canonical_size, Node};
use crate::metrics::TransferStats;
use crate::reassembly::{Assembled, Gap, Reassembler};
use crate::security::IntegrityKey;
use crate::symbol::{pack, unpack, StreamUnit, Symbol, SymbolCodec, TimingModel};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything the sender hands to the transport adapter.
#[derive(Debug, Clone)]
pub struct Transmission {
    pub transmission_id: u32,
    /// Data fragments in sequence order, then parity
    pub fragments: Vec<Fragment>,
    pub dictionary_version: u8,
    /// Adaptive dictionary entries carried in the stream preamble
    pub preamble: Vec<String>,
    pub report: CompressionReport,
    pub stats: TransferStats,
}

impl Transmission {
    /// Fragments in wire form, in sending order.
    pub fn serialize(&self) -> Vec<Vec<u8>> {
        self.fragments.iter().map(Fragment::serialize).collect()
    }
}

/// Compresses, keys and fragments documents.
#[derive(Debug, Clone)]
pub struct Sender<'a> {
    statics: &'a StaticDictionary,
    config: TransportConfig,
    key: Option<IntegrityKey>,
}

impl<'a> Sender<'a> {
    /// # Errors
    /// `Error::Config` if `config` does not validate.
    pub fn new(statics: &'a StaticDictionary, config: TransportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            statics,
            config,
            key: None,
        })
    }

    /// Seal every fragment with an authentication tag.
    pub fn with_key(mut self, key: IntegrityKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Turn a canonical tree into fragments.
    ///
    /// # Errors
    /// - `Error::InvalidTree` if the tree cannot be compressed
    /// - `FragmentError::TooManyFragments` if the keyed stream is too long
    pub fn send(&self, tree: &Node, transmission_id: u32) -> Result<Transmission> {
        let compressed =
            Compressor::new(self.statics, self.config.compression_level).compress(tree)?;

        let codec = SymbolCodec::new(self.config.morse_mode);
        let symbols = codec.encode(&compressed.bytes);
        let packed = pack(&symbols)?;

        let meta = TransmissionMeta {
            transmission_id,
            dictionary_version: compressed.dictionary_version,
            strict_morse: self.config.morse_mode == MorseMode::Strict,
        };
        let mut fragments = fragment(
            &packed,
            self.config.max_fragment_size,
            self.config.redundancy_level,
            meta,
        )?;
        if let Some(key) = &self.key {
            for frag in &mut fragments {
                key.seal(frag)?;
            }
        }

        let timing = TimingModel::new(self.config.wpm);
        let stats = TransferStats {
            compression_ratio: compressed.report.ratio,
            fragments_sent: fragments.len(),
            symbols: symbols.len(),
            keying_time: timing.duration(&codec.frame(&symbols)),
            ..TransferStats::default()
        };
        info!(
            transmission_id,
            compressed = compressed.report.compressed_size,
            symbols = stats.symbols,
            fragments = stats.fragments_sent,
            "transmission prepared"
        );

        Ok(Transmission {
            transmission_id,
            fragments,
            dictionary_version: compressed.dictionary_version,
            preamble: compressed.preamble,
            report: compressed.report,
            stats,
        })
    }
}

/// A document recovered with unrecoverable spans.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialDocument {
    /// Recovered tree with `Lost` markers where data is missing
    pub tree: Node,
    /// Unrecovered spans of the packed stream
    pub gaps: Vec<Gap>,
}

impl PartialDocument {
    pub fn lost_markers(&self) -> usize {
        self.tree.lost_markers()
    }
}

/// What the receiver delivers for one transmission.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Complete(Node),
    Partial(PartialDocument),
}

/// A finished reception.
#[derive(Debug, Clone)]
pub struct Reception {
    pub transmission_id: u32,
    pub delivery: Delivery,
    pub stats: TransferStats,
}

impl Reception {
    pub fn is_complete(&self) -> bool {
        matches!(self.delivery, Delivery::Complete(_))
    }

    /// The delivered tree, complete or not.
    pub fn tree(&self) -> &Node {
        match &self.delivery {
            Delivery::Complete(tree) => tree,
            Delivery::Partial(partial) => &partial.tree,
        }
    }
}

/// Reassembles fragments and decodes finished streams back into trees.
#[derive(Debug)]
pub struct Receiver<'a> {
    statics: &'a StaticDictionary,
    reassembler: Reassembler,
    timing: TimingModel,
}

impl<'a> Receiver<'a> {
    pub fn new(statics: &'a StaticDictionary, config: &TransportConfig) -> Self {
        Self {
            statics,
            reassembler: Reassembler::from_config(config, statics.version()),
            timing: TimingModel::new(config.wpm),
        }
    }

    /// Require authentication tags on every fragment.
    pub fn with_key(mut self, key: IntegrityKey) -> Self {
        self.reassembler = self.reassembler.with_key(key);
        self
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    /// Feed one serialized fragment.
    ///
    /// # Errors
    /// Parse errors of this fragment (local, see `Error::is_fatal`), and the
    /// fatal errors of [`Receiver::insert`].
    pub fn receive(&self, bytes: &[u8]) -> Result<Option<Reception>> {
        self.decode_finished(self.reassembler.receive(bytes)?)
    }

    /// Feed one parsed fragment.
    ///
    /// # Errors
    /// - `Error::DictionaryVersionMismatch`, without any partial output
    /// - `ReassemblyError::WindowFull`
    /// - `Error::MalformedStream` if a stream that arrived whole does not decode
    pub fn insert(&self, fragment: Fragment) -> Result<Option<Reception>> {
        self.decode_finished(self.reassembler.insert(fragment)?)
    }

    fn decode_finished(&self, assembled: Option<Assembled>) -> Result<Option<Reception>> {
        assembled.map(|a| self.decode(a)).transpose()
    }

    /// Close a transmission whose channel has gone quiet.
    ///
    /// # Errors
    /// `ReassemblyError::UnknownSession`, or a decoding error.
    pub fn end_of_transmission(&self, transmission_id: u32) -> Result<Reception> {
        let assembled = self.reassembler.end_of_transmission(transmission_id)?;
        self.decode(assembled)
    }

    /// Close and decode sessions that have been idle past the timeout.
    pub fn check_timeouts(&self) -> Vec<Result<Reception>> {
        self.check_timeouts_at(Instant::now())
    }

    pub fn check_timeouts_at(&self, now: Instant) -> Vec<Result<Reception>> {
        self.reassembler
            .check_timeouts_at(now)
            .into_iter()
            .map(|assembled| self.decode(assembled))
            .collect()
    }

    /// Abandon a transmission; nothing is delivered for it.
    pub fn cancel(&self, transmission_id: u32) -> bool {
        self.reassembler.cancel(transmission_id)
    }

    /// Decode a finished session into a reception.
    ///
    /// # Errors
    /// - `Error::DictionaryVersionMismatch` if the stream header declares
    ///   another version
    /// - `Error::MalformedStream` if the stream arrived whole but does not decode
    pub fn decode(&self, assembled: Assembled) -> Result<Reception> {
        let mode = if assembled.layout.strict_morse {
            MorseMode::Strict
        } else {
            MorseMode::Optimized
        };
        let codec = SymbolCodec::new(mode);

        let (units, symbols) = if assembled.is_complete() {
            let symbols = unpack(&assembled.stream)?;
            (codec.decode(&symbols), symbols)
        } else {
            let erased = erased_symbols(&assembled.known_bytes());
            let known: Vec<Symbol> = erased.iter().flatten().copied().collect();
            (codec.decode_with_erasures(&erased), known)
        };

        let bytes: Option<Vec<u8>> = units
            .iter()
            .map(|unit| match unit {
                StreamUnit::Byte(byte) => Some(*byte),
                StreamUnit::Unknown => None,
            })
            .collect();

        let delivery = match bytes {
            Some(bytes) if assembled.is_complete() => {
                Delivery::Complete(decompress(&bytes, self.statics)?)
            }
            _ => {
                let tree = decompress_partial(&units, self.statics)?;
                warn!(
                    transmission_id = assembled.transmission_id,
                    gaps = assembled.gaps.len(),
                    lost = tree.lost_markers(),
                    "delivering partial document"
                );
                Delivery::Partial(PartialDocument {
                    tree,
                    gaps: assembled.gaps.clone(),
                })
            }
        };

        let tree = match &delivery {
            Delivery::Complete(tree) => tree,
            Delivery::Partial(partial) => &partial.tree,
        };
        let session = assembled.stats;
        let stats = TransferStats {
            compression_ratio: units.len() as f64 / canonical_size(tree).max(1) as f64,
            fragments_sent: session.fragments_expected,
            fragments_received: session.fragments_received,
            duplicates: session.duplicates,
            integrity_failures: session.integrity_failures,
            recovered_fragments: session.recovered_fragments,
            unrecoverable_gaps: assembled.gaps.len(),
            symbols: symbols.len(),
            keying_time: self.timing.duration(&codec.frame(&symbols)),
        };
        debug!(
            transmission_id = assembled.transmission_id,
            units = units.len(),
            "decoded stream"
        );

        Ok(Reception {
            transmission_id: assembled.transmission_id,
            delivery,
            stats,
        })
    }
}

/// Unpack a stream with holes; every lost byte erases its four symbols.
fn erased_symbols(bytes: &[Option<u8>]) -> Vec<Option<Symbol>> {
    let mut symbols = Vec::with_capacity(bytes.len() * 4);
    for byte in bytes {
        match byte {
            Some(byte) => {
                for shift in [6, 4, 2, 0] {
                    symbols.push(Some(Symbol::from_bits(byte >> shift)));
                }
            }
            None => symbols.extend([None; 4]),
        }
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedundancyLevel;
    use crate::error::Error;
    use crate::markup::TagKind;

    fn document() -> Node {
        Node::document(vec![
            Node::leaf(TagKind::H1, "Bulletin"),
            Node::leaf(TagKind::Paragraph, "Le réseau est actif."),
        ])
    }

    fn config() -> TransportConfig {
        TransportConfig {
            max_fragment_size: 8,
            ..TransportConfig::default()
        }
    }

    #[test]
    fn test_round_trip_through_fragments() {
        let statics = StaticDictionary::builtin();
        let sender = Sender::new(statics, config()).unwrap();
        let receiver = Receiver::new(statics, &config());

        let transmission = sender.send(&document(), 11).unwrap();
        assert!(transmission.stats.symbols > 0);
        assert!(transmission.stats.keying_time > std::time::Duration::ZERO);

        let mut reception = None;
        for bytes in transmission.serialize() {
            if let Some(done) = receiver.receive(&bytes).unwrap() {
                reception = Some(done);
            }
        }
        let reception = reception.unwrap();
        assert!(reception.is_complete());
        assert_eq!(reception.tree(), &document());
        assert_eq!(reception.stats.fragments_sent, transmission.fragments.len());
    }

    #[test]
    fn test_air_time_covers_procedure_signs() {
        let statics = StaticDictionary::builtin();
        let config = config();
        let sender = Sender::new(statics, config.clone()).unwrap();
        let transmission = sender.send(&document(), 12).unwrap();

        let compressed = Compressor::new(statics, config.compression_level)
            .compress(&document())
            .unwrap();
        let codec = SymbolCodec::new(config.morse_mode);
        let body = codec.encode(&compressed.bytes);
        let timing = TimingModel::new(config.wpm);

        assert_eq!(transmission.stats.symbols, body.len());
        assert_eq!(
            transmission.stats.keying_time,
            timing.duration(&codec.frame(&body))
        );
        assert!(transmission.stats.keying_time > timing.duration(&body));
    }

    #[test]
    fn test_strict_mode_round_trip() {
        let statics = StaticDictionary::builtin();
        let config = TransportConfig {
            morse_mode: MorseMode::Strict,
            redundancy_level: RedundancyLevel::None,
            ..config()
        };
        let sender = Sender::new(statics, config.clone()).unwrap();
        let receiver = Receiver::new(statics, &config);

        let transmission = sender.send(&document(), 12).unwrap();
        assert!(transmission.fragments[0].layout.strict_morse);
        let mut last = None;
        for frag in transmission.fragments {
            last = receiver.insert(frag).unwrap();
        }
        assert_eq!(last.unwrap().delivery, Delivery::Complete(document()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TransportConfig {
            max_fragment_size: 0,
            ..TransportConfig::default()
        };
        assert!(matches!(
            Sender::new(StaticDictionary::builtin(), config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_erased_symbols() {
        let symbols = erased_symbols(&[Some(0b01_10_11_00), None]);
        assert_eq!(
            &symbols[..4],
            &[
                Some(Symbol::Dot),
                Some(Symbol::Dash),
                Some(Symbol::WordGap),
                Some(Symbol::Gap)
            ]
        );
        assert_eq!(&symbols[4..], &[None; 4]);
    }
}
