//! mml-morse-core: document transport over a Morse radio link
//!
//! This library provides the pipeline that carries small structured
//! documents across a slow, lossy channel:
//! - Normalizes source markup into the fixed MML tag set
//! - Compresses MML trees with a shared token dictionary (MML-C)
//! - Keys the compressed stream as Morse symbols, two bits each
//! - Fragments the keyed stream with XOR parity for forward error correction
//! - Reassembles fragments and decodes complete or partial documents
//!
//! # Architecture
//!
//! ```text
//!  SourceNode ──normalize──► Node ──Compressor──► MML-C ──SymbolCodec──► symbols
//!                                                                          │ pack
//!  Node ◄──decompress── MML-C ◄──SymbolCodec── symbols ◄──Reassembler◄── fragments
//! ```
//!
//! - `markup`: MML tag set and document tree
//! - `normalize`: lossy mapping from arbitrary markup to MML
//! - `dictionary`: static and adaptive token tables
//! - `compressor`: MML-C encoder and (partial) decoder
//! - `bitio`: two-bit symbol packing
//! - `symbol`: Morse symbol codec and keying time model
//! - `fragment`: fragment wire format and parity groups
//! - `security`: optional HMAC fragment tags
//! - `reassembly`: bounded, thread-safe fragment reassembly
//! - `pipeline`: sender and receiver built from the stages above
//! - `channel`: seeded lossy channel simulator
//! - `metrics`: transfer statistics
//!
//! # Design Principles
//!
//! - **No panics**: All errors are structured; damaged input never aborts
//! - **Bounded memory**: Session count and fragment sizes have fixed limits
//! - **Deterministic**: Same tree and configuration give the same fragments
//! - **Degrade, don't fail**: Unrecoverable loss yields a partial document

pub mod bitio;
pub mod channel;
pub mod compressor;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod fragment;
pub mod markup;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod reassembly;
pub mod security;
pub mod symbol;

// Re-export commonly used types
pub use config::{CompressionLevel, MorseMode, RedundancyLevel, TransportConfig};
pub use dictionary::StaticDictionary;
pub use error::{Error, Result};
pub use markup::{Node, TagKind};
pub use normalize::{normalize, SourceNode};
pub use pipeline::{Delivery, PartialDocument, Reception, Receiver, Sender, Transmission};
