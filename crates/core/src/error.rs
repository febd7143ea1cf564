//! Error types for the document transport pipeline.
//!
//! Errors are split by how far their damage reaches:
//! - Fragment and symbol errors are local: the fragment is discarded or the
//!   symbol group becomes a gap candidate, and the session carries on.
//! - Dictionary version and malformed stream errors are fatal for a session:
//!   the remaining stream cannot be decoded safely.
//!
//! Unsupported tags and unrecoverable gaps are not errors at all. They are
//! recorded as losses (`normalize::LossReport`, `reassembly::Gap`).

use thiserror::Error;

/// Top-level error type for all operations in the system.
#[derive(Debug, Error)]
pub enum Error {
    /// Bit I/O operation failed (e.g., reading past end of buffer)
    #[error("bit I/O error: {0}")]
    BitIo(#[from] BitIoError),

    /// Symbol codec error
    #[error("symbol codec error: {0}")]
    Symbol(#[from] SymbolError),

    /// Fragment parsing, validation or construction error
    #[error("fragment error: {0}")]
    Fragment(#[from] FragmentError),

    /// Reassembly error (window full, unknown session)
    #[error("reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    /// The stream declares a static dictionary version this build does not carry
    #[error("dictionary version mismatch: receiver has v{expected}, stream declares v{found}")]
    DictionaryVersionMismatch { expected: u8, found: u8 },

    /// The compressed stream cannot be decoded
    #[error("malformed stream at byte {offset}: {reason}")]
    MalformedStream { offset: usize, reason: String },

    /// The document tree breaks the canonical model and cannot be compressed
    #[error("invalid document tree: {0}")]
    InvalidTree(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedStream {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether this error ends the transmission session it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DictionaryVersionMismatch { .. } | Error::MalformedStream { .. }
        )
    }
}

/// Bit-level I/O errors.
#[derive(Debug, Error)]
pub enum BitIoError {
    /// Attempted to read past the end of the buffer
    #[error("unexpected end of bit stream")]
    UnexpectedEof,

    /// Invalid bit count (e.g., requesting more than 64 bits)
    #[error("invalid bit count: {0}")]
    InvalidBitCount(usize),
}

/// Symbol codec errors.
#[derive(Debug, Error)]
pub enum SymbolError {
    /// Input character has no code in the active table
    #[error("unmappable symbol {symbol:?} at offset {offset}")]
    UnmappableSymbol { symbol: char, offset: usize },

    /// A received dot/dash group matches no code
    #[error("unknown symbol group #{group}")]
    UnknownSymbol { group: usize },
}

/// Fragment errors.
#[derive(Debug, Error)]
pub enum FragmentError {
    /// Invalid magic number in fragment header
    #[error("invalid fragment magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 2], actual: [u8; 2] },

    /// Buffer too short to contain the header or the declared payload
    #[error("fragment too short: need at least {required} bytes, got {actual}")]
    TooShort { required: usize, actual: usize },

    /// Total length disagrees with the declared payload length
    #[error("fragment length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Header fields contradict each other
    #[error("inconsistent fragment header: {0}")]
    InvalidLayout(&'static str),

    /// Header checksum does not match; metadata cannot be trusted
    #[error("fragment header corrupted: expected crc {expected:#010x}, got {actual:#010x}")]
    HeaderCorrupted { expected: u32, actual: u32 },

    /// Payload digest does not match
    #[error("fragment {index} failed integrity check: expected {expected:#010x}, got {actual:#010x}")]
    IntegrityFailure {
        index: u16,
        expected: u32,
        actual: u32,
    },

    /// Authentication tag missing or wrong
    #[error("fragment {index} failed authentication")]
    AuthenticationFailure { index: u16 },

    /// Sequence index out of range
    #[error("sequence_index {index} >= total_fragments {total}")]
    InvalidIndex { index: u16, total: u16 },

    /// Fragment size limit outside the supported range
    #[error("invalid max fragment size {0}")]
    InvalidSize(usize),

    /// Stream needs more fragments than the header can address
    #[error("stream of {len} bytes needs {needed} fragments, limit is {limit}")]
    TooManyFragments {
        len: usize,
        needed: usize,
        limit: usize,
    },
}

/// Reassembly errors.
#[derive(Debug, Error)]
pub enum ReassemblyError {
    /// Session window is full (too many transmissions in flight)
    #[error("reassembly window full: max {max} sessions in flight")]
    WindowFull { max: usize },

    /// No session exists for the given transmission
    #[error("unknown transmission {0}")]
    UnknownSession(u32),
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;
