//! Transport configuration.
//!
//! One record drives both ends of a transmission. The sender reads the
//! compression, keying and fragmentation options; the receiver reads the
//! session window and timeout. Parameters are never negotiated on air: both
//! stations are expected to be configured alike, and the few values the
//! receiver must know (dictionary version, keying mode, layout) travel in
//! every fragment header.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Largest payload a single fragment may carry.
pub const MAX_FRAGMENT_SIZE_LIMIT: usize = 4096;

/// How hard the compressor works on text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionLevel {
    /// Static dictionary only
    Light,
    /// Static dictionary plus an adaptive table of long repeated words
    #[default]
    Standard,
    /// Adaptive table also admits shorter words and longer phrases
    Aggressive,
}

/// Thresholds for building the adaptive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveParams {
    /// Minimum candidate length in bytes
    pub min_len: usize,
    /// Longest phrase considered, in words
    pub max_phrase_words: usize,
    /// Minimum number of occurrences
    pub min_frequency: usize,
}

impl CompressionLevel {
    /// Adaptive table thresholds, or `None` when the level uses the static table only.
    pub fn adaptive_params(self) -> Option<AdaptiveParams> {
        match self {
            CompressionLevel::Light => None,
            CompressionLevel::Standard => Some(AdaptiveParams {
                min_len: 5,
                max_phrase_words: 2,
                min_frequency: 2,
            }),
            CompressionLevel::Aggressive => Some(AdaptiveParams {
                min_len: 4,
                max_phrase_words: 3,
                min_frequency: 2,
            }),
        }
    }
}

/// Keying table used by the symbol codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MorseMode {
    /// Every byte as two ITU hex digits; copyable with a standard chart
    Strict,
    /// One dot/dash group per byte, shortest groups for the most frequent bytes
    #[default]
    Optimized,
}

/// Amount of parity added by the fragmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RedundancyLevel {
    None,
    Low,
    #[default]
    Standard,
    High,
}

impl RedundancyLevel {
    /// Data fragments covered by one parity fragment, `None` without parity.
    pub fn group_size(self) -> Option<usize> {
        match self {
            RedundancyLevel::None => None,
            RedundancyLevel::Low => Some(8),
            RedundancyLevel::Standard => Some(4),
            RedundancyLevel::High => Some(2),
        }
    }
}

macro_rules! text_enum {
    ($ty:ty, $what:literal, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($variant => $name,)+
                };
                f.write_str(name)
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(Error::Config(format!("unknown {}: {other:?}", $what))),
                }
            }
        }
    };
}

text_enum!(CompressionLevel, "compression level", {
    CompressionLevel::Light => "light",
    CompressionLevel::Standard => "standard",
    CompressionLevel::Aggressive => "aggressive",
});

text_enum!(MorseMode, "morse mode", {
    MorseMode::Strict => "strict",
    MorseMode::Optimized => "optimized",
});

text_enum!(RedundancyLevel, "redundancy level", {
    RedundancyLevel::None => "none",
    RedundancyLevel::Low => "low",
    RedundancyLevel::Standard => "standard",
    RedundancyLevel::High => "high",
});

/// Options recognized by the transport core.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub compression_level: CompressionLevel,
    pub morse_mode: MorseMode,
    /// Payload bytes per fragment (1..=4096)
    pub max_fragment_size: usize,
    pub redundancy_level: RedundancyLevel,
    /// Inactivity after which a receiving session is closed
    pub session_timeout: Duration,
    /// Keying speed, used for timing estimates only
    pub wpm: u32,
    /// Receiving sessions tracked at once
    pub max_sessions: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            compression_level: CompressionLevel::Standard,
            morse_mode: MorseMode::Optimized,
            max_fragment_size: 64,
            redundancy_level: RedundancyLevel::Standard,
            session_timeout: Duration::from_secs(30),
            wpm: 20,
            max_sessions: 64,
        }
    }
}

impl TransportConfig {
    /// Check value ranges.
    ///
    /// # Errors
    /// `Error::Config` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if self.max_fragment_size == 0 || self.max_fragment_size > MAX_FRAGMENT_SIZE_LIMIT {
            return Err(Error::Config(format!(
                "max_fragment_size must be in 1..={MAX_FRAGMENT_SIZE_LIMIT}, got {}",
                self.max_fragment_size
            )));
        }
        if self.session_timeout.is_zero() {
            return Err(Error::Config("session_timeout must be positive".into()));
        }
        if self.wpm == 0 || self.wpm > 100 {
            return Err(Error::Config(format!(
                "wpm must be in 1..=100, got {}",
                self.wpm
            )));
        }
        if self.max_sessions == 0 {
            return Err(Error::Config("max_sessions must be at least 1".into()));
        }
        Ok(())
    }
}
