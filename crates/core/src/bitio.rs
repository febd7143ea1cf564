//! Bit-level I/O used to pack keyed symbols into fragment payloads.
//!
//! The Morse alphabet has four symbols, so each one occupies two bits.
//! Both writer and reader work MSB-first.
//!
//! # Padding Rules
//! - BitWriter: pads the final partial byte with zero bits
//! - BitReader: hands padding back like data; zero pairs decode as inter-character
//!   gaps, which the symbol decoder ignores at the end of a stream
//!
//! # Example
//! ```
//! use mml_morse_core::bitio::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b01, 2).unwrap(); // dot
//! writer.write_bits(0b10, 2).unwrap(); // dash
//! let bytes = writer.finish();
//! assert_eq!(bytes, vec![0b0110_0000]);
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_bits(2).unwrap(), 0b01);
//! assert_eq!(reader.read_bits(2).unwrap(), 0b10);
//! ```

use crate::error::{BitIoError, Result};

/// Writes bits MSB-first into a byte buffer.
///
/// # Invariants
/// - `bit_count` is always < 8
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// Completed bytes
    bytes: Vec<u8>,
    /// Accumulator for the current partial byte (MSB-aligned)
    bit_buffer: u8,
    /// Number of bits in bit_buffer (0-7)
    bit_count: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `bits` bits.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            bit_buffer: 0,
            bit_count: 0,
        }
    }

    /// Write the lowest `count` bits of `value`, most significant first.
    ///
    /// # Errors
    /// Returns `BitIoError::InvalidBitCount` if count > 64.
    pub fn write_bits(&mut self, value: u64, count: usize) -> Result<()> {
        if count > 64 {
            return Err(BitIoError::InvalidBitCount(count).into());
        }

        let mut remaining = count;
        while remaining > 0 {
            let room = 8 - self.bit_count as usize;
            let take = remaining.min(room);
            let shift = remaining - take;
            let bits = ((value >> shift) & ((1u64 << take) - 1)) as u8;

            self.bit_buffer |= bits << (room - take);
            self.bit_count += take as u8;

            if self.bit_count == 8 {
                self.bytes.push(self.bit_buffer);
                self.bit_buffer = 0;
                self.bit_count = 0;
            }
            remaining -= take;
        }

        Ok(())
    }

    /// Finish writing and return the output bytes, zero-padded.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.bytes.push(self.bit_buffer);
        }
        self.bytes
    }

    /// Total number of bits written (including partial byte).
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.bit_count as usize
    }
}

/// Reads bits MSB-first from a byte buffer.
///
/// # Invariants
/// - `bit_position` never exceeds `data.len() * 8`
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Current bit position (0 = MSB of first byte)
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    /// Read `count` bits (0-64), most significant first.
    ///
    /// # Errors
    /// - `BitIoError::InvalidBitCount` if count > 64
    /// - `BitIoError::UnexpectedEof` if not enough bits remain
    pub fn read_bits(&mut self, count: usize) -> Result<u64> {
        if count > 64 {
            return Err(BitIoError::InvalidBitCount(count).into());
        }
        if count > self.bits_remaining() {
            return Err(BitIoError::UnexpectedEof.into());
        }

        let mut result = 0u64;
        let mut remaining = count;

        while remaining > 0 {
            let byte = self.data[self.bit_position / 8];
            let available = 8 - self.bit_position % 8;
            let take = remaining.min(available);
            let mask = ((1u16 << take) - 1) as u8;
            let bits = (byte >> (available - take)) & mask;

            result = (result << take) | bits as u64;
            self.bit_position += take;
            remaining -= take;
        }

        Ok(result)
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.bit_position
    }

    pub fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }
}
