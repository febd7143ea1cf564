//! Morse symbol codec.
//!
//! Maps the compressed byte stream to keyed symbols and back. Two keying
//! tables exist:
//!
//! - **Optimized**: each byte is one dot/dash group. Groups are ranked by
//!   keyed duration and handed out along a fixed ranking of MML-C bytes, so
//!   spaces, common letters and the string terminator key fastest.
//! - **Strict**: each byte is two ITU hex digits (`0`-`9`, `A`-`F`) followed
//!   by a word space, which any operator can copy with a standard chart.
//!
//! Groups are delimited by explicit gaps, so decoding is self-synchronizing:
//! an erased or garbled group yields one [`StreamUnit::Unknown`] and the
//! next separator restores alignment.
//!
//! Procedure signs ([`Prosign`]) open and close a keyed transmission. Their
//! groups lie outside the byte table of either mode, so they never read
//! back as data.
//!
//! # Timing
//!
//! PARIS timing, in dot units:
//!
//! ```text
//! dot 1 | dash 3 | intra-character space 1 | character gap 3 | word gap 7
//! ```
//!
//! At `wpm` words per minute a unit lasts `1200 / wpm` milliseconds.

use crate::bitio::{BitReader, BitWriter};
use crate::config::MorseMode;
use crate::dictionary::{opcode, TAG_BASE, WORD_BASE};
use crate::error::{Result, SymbolError};
use crate::markup::TagKind;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Transmission alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Dot,
    Dash,
    /// Inter-character gap
    Gap,
    /// Inter-word gap
    WordGap,
}

impl Symbol {
    /// Two-bit wire form.
    pub fn bits(self) -> u8 {
        match self {
            Symbol::Gap => 0b00,
            Symbol::Dot => 0b01,
            Symbol::Dash => 0b10,
            Symbol::WordGap => 0b11,
        }
    }

    pub fn from_bits(bits: u8) -> Symbol {
        match bits & 0b11 {
            0b00 => Symbol::Gap,
            0b01 => Symbol::Dot,
            0b10 => Symbol::Dash,
            _ => Symbol::WordGap,
        }
    }

    pub fn is_mark(self) -> bool {
        matches!(self, Symbol::Dot | Symbol::Dash)
    }

    /// Keyed length in dot units, not counting intra-character spacing.
    pub fn units(self) -> u64 {
        match self {
            Symbol::Dot => 1,
            Symbol::Dash | Symbol::Gap => 3,
            Symbol::WordGap => 7,
        }
    }
}

/// One decoded position of the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamUnit {
    Byte(u8),
    /// One or more bytes that could not be recovered
    Unknown,
}

struct KeyingTable {
    codes: Vec<Vec<Symbol>>,
    bytes: HashMap<Vec<Symbol>, u8>,
    /// Groups ranked right after the byte table, one per [`Prosign`]
    prosigns: Vec<Vec<Symbol>>,
}

/// Procedure signs, keyed as one run-together group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prosign {
    /// Start of message (`<BT>`)
    Bt,
    /// End of message (`<AR>`)
    Ar,
    /// Invitation to a named station only (`<KN>`)
    Kn,
    /// End of contact (`<SK>`)
    Sk,
}

impl Prosign {
    pub const ALL: [Prosign; 4] = [Prosign::Bt, Prosign::Ar, Prosign::Kn, Prosign::Sk];

    pub fn name(self) -> &'static str {
        match self {
            Prosign::Bt => "BT",
            Prosign::Ar => "AR",
            Prosign::Kn => "KN",
            Prosign::Sk => "SK",
        }
    }

    /// ITU keying of the two letters without the character gap.
    fn itu(self) -> &'static str {
        match self {
            Prosign::Bt => "-...-",
            Prosign::Ar => ".-.-.",
            Prosign::Kn => "-.--.",
            Prosign::Sk => "...-.-",
        }
    }
}

fn marks(code: &str) -> Vec<Symbol> {
    code.chars()
        .map(|c| if c == '.' { Symbol::Dot } else { Symbol::Dash })
        .collect()
}

/// Keyed duration of a group including its intra-character spaces.
fn group_duration(group: &[Symbol]) -> u64 {
    let marks: u64 = group.iter().map(|s| s.units()).sum();
    marks + group.len().saturating_sub(1) as u64
}

/// MML-C bytes from most to least frequent over the reference corpus.
fn byte_ranking() -> Vec<u8> {
    let tag = |t: TagKind| TAG_BASE + t.index() as u8;
    let head = [
        b' ',
        b'e',
        opcode::STR_END,
        opcode::TEXT,
        b't',
        b'a',
        b'o',
        b'i',
        b'n',
        b's',
        b'r',
        b'h',
        b'l',
        b'd',
        b'c',
        b'u',
        b'm',
        opcode::END,
        tag(TagKind::Paragraph),
        opcode::TEXT_CHILD,
        b'p',
        b'f',
        b'g',
        b'.',
        b'y',
        b'w',
        b'b',
        b',',
        b'v',
        b'k',
        tag(TagKind::ListItem),
        WORD_BASE + 3,
        WORD_BASE,
        WORD_BASE + 1,
        WORD_BASE + 2,
        WORD_BASE + 6,
        opcode::ATTR,
        tag(TagKind::Strong),
        tag(TagKind::Link),
        tag(TagKind::H1),
        tag(TagKind::H2),
        opcode::CAP,
        opcode::EXT,
        opcode::LIT,
        b'T',
        b'S',
        b'A',
        b'C',
        b'M',
        b'I',
        b'P',
        b'L',
        b'D',
        b'R',
        b'0',
        b'1',
        b'2',
        b'3',
        b'4',
        b'5',
        b'6',
        b'7',
        b'8',
        b'9',
        b'x',
        b'j',
        b'q',
        b'z',
        b'\'',
        b':',
        b'-',
        b'/',
    ];

    let mut seen = [false; 256];
    let mut ranked = Vec::with_capacity(256);
    for byte in head.into_iter().chain(0..=255u8) {
        if !seen[usize::from(byte)] {
            seen[usize::from(byte)] = true;
            ranked.push(byte);
        }
    }
    ranked
}

fn optimized_table() -> &'static KeyingTable {
    static TABLE: OnceLock<KeyingTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut groups: Vec<Vec<Symbol>> = Vec::new();
        for len in 1..=12u32 {
            for pattern in 0..(1u32 << len) {
                let group = (0..len)
                    .rev()
                    .map(|bit| {
                        if pattern >> bit & 1 == 1 {
                            Symbol::Dash
                        } else {
                            Symbol::Dot
                        }
                    })
                    .collect();
                groups.push(group);
            }
        }
        groups.sort_by(|a, b| {
            group_duration(a)
                .cmp(&group_duration(b))
                .then(a.len().cmp(&b.len()))
                .then_with(|| a.cmp(b))
        });

        let mut groups = groups.into_iter();
        let mut codes = vec![Vec::new(); 256];
        let mut bytes = HashMap::with_capacity(256);
        for (byte, group) in byte_ranking().into_iter().zip(groups.by_ref()) {
            bytes.insert(group.clone(), byte);
            codes[usize::from(byte)] = group;
        }
        let prosigns = groups.take(Prosign::ALL.len()).collect();
        KeyingTable {
            codes,
            bytes,
            prosigns,
        }
    })
}

const ITU_CODES: [(char, &str); 54] = [
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    ('0', "-----"),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    ('.', ".-.-.-"),
    (',', "--..--"),
    ('?', "..--.."),
    ('\'', ".----."),
    ('!', "-.-.--"),
    ('/', "-..-."),
    ('(', "-.--."),
    (')', "-.--.-"),
    ('&', ".-..."),
    (':', "---..."),
    (';', "-.-.-."),
    ('=', "-...-"),
    ('+', ".-.-."),
    ('-', "-....-"),
    ('_', "..--.-"),
    ('"', ".-..-."),
    ('@', ".--.-."),
    ('É', "..-.."),
];

struct ItuTable {
    by_char: HashMap<char, Vec<Symbol>>,
    by_code: HashMap<Vec<Symbol>, char>,
}

fn itu_table() -> &'static ItuTable {
    static TABLE: OnceLock<ItuTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut by_char = HashMap::with_capacity(ITU_CODES.len());
        let mut by_code = HashMap::with_capacity(ITU_CODES.len());
        for (ch, code) in ITU_CODES {
            let group = marks(code);
            by_char.insert(ch, group.clone());
            by_code.insert(group, ch);
        }
        ItuTable { by_char, by_code }
    })
}

fn hex_digit(value: u8) -> char {
    char::from_digit(u32::from(value & 0x0F), 16)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('0')
}

/// Byte-to-symbol codec for one keying mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolCodec {
    mode: MorseMode,
}

impl SymbolCodec {
    pub fn new(mode: MorseMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MorseMode {
        self.mode
    }

    /// Keyed group for one byte.
    pub fn code(&self, byte: u8) -> Vec<Symbol> {
        match self.mode {
            MorseMode::Optimized => optimized_table().codes[usize::from(byte)].clone(),
            MorseMode::Strict => {
                let itu = itu_table();
                let mut group = Vec::with_capacity(11);
                for digit in [hex_digit(byte >> 4), hex_digit(byte)] {
                    if !group.is_empty() {
                        group.push(Symbol::Gap);
                    }
                    group.extend(itu.by_char.get(&digit).into_iter().flatten());
                }
                group
            }
        }
    }

    fn separator(&self) -> Symbol {
        match self.mode {
            MorseMode::Optimized => Symbol::Gap,
            MorseMode::Strict => Symbol::WordGap,
        }
    }

    pub fn encode(&self, bytes: &[u8]) -> Vec<Symbol> {
        let mut symbols = Vec::with_capacity(bytes.len() * 6);
        for &byte in bytes {
            symbols.extend(self.code(byte));
            symbols.push(self.separator());
        }
        symbols
    }

    /// Keyed group for a procedure sign. Strict mode uses the ITU keying,
    /// which no hex digit shares; optimized mode uses the groups ranked
    /// right after the byte table.
    pub fn prosign(&self, sign: Prosign) -> Vec<Symbol> {
        match self.mode {
            MorseMode::Optimized => {
                optimized_table().prosigns[sign as usize].clone()
            }
            MorseMode::Strict => marks(sign.itu()),
        }
    }

    /// Wrap an encoded stream in `<BT>` ... `<AR>`.
    pub fn frame(&self, symbols: &[Symbol]) -> Vec<Symbol> {
        let mut framed = self.prosign(Prosign::Bt);
        framed.push(self.separator());
        framed.extend_from_slice(symbols);
        if framed.last().is_some_and(|s| s.is_mark()) {
            framed.push(self.separator());
        }
        framed.extend(self.prosign(Prosign::Ar));
        framed.push(self.separator());
        framed
    }

    /// Strip a leading `<BT>` and a trailing `<AR>` group if present.
    /// Trailing gaps from packing padding are ignored.
    pub fn unframe<'s>(&self, symbols: &'s [Symbol]) -> &'s [Symbol] {
        let mut body = symbols;

        let start = self.prosign(Prosign::Bt);
        if let Some(rest) = body.strip_prefix(start.as_slice()) {
            match rest.split_first() {
                Some((first, tail)) if !first.is_mark() => body = tail,
                None => body = rest,
                _ => {}
            }
        }

        let marked = body.iter().rposition(|s| s.is_mark()).map_or(0, |i| i + 1);
        let end = self.prosign(Prosign::Ar);
        if let Some(rest) = body[..marked].strip_suffix(end.as_slice()) {
            if rest.last().map_or(true, |s| !s.is_mark()) {
                body = rest;
            }
        }
        body
    }

    pub fn decode(&self, symbols: &[Symbol]) -> Vec<StreamUnit> {
        let mut decoder = GroupDecoder::new(self.mode);
        for &symbol in symbols {
            decoder.push(Some(symbol));
        }
        decoder.finish()
    }

    /// Decode a stream where `None` marks an erased symbol.
    ///
    /// Every group touched by an erasure becomes `Unknown`; consecutive
    /// unknown positions merge into one.
    pub fn decode_with_erasures(&self, symbols: &[Option<Symbol>]) -> Vec<StreamUnit> {
        let mut decoder = GroupDecoder::new(self.mode);
        for &symbol in symbols {
            decoder.push(symbol);
        }
        decoder.finish()
    }

    /// Decode a stream that must be intact.
    ///
    /// # Errors
    /// `SymbolError::UnknownSymbol` for the first group that matches no code.
    pub fn decode_bytes(&self, symbols: &[Symbol]) -> Result<Vec<u8>> {
        self.decode(symbols)
            .into_iter()
            .enumerate()
            .map(|(group, unit)| match unit {
                StreamUnit::Byte(byte) => Ok(byte),
                StreamUnit::Unknown => Err(SymbolError::UnknownSymbol { group }.into()),
            })
            .collect()
    }
}

struct GroupDecoder {
    mode: MorseMode,
    units: Vec<StreamUnit>,
    group: Vec<Symbol>,
    tainted: bool,
    /// Hex digits of the current strict-mode word; `None` for a bad digit
    digits: Vec<Option<u8>>,
}

impl GroupDecoder {
    fn new(mode: MorseMode) -> Self {
        Self {
            mode,
            units: Vec::new(),
            group: Vec::with_capacity(12),
            tainted: false,
            digits: Vec::with_capacity(2),
        }
    }

    fn push(&mut self, symbol: Option<Symbol>) {
        match symbol {
            None => self.tainted = true,
            Some(mark @ (Symbol::Dot | Symbol::Dash)) => self.group.push(mark),
            Some(Symbol::Gap) => self.close_group(),
            Some(Symbol::WordGap) => {
                self.close_group();
                self.close_word();
            }
        }
    }

    fn emit(&mut self, unit: StreamUnit) {
        if unit == StreamUnit::Unknown && self.units.last() == Some(&StreamUnit::Unknown) {
            return;
        }
        self.units.push(unit);
    }

    fn close_group(&mut self) {
        if self.group.is_empty() && !self.tainted {
            return;
        }

        match self.mode {
            MorseMode::Optimized => {
                let unit = match (self.tainted, optimized_table().bytes.get(&self.group)) {
                    (false, Some(&byte)) => StreamUnit::Byte(byte),
                    _ => StreamUnit::Unknown,
                };
                self.emit(unit);
            }
            MorseMode::Strict => {
                let digit = if self.tainted {
                    None
                } else {
                    itu_table()
                        .by_code
                        .get(&self.group)
                        .and_then(|c| c.to_digit(16))
                        .map(|d| d as u8)
                };
                self.digits.push(digit);
            }
        }

        self.group.clear();
        self.tainted = false;
    }

    fn close_word(&mut self) {
        if self.digits.is_empty() {
            return;
        }
        let unit = match self.digits.as_slice() {
            [Some(hi), Some(lo)] => StreamUnit::Byte(hi << 4 | lo),
            _ => StreamUnit::Unknown,
        };
        self.digits.clear();
        self.emit(unit);
    }

    fn finish(mut self) -> Vec<StreamUnit> {
        self.close_group();
        self.close_word();
        self.units
    }
}

/// Key plain operator text with the ITU table.
///
/// Letters are case-insensitive; a run of spaces becomes one word gap.
///
/// # Errors
/// `SymbolError::UnmappableSymbol` for a character without an ITU code;
/// `offset` counts characters.
pub fn encode_text(text: &str) -> Result<Vec<Symbol>> {
    let itu = itu_table();
    let mut symbols: Vec<Symbol> = Vec::with_capacity(text.len() * 5);

    for (offset, ch) in text.chars().enumerate() {
        if ch == ' ' {
            match symbols.last() {
                Some(Symbol::Gap) => {
                    symbols.pop();
                    symbols.push(Symbol::WordGap);
                }
                Some(Symbol::Dot | Symbol::Dash) => symbols.push(Symbol::WordGap),
                _ => {}
            }
            continue;
        }

        let upper = crate::dictionary::single_uppercase(ch).unwrap_or(ch);
        let code = itu
            .by_char
            .get(&upper)
            .ok_or(SymbolError::UnmappableSymbol { symbol: ch, offset })?;
        if symbols.last().is_some_and(|s| s.is_mark()) {
            symbols.push(Symbol::Gap);
        }
        symbols.extend_from_slice(code);
    }

    Ok(symbols)
}

/// Read ITU-keyed text back, upper-case.
///
/// # Errors
/// `SymbolError::UnknownSymbol` for a group outside the ITU table.
pub fn decode_text(symbols: &[Symbol]) -> Result<String> {
    let itu = itu_table();
    let mut text = String::new();
    let mut group = Vec::new();
    let mut groups = 0;

    let mut close = |group: &mut Vec<Symbol>, text: &mut String| -> Result<()> {
        if group.is_empty() {
            return Ok(());
        }
        let ch = itu
            .by_code
            .get(group.as_slice())
            .ok_or(SymbolError::UnknownSymbol { group: groups })?;
        text.push(*ch);
        groups += 1;
        group.clear();
        Ok(())
    };

    for &symbol in symbols {
        match symbol {
            Symbol::Dot | Symbol::Dash => group.push(symbol),
            Symbol::Gap => close(&mut group, &mut text)?,
            Symbol::WordGap => {
                close(&mut group, &mut text)?;
                if !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
            }
        }
    }
    close(&mut group, &mut text)?;

    Ok(text)
}

/// Pack symbols two bits each, MSB-first. The last byte is zero-padded,
/// which reads back as trailing gaps.
pub fn pack(symbols: &[Symbol]) -> Result<Vec<u8>> {
    let mut writer = BitWriter::with_capacity(symbols.len() * 2);
    for symbol in symbols {
        writer.write_bits(u64::from(symbol.bits()), 2)?;
    }
    Ok(writer.finish())
}

pub fn unpack(bytes: &[u8]) -> Result<Vec<Symbol>> {
    let mut reader = BitReader::new(bytes);
    let mut symbols = Vec::with_capacity(bytes.len() * 4);
    while reader.bits_remaining() >= 2 {
        symbols.push(Symbol::from_bits(reader.read_bits(2)? as u8));
    }
    Ok(symbols)
}

/// Keying-time estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingModel {
    pub wpm: u32,
}

impl TimingModel {
    pub fn new(wpm: u32) -> Self {
        Self { wpm: wpm.max(1) }
    }

    pub fn unit(&self) -> Duration {
        Duration::from_micros(1_200_000 / u64::from(self.wpm.max(1)))
    }

    /// Length of a symbol sequence in dot units.
    pub fn units(&self, symbols: &[Symbol]) -> u64 {
        let mut total = 0;
        let mut previous_mark = false;
        for symbol in symbols {
            if symbol.is_mark() && previous_mark {
                total += 1;
            }
            total += symbol.units();
            previous_mark = symbol.is_mark();
        }
        total
    }

    pub fn duration(&self, symbols: &[Symbol]) -> Duration {
        let micros = self.units(symbols) as f64 * 1_200_000.0 / f64::from(self.wpm.max(1));
        Duration::from_micros(micros.round() as u64)
    }
}

impl Default for TimingModel {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashSet;

    #[test]
    fn test_optimized_table_is_a_bijection() {
        let table = optimized_table();
        let groups: HashSet<_> = table.codes.iter().collect();
        assert_eq!(groups.len(), 256);
        assert!(table.codes.iter().all(|g| !g.is_empty()));
        assert_eq!(table.bytes.len(), 256);
    }

    #[test]
    fn test_frequent_bytes_key_fastest() {
        let codec = SymbolCodec::new(MorseMode::Optimized);
        assert_eq!(codec.code(b' '), vec![Symbol::Dot]);
        assert_eq!(codec.code(b'e'), vec![Symbol::Dash]);
        assert!(group_duration(&codec.code(opcode::STR_END)) <= group_duration(&codec.code(0xFF)));
        assert!(group_duration(&codec.code(b'e')) < group_duration(&codec.code(b'Z')));
    }

    #[test]
    fn test_round_trip_every_byte() {
        let bytes: Vec<u8> = (0..=255).collect();
        for mode in [MorseMode::Optimized, MorseMode::Strict] {
            let codec = SymbolCodec::new(mode);
            let symbols = codec.encode(&bytes);
            assert_eq!(codec.decode_bytes(&symbols).unwrap(), bytes, "{mode}");
        }
    }

    #[test]
    fn test_strict_mode_uses_hex_digits() {
        let codec = SymbolCodec::new(MorseMode::Strict);
        let symbols = codec.encode(&[0x4D]);
        assert_eq!(decode_text(&symbols).unwrap(), "4D ");
    }

    #[test]
    fn test_erasure_resynchronizes() {
        let codec = SymbolCodec::new(MorseMode::Optimized);
        let bytes = b"abcd";
        let symbols: Vec<Option<Symbol>> = codec.encode(bytes).into_iter().map(Some).collect();

        let a_len = codec.code(b'a').len();
        let b_len = codec.code(b'b').len();
        let mut damaged = symbols.clone();
        for slot in &mut damaged[a_len + 1..a_len + 1 + b_len] {
            *slot = None;
        }

        assert_eq!(
            codec.decode_with_erasures(&damaged),
            vec![
                StreamUnit::Byte(b'a'),
                StreamUnit::Unknown,
                StreamUnit::Byte(b'c'),
                StreamUnit::Byte(b'd'),
            ]
        );
    }

    #[test]
    fn test_erased_separator_merges_unknowns() {
        let codec = SymbolCodec::new(MorseMode::Strict);
        let mut symbols: Vec<Option<Symbol>> =
            codec.encode(&[0x10, 0x20, 0x30]).into_iter().map(Some).collect();
        // Erase across the first word gap.
        let first_word = codec.code(0x10).len();
        for slot in &mut symbols[first_word - 1..first_word + 3] {
            *slot = None;
        }
        assert_eq!(
            codec.decode_with_erasures(&symbols),
            vec![StreamUnit::Unknown, StreamUnit::Byte(0x30)]
        );
    }

    #[test]
    fn test_invalid_group_is_unknown() {
        let codec = SymbolCodec::new(MorseMode::Optimized);
        let mut symbols = vec![Symbol::Dot; 12];
        symbols.push(Symbol::Gap);
        symbols.extend(codec.encode(b"k"));

        assert_eq!(
            codec.decode(&symbols),
            vec![StreamUnit::Unknown, StreamUnit::Byte(b'k')]
        );
        assert!(matches!(
            codec.decode_bytes(&symbols),
            Err(Error::Symbol(SymbolError::UnknownSymbol { group: 0 }))
        ));
    }

    #[test]
    fn test_text_keying() {
        let symbols = encode_text("sos de F4ABC").unwrap();
        assert_eq!(decode_text(&symbols).unwrap(), "SOS DE F4ABC");

        let err = encode_text("a#b").unwrap_err();
        assert!(matches!(
            err,
            Error::Symbol(SymbolError::UnmappableSymbol { symbol: '#', offset: 1 })
        ));
    }

    #[test]
    fn test_pack_unpack() {
        let codec = SymbolCodec::new(MorseMode::Optimized);
        let symbols = codec.encode(b"73");
        let packed = pack(&symbols).unwrap();
        assert_eq!(packed.len(), symbols.len().div_ceil(4));

        let unpacked = unpack(&packed).unwrap();
        assert_eq!(&unpacked[..symbols.len()], &symbols[..]);
        assert!(unpacked[symbols.len()..].iter().all(|s| *s == Symbol::Gap));
        assert_eq!(codec.decode_bytes(&unpacked).unwrap(), b"73");
    }

    #[test]
    fn test_paris_timing() {
        let symbols = encode_text("PARIS ").unwrap();
        let timing = TimingModel::new(20);
        assert_eq!(timing.units(&symbols), 50);
        assert_eq!(timing.unit(), Duration::from_millis(60));
        assert_eq!(timing.duration(&symbols), Duration::from_secs(3));
    }

    #[test]
    fn test_prosigns_never_decode_as_data() {
        for mode in [MorseMode::Optimized, MorseMode::Strict] {
            let codec = SymbolCodec::new(mode);
            let groups: HashSet<Vec<Symbol>> =
                Prosign::ALL.iter().map(|&p| codec.prosign(p)).collect();
            assert_eq!(groups.len(), Prosign::ALL.len());

            for sign in Prosign::ALL {
                let mut symbols = codec.prosign(sign);
                symbols.push(Symbol::WordGap);
                assert_eq!(codec.decode(&symbols), vec![StreamUnit::Unknown], "{}", sign.name());
            }
        }
        // Strict keying is the operator chart: <BT> sounds like '='.
        let strict = SymbolCodec::new(MorseMode::Strict);
        assert_eq!(strict.prosign(Prosign::Bt), encode_text("=").unwrap());
    }

    #[test]
    fn test_framed_stream_survives_packing() {
        let bytes = b"M\x01\x80 trame\x03".to_vec();
        for mode in [MorseMode::Optimized, MorseMode::Strict] {
            let codec = SymbolCodec::new(mode);
            let framed = codec.frame(&codec.encode(&bytes));
            assert!(framed.starts_with(&codec.prosign(Prosign::Bt)));

            let unpacked = unpack(&pack(&framed).unwrap()).unwrap();
            let body = codec.unframe(&unpacked);
            assert_eq!(codec.decode_bytes(body).unwrap(), bytes);
        }
    }

    #[test]
    fn test_frame_adds_fixed_air_time() {
        let codec = SymbolCodec::new(MorseMode::Optimized);
        let timing = TimingModel::default();
        let body = codec.encode(b"QRV");
        assert_eq!(
            timing.units(&codec.frame(&body)),
            timing.units(&body) + timing.units(&codec.frame(&[]))
        );
    }

    #[test]
    fn test_unframe_leaves_plain_stream_alone() {
        let codec = SymbolCodec::new(MorseMode::Optimized);
        let symbols = codec.encode(b"abc");
        assert_eq!(codec.unframe(&symbols), symbols.as_slice());
        assert!(codec.unframe(&codec.frame(&[])).is_empty());
    }
}
