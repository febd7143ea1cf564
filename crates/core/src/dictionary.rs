//! Token dictionary shared by the compressor and the decompressor.
//!
//! Codes are whole bytes, so the code space is prefix-free by construction:
//! every byte value belongs to exactly one range below, and the only
//! two-byte codes start with the `EXT` opcode, which is never a code itself.
//!
//! ```text
//! 0x01-0x08  control opcodes (ATTR, TEXT, END, STR_END, LIT, TEXT_CHILD, EXT, CAP)
//! 0x20-0x7E  printable ASCII, literal characters
//! 0x80-0xA7  tags (0x80 + TagKind index)
//! 0xA8-0xB7  attribute names
//! 0xB8-0xDF  primary static words
//! 0xE0-0xFE  adaptive words (per transmission)
//! EXT nn     extended static words
//! ```
//!
//! The static table is versioned. Any change to the word lists, the tag
//! registry order or the attribute list must bump [`STATIC_VERSION`].

use crate::config::AdaptiveParams;
use crate::error::{Error, Result};
use crate::markup::{Node, TagKind};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Version of the built-in static table.
pub const STATIC_VERSION: u8 = 1;

/// Control opcodes of the MML-C stream.
pub mod opcode {
    pub const ATTR: u8 = 0x01;
    pub const TEXT: u8 = 0x02;
    pub const END: u8 = 0x03;
    pub const STR_END: u8 = 0x04;
    pub const LIT: u8 = 0x05;
    pub const TEXT_CHILD: u8 = 0x06;
    pub const EXT: u8 = 0x07;
    pub const CAP: u8 = 0x08;
}

pub const TAG_BASE: u8 = 0x80;
pub const TAG_LAST: u8 = 0xA7;
pub const ATTR_BASE: u8 = 0xA8;
pub const ATTR_LAST: u8 = 0xB7;
pub const WORD_BASE: u8 = 0xB8;
pub const WORD_LAST: u8 = 0xDF;
pub const ADAPTIVE_BASE: u8 = 0xE0;
pub const ADAPTIVE_LAST: u8 = 0xFE;

/// Most adaptive entries one transmission can declare.
pub const MAX_ADAPTIVE_ENTRIES: usize = (ADAPTIVE_LAST - ADAPTIVE_BASE + 1) as usize;

const ATTRIBUTES: [&str; 7] = ["href", "src", "alt", "title", "colspan", "rowspan", "start"];

/// One-byte words. French lexical tokens and the technical vocabulary of
/// emergency traffic come first.
const PRIMARY_WORDS: [&str; 40] = [
    "le", "la", "les", "de", "du", "des", "et", "un", "une", "dans", "sur", "pour", "avec", "par",
    "sans", "son", "sa", "qui", "que", "dont", "quand", "comment", "pourquoi", "mais", "ou",
    "donc", "transmission", "communication", "urgence", "sécurité", "système", "message",
    "protocole", "réseau", "données", "information", "fréquence", "signal", "the", "and",
];

/// Two-byte words reached through `EXT nn`.
const EXTENDED_WORDS: [&str; 122] = [
    "https://", "http://", "www.", "with", "from", "this", "that", "have", "will", "your",
    "about", "there", "their", "which", "would", "other", "after", "first", "these", "been",
    "were", "into", "more", "only", "also", "when", "what", "they", "for", "are", "not", "all",
    "can", "was", "you", "our", "has", "new", "now", "please", "station", "operator", "antenna",
    "weather", "emergency", "network", "report", "status", "position", "received", "request",
    "contact", "power", "battery", "traffic", "radio", "amateur", "repeater", "channel",
    "bulletin", "frequency", "service", "update", "shelter", "medical", "supplies", "water",
    "food", "team", "area", "road", "hospital", "evacuation", "alert", "warning", "copy", "over",
    "roger", "relay", "control", "check", "est", "sont", "nous", "vous", "elle", "être", "avoir",
    "fait", "plus", "tout", "aussi", "entre", "depuis", "selon", "après", "avant", "contre",
    "pendant", "alerte", "secours", "opérateur", "antenne", "météo", "rapport", "demande",
    "centre", "zone", "route", "besoin", "équipe", "hôpital", "évacuation", "document",
    "section", "table", "title", "image", "page", "index", "home", "menu",
];

/// A word code as it appears in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Primary static or adaptive word
    Byte(u8),
    /// Extended static word, written as `EXT nn`
    Extended(u8),
}

impl Code {
    /// Bytes this code occupies in the stream.
    pub fn encoded_len(self) -> usize {
        match self {
            Code::Byte(_) => 1,
            Code::Extended(_) => 2,
        }
    }

    pub fn write_to(self, out: &mut Vec<u8>) {
        match self {
            Code::Byte(byte) => out.push(byte),
            Code::Extended(index) => {
                out.push(opcode::EXT);
                out.push(index);
            }
        }
    }
}

/// A dictionary entry: a pattern and the code standing for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<'a> {
    pub pattern: &'a str,
    pub code: Code,
}

/// The built-in, versioned table identical at both ends.
#[derive(Debug)]
pub struct StaticDictionary {
    version: u8,
    codes: HashMap<&'static str, Code>,
    attribute_codes: HashMap<&'static str, u8>,
    max_word_len: usize,
}

impl StaticDictionary {
    /// The process-wide built-in table, built on first use.
    pub fn builtin() -> &'static StaticDictionary {
        static BUILTIN: OnceLock<StaticDictionary> = OnceLock::new();
        BUILTIN.get_or_init(StaticDictionary::build)
    }

    fn build() -> Self {
        let mut codes = HashMap::with_capacity(PRIMARY_WORDS.len() + EXTENDED_WORDS.len());
        for (i, word) in PRIMARY_WORDS.iter().enumerate() {
            codes.insert(*word, Code::Byte(WORD_BASE + i as u8));
        }
        for (i, word) in EXTENDED_WORDS.iter().enumerate() {
            codes.insert(*word, Code::Extended(i as u8));
        }

        let attribute_codes = ATTRIBUTES
            .iter()
            .enumerate()
            .map(|(i, name)| (*name, ATTR_BASE + i as u8))
            .collect();

        let max_word_len = PRIMARY_WORDS
            .iter()
            .chain(EXTENDED_WORDS.iter())
            .map(|w| w.len())
            .max()
            .unwrap_or(0);

        Self {
            version: STATIC_VERSION,
            codes,
            attribute_codes,
            max_word_len,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn word_code(&self, pattern: &str) -> Option<Code> {
        self.codes.get(pattern).copied()
    }

    /// Pattern of a static word code; adaptive bytes are not handled here.
    pub fn word(&self, code: Code) -> Option<&'static str> {
        match code {
            Code::Byte(byte @ WORD_BASE..=WORD_LAST) => {
                PRIMARY_WORDS.get(usize::from(byte - WORD_BASE)).copied()
            }
            Code::Byte(_) => None,
            Code::Extended(index) => EXTENDED_WORDS.get(usize::from(index)).copied(),
        }
    }

    pub fn tag_code(&self, tag: TagKind) -> u8 {
        TAG_BASE + tag.index() as u8
    }

    pub fn tag(&self, code: u8) -> Option<TagKind> {
        if (TAG_BASE..=TAG_LAST).contains(&code) {
            TagKind::from_index(usize::from(code - TAG_BASE))
        } else {
            None
        }
    }

    pub fn attribute_code(&self, name: &str) -> Option<u8> {
        self.attribute_codes.get(name).copied()
    }

    pub fn attribute(&self, code: u8) -> Option<&'static str> {
        if (ATTR_BASE..=ATTR_LAST).contains(&code) {
            ATTRIBUTES.get(usize::from(code - ATTR_BASE)).copied()
        } else {
            None
        }
    }

    /// Every static word entry, primary page first.
    pub fn entries(&self) -> impl Iterator<Item = Entry<'static>> + '_ {
        PRIMARY_WORDS
            .iter()
            .chain(EXTENDED_WORDS.iter())
            .filter_map(|word| {
                self.word_code(word).map(|code| Entry {
                    pattern: word,
                    code,
                })
            })
    }
}

/// Words and phrases specific to one document.
///
/// Codes are assigned in entry order from [`ADAPTIVE_BASE`]. The table travels
/// as a preamble right after the stream header:
///
/// ```text
/// count:u8 (len:u8 utf8-bytes)*
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptiveTable {
    entries: Vec<String>,
    codes: HashMap<String, u8>,
}

impl AdaptiveTable {
    /// Table from explicit entries.
    ///
    /// # Errors
    /// `Error::Config` if there are more than [`MAX_ADAPTIVE_ENTRIES`] entries,
    /// or an entry is empty or longer than 255 bytes.
    pub fn from_entries(entries: Vec<String>) -> Result<Self> {
        if entries.len() > MAX_ADAPTIVE_ENTRIES {
            return Err(Error::Config(format!(
                "adaptive table holds at most {MAX_ADAPTIVE_ENTRIES} entries, got {}",
                entries.len()
            )));
        }
        if let Some(bad) = entries.iter().find(|e| e.is_empty() || e.len() > 255) {
            return Err(Error::Config(format!(
                "adaptive entry length must be 1..=255, got {}",
                bad.len()
            )));
        }

        let codes = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.clone(), ADAPTIVE_BASE + i as u8))
            .collect();

        Ok(Self { entries, codes })
    }

    /// Build the table greedily from the words and phrases of `tree`.
    ///
    /// Candidates are runs of up to `max_phrase_words` words joined by single
    /// spaces. A candidate qualifies when it is long and frequent enough, is
    /// not already a static word, and its estimated net saving
    /// `freq * (len - 1) - (len + 1)` is positive. The best entries by saving
    /// are kept, ties broken lexicographically.
    pub fn build(tree: &Node, params: AdaptiveParams, statics: &StaticDictionary) -> Self {
        let mut texts = Vec::new();
        collect_texts(tree, &mut texts);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for text in &texts {
            let words = word_spans(text);
            for first in 0..words.len() {
                for last in first..words.len().min(first + params.max_phrase_words) {
                    if last > first && &text[words[last - 1].1..words[last].0] != " " {
                        break;
                    }
                    let candidate = &text[words[first].0..words[last].1];
                    if candidate.len() >= params.min_len && candidate.len() <= 255 {
                        *counts.entry(candidate).or_default() += 1;
                    }
                }
            }
        }

        let mut scored: Vec<(i64, &str)> = counts
            .into_iter()
            .filter(|(pattern, freq)| {
                *freq >= params.min_frequency && statics.word_code(pattern).is_none()
            })
            .map(|(pattern, freq)| {
                let len = pattern.len() as i64;
                (freq as i64 * (len - 1) - (len + 1), pattern)
            })
            .filter(|(saving, _)| *saving > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.truncate(MAX_ADAPTIVE_ENTRIES);

        let entries = scored.into_iter().map(|(_, p)| p.to_string()).collect();
        // Entries are bounded and non-empty by construction.
        Self::from_entries(entries).unwrap_or_default()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn code(&self, pattern: &str) -> Option<u8> {
        self.codes.get(pattern).copied()
    }

    pub fn pattern(&self, code: u8) -> Option<&str> {
        if code < ADAPTIVE_BASE {
            return None;
        }
        self.entries
            .get(usize::from(code - ADAPTIVE_BASE))
            .map(String::as_str)
    }

    fn max_len(&self) -> usize {
        self.entries.iter().map(String::len).max().unwrap_or(0)
    }

    pub fn write_preamble(&self, out: &mut Vec<u8>) {
        out.push(self.entries.len() as u8);
        for entry in &self.entries {
            out.push(entry.len() as u8);
            out.extend_from_slice(entry.as_bytes());
        }
    }

    /// Parse a preamble at the start of `bytes`; `base` is the stream offset
    /// of `bytes[0]`. Returns the table and the number of bytes consumed.
    ///
    /// # Errors
    /// `Error::MalformedStream` on a bad count, truncation or invalid UTF-8.
    pub fn read_preamble(bytes: &[u8], base: usize) -> Result<(Self, usize)> {
        let count = *bytes
            .first()
            .ok_or_else(|| Error::malformed(base, "truncated adaptive preamble"))?
            as usize;
        if count == 0 || count > MAX_ADAPTIVE_ENTRIES {
            return Err(Error::malformed(
                base,
                format!("adaptive entry count {count} out of range"),
            ));
        }

        let mut pos = 1;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let len = *bytes
                .get(pos)
                .ok_or_else(|| Error::malformed(base + pos, "truncated adaptive preamble"))?
                as usize;
            if len == 0 {
                return Err(Error::malformed(base + pos, "empty adaptive entry"));
            }
            let raw = bytes
                .get(pos + 1..pos + 1 + len)
                .ok_or_else(|| Error::malformed(base + pos, "truncated adaptive entry"))?;
            let entry = std::str::from_utf8(raw)
                .map_err(|_| Error::malformed(base + pos + 1, "adaptive entry is not UTF-8"))?;
            entries.push(entry.to_string());
            pos += 1 + len;
        }

        let table = Self::from_entries(entries).map_err(|e| Error::malformed(base, e.to_string()))?;
        Ok((table, pos))
    }
}

fn collect_texts<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    if let Some(text) = &node.text {
        out.push(text);
    }
    for (_, value) in &node.attributes {
        out.push(value);
    }
    for child in &node.children {
        collect_texts(child, out);
    }
}

/// Byte spans of the alphanumeric runs in `text`.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, ch) in text.char_indices() {
        match (ch.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// A dictionary hit at the current position of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub code: Code,
    /// Input bytes covered
    pub consumed: usize,
    /// The input starts with the upper-case form of the pattern's first letter
    pub capitalized: bool,
}

impl Match {
    /// Stream bytes needed to write this match.
    pub fn encoded_len(&self) -> usize {
        self.code.encoded_len() + usize::from(self.capitalized)
    }
}

/// Static table plus the adaptive table of one transmission.
///
/// Read-only once built; the compressor and decompressor of a transmission
/// share one instance.
#[derive(Debug, Clone)]
pub struct Dictionary<'a> {
    statics: &'a StaticDictionary,
    adaptive: AdaptiveTable,
    max_pattern_len: usize,
}

impl<'a> Dictionary<'a> {
    pub fn new(statics: &'a StaticDictionary, adaptive: AdaptiveTable) -> Self {
        let max_pattern_len = statics.max_word_len.max(adaptive.max_len());
        Self {
            statics,
            adaptive,
            max_pattern_len,
        }
    }

    /// Static table only.
    pub fn static_only(statics: &'a StaticDictionary) -> Self {
        Self::new(statics, AdaptiveTable::default())
    }

    pub fn statics(&self) -> &'a StaticDictionary {
        self.statics
    }

    pub fn adaptive(&self) -> &AdaptiveTable {
        &self.adaptive
    }

    pub fn lookup(&self, pattern: &str) -> Option<Code> {
        self.statics
            .word_code(pattern)
            .or_else(|| self.adaptive.code(pattern).map(Code::Byte))
    }

    pub fn lookup_code(&self, code: Code) -> Option<&str> {
        match code {
            Code::Byte(byte @ ADAPTIVE_BASE..=ADAPTIVE_LAST) => self.adaptive.pattern(byte),
            other => self.statics.word(other),
        }
    }

    /// Best dictionary match at the start of `text`.
    ///
    /// Tries the longest exact prefix and the longest prefix whose first
    /// letter is the upper-case form of a pattern's first letter (written
    /// with `CAP`). Returns the candidate saving the most bytes, or `None`
    /// when no candidate is shorter than the text it replaces.
    pub fn longest_match(&self, text: &str) -> Option<Match> {
        let plain = self.longest_prefix(text).map(|(code, consumed)| Match {
            code,
            consumed,
            capitalized: false,
        });

        let capitalized = capitalized_form(text).and_then(|(lowered, upper_len, lower_len)| {
            self.longest_prefix(&lowered)
                .filter(|(_, consumed)| *consumed > lower_len)
                .map(|(code, consumed)| Match {
                    code,
                    consumed: consumed - lower_len + upper_len,
                    capitalized: true,
                })
        });

        [plain, capitalized]
            .into_iter()
            .flatten()
            .filter(|m| m.consumed > m.encoded_len())
            .max_by_key(|m| (m.consumed - m.encoded_len(), m.consumed, !m.capitalized))
    }

    fn longest_prefix(&self, text: &str) -> Option<(Code, usize)> {
        let limit = self.max_pattern_len.min(text.len());
        let mut best = None;
        for (i, ch) in text.char_indices() {
            let end = i + ch.len_utf8();
            if end > limit {
                break;
            }
            if let Some(code) = self.lookup(&text[..end]) {
                best = Some((code, end));
            }
        }
        best
    }
}

/// Lower-case the first letter of `text` when that mapping is reversible.
///
/// Returns the lowered prefix (bounded by the longest pattern) and the byte
/// lengths of the upper and lower first letter.
fn capitalized_form(text: &str) -> Option<(String, usize, usize)> {
    let upper = text.chars().next()?;
    let lower = single_lowercase(upper)?;
    if lower == upper || single_uppercase(lower) != Some(upper) {
        return None;
    }
    let mut lowered = String::with_capacity(text.len());
    lowered.push(lower);
    lowered.push_str(&text[upper.len_utf8()..]);
    Some((lowered, upper.len_utf8(), lower.len_utf8()))
}

fn single_lowercase(ch: char) -> Option<char> {
    let mut it = ch.to_lowercase();
    let lower = it.next()?;
    it.next().is_none().then_some(lower)
}

/// Upper-case form of a single letter when it is itself a single letter.
pub(crate) fn single_uppercase(ch: char) -> Option<char> {
    let mut it = ch.to_uppercase();
    let upper = it.next()?;
    it.next().is_none().then_some(upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionLevel;
    use std::collections::HashSet;

    #[test]
    fn test_code_ranges_are_disjoint() {
        assert!(TagKind::ALL.len() <= usize::from(TAG_LAST - TAG_BASE) + 1);
        assert!(ATTRIBUTES.len() <= usize::from(ATTR_LAST - ATTR_BASE) + 1);
        assert_eq!(PRIMARY_WORDS.len(), usize::from(WORD_LAST - WORD_BASE) + 1);
        assert!(EXTENDED_WORDS.len() <= 256);
        assert!(opcode::CAP < 0x20);
        assert!(0x7E < TAG_BASE);
    }

    #[test]
    fn test_static_words_unique() {
        let all: Vec<_> = PRIMARY_WORDS.iter().chain(EXTENDED_WORDS.iter()).collect();
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), unique.len());
    }

    #[test]
    fn test_lookup_both_ways() {
        let dict = Dictionary::static_only(StaticDictionary::builtin());
        for entry in StaticDictionary::builtin().entries() {
            assert_eq!(dict.lookup(entry.pattern), Some(entry.code));
            assert_eq!(dict.lookup_code(entry.code), Some(entry.pattern));
        }
        assert_eq!(dict.lookup("sécurité"), Some(Code::Byte(WORD_BASE + 29)));
        assert_eq!(dict.lookup("zebra"), None);
        assert_eq!(dict.lookup_code(Code::Byte(0x41)), None);
    }

    #[test]
    fn test_tags_and_attributes() {
        let statics = StaticDictionary::builtin();
        for tag in TagKind::ALL {
            assert_eq!(statics.tag(statics.tag_code(tag)), Some(tag));
        }
        assert_eq!(statics.tag(TAG_LAST), None);
        assert_eq!(statics.attribute(statics.attribute_code("href").unwrap()), Some("href"));
        assert_eq!(statics.attribute_code("class"), None);
    }

    #[test]
    fn test_longest_match_prefers_longer_pattern() {
        let dict = Dictionary::static_only(StaticDictionary::builtin());
        let m = dict.longest_match("les enfants").unwrap();
        assert_eq!(dict.lookup_code(m.code), Some("les"));
        assert_eq!(m.consumed, 3);

        let m = dict.longest_match("lequel").unwrap();
        assert_eq!(m.consumed, 2);

        assert_eq!(dict.longest_match("xyz"), None);
    }

    #[test]
    fn test_capitalized_match() {
        let dict = Dictionary::static_only(StaticDictionary::builtin());
        let m = dict.longest_match("Transmission reçue").unwrap();
        assert!(m.capitalized);
        assert_eq!(m.consumed, "Transmission".len());
        assert_eq!(dict.lookup_code(m.code), Some("transmission"));

        // Two-letter words do not pay for the CAP byte.
        assert_eq!(dict.longest_match("Le"), None);
    }

    #[test]
    fn test_adaptive_table_build() {
        let tree = Node::document(vec![
            Node::leaf(TagKind::Paragraph, "Weekly net: antenna farm check, antenna farm report."),
            Node::leaf(TagKind::Paragraph, "Bring the antenna farm keys."),
        ]);
        let params = CompressionLevel::Standard.adaptive_params().unwrap();
        let table = AdaptiveTable::build(&tree, params, StaticDictionary::builtin());

        assert_eq!(table.entries()[0], "antenna farm");
        assert!(table.code("antenna").is_none(), "static words are excluded");
        assert!(table.len() <= MAX_ADAPTIVE_ENTRIES);

        let again = AdaptiveTable::build(&tree, params, StaticDictionary::builtin());
        assert_eq!(table, again);
    }

    #[test]
    fn test_adaptive_entry_limit() {
        let text: Vec<String> = (0..40).map(|i| format!("callsign{i:02} callsign{i:02}")).collect();
        let tree = Node::document(vec![Node::leaf(TagKind::Paragraph, text.join(" "))]);
        let params = CompressionLevel::Aggressive.adaptive_params().unwrap();
        let table = AdaptiveTable::build(&tree, params, StaticDictionary::builtin());
        assert_eq!(table.len(), MAX_ADAPTIVE_ENTRIES);
    }

    #[test]
    fn test_preamble_round_trip() {
        let table = AdaptiveTable::from_entries(vec!["relais".into(), "bulletin météo".into()]).unwrap();
        let mut bytes = Vec::new();
        table.write_preamble(&mut bytes);
        bytes.push(0xFF);

        let (parsed, used) = AdaptiveTable::read_preamble(&bytes, 3).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(used, bytes.len() - 1);
        assert_eq!(parsed.pattern(ADAPTIVE_BASE + 1), Some("bulletin météo"));
    }

    #[test]
    fn test_preamble_errors() {
        assert!(matches!(
            AdaptiveTable::read_preamble(&[], 3),
            Err(Error::MalformedStream { offset: 3, .. })
        ));
        assert!(AdaptiveTable::read_preamble(&[0], 3).is_err());
        assert!(AdaptiveTable::read_preamble(&[1, 4, b'a'], 3).is_err());
        assert!(AdaptiveTable::read_preamble(&[1, 1, 0xC3], 3).is_err());
    }
}
