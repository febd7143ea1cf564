//! MML-C: dictionary-based serialization of canonical trees.
//!
//! # Stream Format
//!
//! ```text
//! +--------------------+
//! | 'M' (1 byte)       |  magic
//! +--------------------+
//! | version (1)        |  static dictionary version
//! +--------------------+
//! | flags (1)          |  bit0: adaptive preamble follows; other bits zero
//! +--------------------+
//! | preamble           |  optional, see AdaptiveTable
//! +--------------------+
//! | body               |  children of the implicit document root
//! +--------------------+
//! ```
//!
//! The body grammar, decoded left to right without backtracking:
//!
//! ```text
//! node   := TAG attr* (TEXT string | node* END) | TEXT_CHILD string
//! attr   := ATTR (ATTR_CODE | string) string
//! string := (printable | WORD | EXT nn | CAP WORD | LIT len bytes)* STR_END
//! ```
//!
//! Text is encoded at word starts with the best dictionary match; anything
//! the dictionary does not cover is written as printable ASCII or as a
//! length-prefixed literal run, so every tree is representable.
//!
//! # Partial Recovery
//!
//! [`decompress_partial`] takes a stream with holes. The run before the first
//! hole decodes normally and open elements are closed where the run ends.
//! Every hole becomes a `Lost` marker at the root, and each later run is
//! scanned for the first offset where a complete element decodes; from there
//! decoding continues and recovered elements are appended at the root.

use crate::config::CompressionLevel;
use crate::dictionary::{
    opcode, single_uppercase, AdaptiveTable, Code, Dictionary, StaticDictionary, ADAPTIVE_BASE,
    ADAPTIVE_LAST, ATTR_BASE, ATTR_LAST, TAG_BASE, TAG_LAST, WORD_BASE, WORD_LAST,
};
use crate::error::{Error, Result};
use crate::markup::{canonical_size, Node, TagKind};
use crate::symbol::StreamUnit;
use tracing::debug;

/// Stream magic byte.
pub const MAGIC: u8 = b'M';

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 3;

/// Deepest element nesting below the root.
pub const MAX_DEPTH: usize = 64;

const FLAG_PREAMBLE: u8 = 0x01;

/// Size accounting for one compressed document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionReport {
    pub compressed_size: usize,
    /// Byte length of the canonical MML serialization
    pub canonical_size: usize,
    /// `compressed_size / canonical_size`
    pub ratio: f64,
    pub adaptive_entries: usize,
}

/// Output of [`Compressor::compress`].
#[derive(Debug, Clone)]
pub struct CompressedStream {
    pub bytes: Vec<u8>,
    pub dictionary_version: u8,
    /// Adaptive entries carried in the preamble, in code order
    pub preamble: Vec<String>,
    pub report: CompressionReport,
}

/// Tree-to-stream encoder.
///
/// Holds only shared read-only state and can be used from many threads.
#[derive(Debug, Clone, Copy)]
pub struct Compressor<'a> {
    statics: &'a StaticDictionary,
    level: CompressionLevel,
}

impl<'a> Compressor<'a> {
    pub fn new(statics: &'a StaticDictionary, level: CompressionLevel) -> Self {
        Self { statics, level }
    }

    /// Compress a canonical document tree.
    ///
    /// # Errors
    /// `Error::InvalidTree` if the tree breaks the nesting rules, mixes text
    /// and children, nests deeper than [`MAX_DEPTH`] or is not rooted at a
    /// bare `Document` node.
    pub fn compress(&self, tree: &Node) -> Result<CompressedStream> {
        check_root(tree)?;

        let adaptive = self
            .level
            .adaptive_params()
            .map(|params| AdaptiveTable::build(tree, params, self.statics))
            .unwrap_or_default();
        let dict = Dictionary::new(self.statics, adaptive);

        let canonical = canonical_size(tree);
        let mut out = Vec::with_capacity(canonical / 2 + HEADER_SIZE);
        out.push(MAGIC);
        out.push(self.statics.version());
        if dict.adaptive().is_empty() {
            out.push(0);
        } else {
            out.push(FLAG_PREAMBLE);
            dict.adaptive().write_preamble(&mut out);
        }

        for child in &tree.children {
            write_node(child, &dict, &mut out);
        }

        let report = CompressionReport {
            compressed_size: out.len(),
            canonical_size: canonical,
            ratio: out.len() as f64 / canonical.max(1) as f64,
            adaptive_entries: dict.adaptive().len(),
        };
        debug!(
            canonical = report.canonical_size,
            compressed = report.compressed_size,
            adaptive = report.adaptive_entries,
            "compressed document"
        );

        Ok(CompressedStream {
            bytes: out,
            dictionary_version: self.statics.version(),
            preamble: dict.adaptive().entries().to_vec(),
            report,
        })
    }
}

fn check_root(tree: &Node) -> Result<()> {
    if tree.tag != TagKind::Document {
        return Err(Error::InvalidTree(format!(
            "root must be a document, got {}",
            tree.tag
        )));
    }
    if !tree.attributes.is_empty() || tree.text.is_some() {
        return Err(Error::InvalidTree(
            "document root carries no attributes or text".into(),
        ));
    }
    for child in &tree.children {
        check_node(tree.tag, child, 1)?;
    }
    Ok(())
}

fn check_node(parent: TagKind, node: &Node, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::InvalidTree(format!(
            "nesting deeper than {MAX_DEPTH}"
        )));
    }
    if !parent.allows_child(node.tag) {
        return Err(Error::InvalidTree(format!(
            "{} not allowed in {parent}",
            node.tag
        )));
    }
    if node.text.is_some() && !node.children.is_empty() {
        return Err(Error::InvalidTree(format!(
            "{} has both text and children",
            node.tag
        )));
    }
    if node.text.is_some() && !node.tag.allows_text() {
        return Err(Error::InvalidTree(format!("{} cannot hold text", node.tag)));
    }
    if node.tag == TagKind::Text && node.text.is_none() {
        return Err(Error::InvalidTree("text node without text".into()));
    }
    for child in &node.children {
        check_node(node.tag, child, depth + 1)?;
    }
    Ok(())
}

fn write_node(node: &Node, dict: &Dictionary<'_>, out: &mut Vec<u8>) {
    if let (TagKind::Text, true, true, Some(text)) = (
        node.tag,
        node.attributes.is_empty(),
        node.children.is_empty(),
        &node.text,
    ) {
        out.push(opcode::TEXT_CHILD);
        write_string(text, dict, out);
        return;
    }

    let statics = dict.statics();
    out.push(statics.tag_code(node.tag));

    for (name, value) in &node.attributes {
        out.push(opcode::ATTR);
        match statics.attribute_code(name) {
            Some(code) => out.push(code),
            None => write_string(name, dict, out),
        }
        write_string(value, dict, out);
    }

    match &node.text {
        Some(text) => {
            out.push(opcode::TEXT);
            write_string(text, dict, out);
        }
        None => {
            for child in &node.children {
                write_node(child, dict, out);
            }
            out.push(opcode::END);
        }
    }
}

fn is_printable(ch: char) -> bool {
    (' '..='~').contains(&ch)
}

fn write_string(text: &str, dict: &Dictionary<'_>, out: &mut Vec<u8>) {
    let mut i = 0;
    let mut previous: Option<char> = None;

    while i < text.len() {
        let rest = &text[i..];
        let at_word_start = previous.map_or(true, |c| !c.is_alphanumeric());

        if at_word_start {
            if let Some(m) = dict.longest_match(rest) {
                if m.capitalized {
                    out.push(opcode::CAP);
                }
                m.code.write_to(out);
                previous = rest[..m.consumed].chars().next_back();
                i += m.consumed;
                continue;
            }
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        if is_printable(ch) {
            out.push(ch as u8);
            previous = Some(ch);
            i += 1;
            continue;
        }

        // Literal run of everything outside printable ASCII.
        let mut len = 0;
        for c in rest.chars() {
            if is_printable(c) || len + c.len_utf8() > 255 {
                break;
            }
            len += c.len_utf8();
            previous = Some(c);
        }
        out.push(opcode::LIT);
        out.push(len as u8);
        out.extend_from_slice(&rest.as_bytes()[..len]);
        i += len;
    }

    out.push(opcode::STR_END);
}

/// Parse the stream header and the adaptive preamble.
///
/// Returns the dictionary for the body and the body's start offset.
///
/// # Errors
/// - `Error::DictionaryVersionMismatch` if the version byte differs from
///   `statics`; nothing past it is read
/// - `Error::MalformedStream` for a short header, wrong magic, reserved flag
///   bits or a bad preamble
pub fn read_header<'s>(
    bytes: &[u8],
    statics: &'s StaticDictionary,
) -> Result<(Dictionary<'s>, usize)> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::malformed(bytes.len(), "truncated stream header"));
    }
    if bytes[0] != MAGIC {
        return Err(Error::malformed(
            0,
            format!("bad magic {:#04x}", bytes[0]),
        ));
    }
    if bytes[1] != statics.version() {
        return Err(Error::DictionaryVersionMismatch {
            expected: statics.version(),
            found: bytes[1],
        });
    }
    let flags = bytes[2];
    if flags & !FLAG_PREAMBLE != 0 {
        return Err(Error::malformed(2, format!("reserved flag bits {flags:#04x}")));
    }

    if flags & FLAG_PREAMBLE == 0 {
        return Ok((Dictionary::static_only(statics), HEADER_SIZE));
    }
    let (table, used) = AdaptiveTable::read_preamble(&bytes[HEADER_SIZE..], HEADER_SIZE)?;
    Ok((Dictionary::new(statics, table), HEADER_SIZE + used))
}

/// Decode a complete stream back into its document tree.
///
/// # Errors
/// `Error::DictionaryVersionMismatch` or `Error::MalformedStream` with the
/// byte offset of the first undecodable byte.
pub fn decompress(bytes: &[u8], statics: &StaticDictionary) -> Result<Node> {
    let (dict, start) = read_header(bytes, statics)?;
    let mut parser = Parser::new(&dict, &bytes[start..], start);
    let outcome = parser.run(false);

    if let Some(error) = outcome.error {
        return Err(error);
    }
    if outcome.truncated {
        return Err(Error::malformed(bytes.len(), "stream ends inside an element"));
    }
    Ok(Node::document(outcome.nodes))
}

/// Decode a stream with holes into a tree with `Lost` markers.
///
/// A missing header is treated as a stream without adaptive table.
///
/// # Errors
/// Only `Error::DictionaryVersionMismatch`, when a readable header declares
/// another static dictionary version. Everything else degrades to loss
/// markers.
pub fn decompress_partial(units: &[StreamUnit], statics: &StaticDictionary) -> Result<Node> {
    let mut pieces: Vec<Option<Vec<u8>>> = Vec::new();
    for unit in units {
        match (unit, pieces.last_mut()) {
            (StreamUnit::Byte(byte), Some(Some(run))) => run.push(*byte),
            (StreamUnit::Byte(byte), _) => pieces.push(Some(vec![*byte])),
            (StreamUnit::Unknown, Some(None)) => {}
            (StreamUnit::Unknown, _) => pieces.push(None),
        }
    }

    let mut root = Vec::new();
    let mut dict = Dictionary::static_only(statics);

    for (i, piece) in pieces.iter().enumerate() {
        let Some(run) = piece else {
            push_lost(&mut root);
            continue;
        };

        let mut start = 0;
        let mut synced = false;
        if i == 0 {
            match read_header(run, statics) {
                Ok((header_dict, body)) => {
                    dict = header_dict;
                    start = body;
                    synced = true;
                }
                Err(mismatch @ Error::DictionaryVersionMismatch { .. }) => return Err(mismatch),
                Err(_) => push_lost(&mut root),
            }
        }
        recover_run(run, start, synced, &dict, &mut root);
    }

    let tree = Node::document(root);
    debug!(
        pieces = pieces.len(),
        lost = tree.lost_markers(),
        "partially decompressed stream"
    );
    Ok(tree)
}

fn push_lost(root: &mut Vec<Node>) {
    if root.last().map(|n| n.tag) != Some(TagKind::Lost) {
        root.push(Node::new(TagKind::Lost));
    }
}

fn recover_run(
    run: &[u8],
    mut start: usize,
    mut synced: bool,
    dict: &Dictionary<'_>,
    root: &mut Vec<Node>,
) {
    while start < run.len() {
        if !synced {
            match find_sync(run, start, dict) {
                Some(position) => start = position,
                None => return,
            }
        }

        let mut parser = Parser::new(dict, &run[start..], start);
        let outcome = parser.run(false);
        root.extend(outcome.nodes);

        if outcome.error.is_none() {
            return;
        }
        push_lost(root);
        start += outcome.end.max(1);
        synced = false;
    }
}

/// First offset at or after `from` where one complete element decodes.
fn find_sync(run: &[u8], from: usize, dict: &Dictionary<'_>) -> Option<usize> {
    (from..run.len()).find(|&position| {
        let mut parser = Parser::new(dict, &run[position..], position);
        let outcome = parser.run(true);
        outcome.error.is_none() && !outcome.truncated && outcome.nodes.len() == 1
    })
}

struct Outcome {
    /// Root-level nodes decoded, open elements closed
    nodes: Vec<Node>,
    /// First malformed byte, if decoding stopped on one
    error: Option<Error>,
    /// Input ended inside an element or string
    truncated: bool,
    /// Bytes consumed
    end: usize,
}

struct Parser<'p, 's> {
    dict: &'p Dictionary<'s>,
    bytes: &'p [u8],
    pos: usize,
    /// Stream offset of `bytes[0]`, for error reporting
    base: usize,
    truncated: bool,
    stack: Vec<Node>,
}

impl<'p, 's> Parser<'p, 's> {
    fn new(dict: &'p Dictionary<'s>, bytes: &'p [u8], base: usize) -> Self {
        Self {
            dict,
            bytes,
            pos: 0,
            base,
            truncated: false,
            stack: Vec::new(),
        }
    }

    fn malformed(&self, at: usize, reason: impl Into<String>) -> Error {
        Error::malformed(self.base + at, reason)
    }

    /// Decode nodes; with `single`, stop after the first root-level node.
    fn run(&mut self, single: bool) -> Outcome {
        self.stack = vec![Node::new(TagKind::Document)];
        let result = self.parse(single);
        let open = self.stack.len() > 1;

        while self.stack.len() > 1 {
            if let Some(node) = self.stack.pop() {
                self.attach(node);
            }
        }
        let nodes = self.stack.pop().map(|root| root.children).unwrap_or_default();

        let (error, truncated) = match result {
            Ok(()) => (None, open),
            Err(_) if self.truncated => (None, true),
            Err(error) => (Some(error), false),
        };
        Outcome {
            nodes,
            error,
            truncated,
            end: self.pos,
        }
    }

    fn attach(&mut self, node: Node) {
        if node.tag == TagKind::Text && node.text.is_none() {
            return;
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
        }
    }

    fn top(&mut self) -> Result<&mut Node> {
        let at = self.pos;
        let base = self.base;
        self.stack
            .last_mut()
            .ok_or_else(|| Error::malformed(base + at, "no open element"))
    }

    fn parse(&mut self, single: bool) -> Result<()> {
        while self.pos < self.bytes.len() {
            if single && self.stack.len() == 1 && !self.stack[0].children.is_empty() {
                return Ok(());
            }

            let at = self.pos;
            let byte = self.bytes[at];
            self.pos += 1;

            match byte {
                opcode::TEXT_CHILD => {
                    self.check_child(TagKind::Text, at)?;
                    let (text, error) = self.string_value(at);
                    if !text.is_empty() || error.is_none() {
                        self.attach(Node::text(text));
                    }
                    if let Some(error) = error {
                        return Err(error);
                    }
                }
                opcode::END => {
                    if self.stack.len() <= 1 {
                        return Err(self.malformed(at, "END without open element"));
                    }
                    if let Some(node) = self.stack.pop() {
                        if node.tag == TagKind::Text {
                            return Err(self.malformed(at, "text node without text"));
                        }
                        self.attach(node);
                    }
                }
                TAG_BASE..=TAG_LAST => {
                    let tag = self
                        .dict
                        .statics()
                        .tag(byte)
                        .ok_or_else(|| self.malformed(at, format!("unknown tag code {byte:#04x}")))?;
                    if tag == TagKind::Document {
                        return Err(self.malformed(at, "document node below the root"));
                    }
                    self.check_child(tag, at)?;
                    self.stack.push(Node::new(tag));
                    self.parse_element_body(tag)?;
                }
                other => {
                    return Err(self.malformed(at, format!("unknown code {other:#04x}")));
                }
            }
        }
        Ok(())
    }

    /// Attributes and, for leaves, the text of the element just opened.
    fn parse_element_body(&mut self, tag: TagKind) -> Result<()> {
        while self.peek() == Some(opcode::ATTR) {
            self.pos += 1;
            let name = self.attribute_name()?;
            let value_at = self.pos;
            let (value, error) = self.string_value(value_at);
            if let Some(error) = error {
                return Err(error);
            }
            self.top()?.attributes.push((name, value));
        }

        if self.peek() == Some(opcode::TEXT) {
            let text_at = self.pos;
            self.pos += 1;
            if !tag.allows_text() {
                return Err(self.malformed(text_at, format!("{tag} cannot hold text")));
            }
            let (text, error) = self.string_value(text_at);
            self.top()?.text = Some(text);
            if let Some(error) = error {
                return Err(error);
            }
            if let Some(node) = self.stack.pop() {
                self.attach(node);
            }
        }
        Ok(())
    }

    fn check_child(&self, tag: TagKind, at: usize) -> Result<()> {
        if self.stack.len() > MAX_DEPTH {
            return Err(self.malformed(at, format!("nesting deeper than {MAX_DEPTH}")));
        }
        match self.stack.last() {
            Some(parent) if parent.tag.allows_child(tag) => Ok(()),
            Some(parent) => Err(self.malformed(at, format!("{tag} not allowed in {}", parent.tag))),
            None => Err(self.malformed(at, "no open element")),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next_byte(&mut self) -> Result<u8> {
        match self.bytes.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => {
                self.truncated = true;
                Err(self.malformed(self.pos, "unexpected end of stream"))
            }
        }
    }

    fn take(&mut self, len: usize) -> Result<&'p [u8]> {
        let bytes = self.bytes;
        match bytes.get(self.pos..self.pos + len) {
            Some(slice) => {
                self.pos += len;
                Ok(slice)
            }
            None => {
                self.truncated = true;
                let at = self.pos;
                self.pos = bytes.len();
                Err(self.malformed(at, "truncated literal"))
            }
        }
    }

    fn attribute_name(&mut self) -> Result<String> {
        if let Some(code @ ATTR_BASE..=ATTR_LAST) = self.peek() {
            let at = self.pos;
            self.pos += 1;
            return self
                .dict
                .statics()
                .attribute(code)
                .map(str::to_string)
                .ok_or_else(|| self.malformed(at, format!("unknown attribute code {code:#04x}")));
        }
        let at = self.pos;
        let (name, error) = self.string_value(at);
        match error {
            Some(error) => Err(error),
            None => Ok(name),
        }
    }

    /// Read a string. On failure the text decoded so far is still returned,
    /// lossily converted, next to the error.
    fn string_value(&mut self, at: usize) -> (String, Option<Error>) {
        let mut buf = Vec::new();
        match self.read_string(&mut buf) {
            Ok(()) => match String::from_utf8(buf) {
                Ok(text) => (text, None),
                Err(invalid) => (
                    String::from_utf8_lossy(invalid.as_bytes()).into_owned(),
                    Some(self.malformed(at, "string is not valid UTF-8")),
                ),
            },
            Err(error) => (String::from_utf8_lossy(&buf).into_owned(), Some(error)),
        }
    }

    fn read_string(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        loop {
            let at = self.pos;
            let byte = self.next_byte()?;
            match byte {
                opcode::STR_END => return Ok(()),
                0x20..=0x7E => buf.push(byte),
                opcode::LIT => {
                    let len = usize::from(self.next_byte()?);
                    if len == 0 {
                        return Err(self.malformed(at, "empty literal run"));
                    }
                    buf.extend_from_slice(self.take(len)?);
                }
                opcode::CAP => {
                    let first = self.next_byte()?;
                    let word = self.word(first, at)?;
                    let mut chars = word.chars();
                    let upper = chars
                        .next()
                        .and_then(single_uppercase)
                        .ok_or_else(|| self.malformed(at, "CAP before an uncapitalizable word"))?;
                    let mut encoded = [0; 4];
                    buf.extend_from_slice(upper.encode_utf8(&mut encoded).as_bytes());
                    buf.extend_from_slice(chars.as_str().as_bytes());
                }
                opcode::EXT | WORD_BASE..=WORD_LAST | ADAPTIVE_BASE..=ADAPTIVE_LAST => {
                    let word = self.word(byte, at)?;
                    buf.extend_from_slice(word.as_bytes());
                }
                other => {
                    return Err(self.malformed(at, format!("unexpected byte {other:#04x} in string")));
                }
            }
        }
    }

    fn word(&mut self, first: u8, at: usize) -> Result<&'p str> {
        let code = match first {
            opcode::EXT => Code::Extended(self.next_byte()?),
            WORD_BASE..=WORD_LAST | ADAPTIVE_BASE..=ADAPTIVE_LAST => Code::Byte(first),
            other => return Err(self.malformed(at, format!("expected a word code, got {other:#04x}"))),
        };
        let dict: &'p Dictionary<'s> = self.dict;
        dict.lookup_code(code)
            .ok_or_else(|| self.malformed(at, format!("unknown word code {code:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statics() -> &'static StaticDictionary {
        StaticDictionary::builtin()
    }

    fn sample_tree() -> Node {
        Node::document(vec![
            Node::leaf(TagKind::Title, "Bulletin de la station"),
            Node::leaf(TagKind::H1, "Transmission d'urgence"),
            Node::new(TagKind::Paragraph).with_children(vec![
                Node::text("Le réseau est actif sur "),
                Node::leaf(TagKind::Strong, "7.074 MHz"),
                Node::text(", voir "),
                Node::leaf(TagKind::Link, "le protocole")
                    .with_attribute("href", "https://example.org/protocole")
                    .with_attribute("data-x", "42"),
                Node::new(TagKind::LineBreak),
                Node::text("日本語 «ok» \\ <tag> \"q\""),
            ]),
            Node::new(TagKind::UnorderedList).with_children(vec![
                Node::leaf(TagKind::ListItem, "Sécurité des données"),
                Node::leaf(TagKind::ListItem, ""),
                Node::new(TagKind::ListItem),
            ]),
            Node::new(TagKind::Image)
                .with_attribute("src", "map.png")
                .with_attribute("alt", "Carte"),
            Node::new(TagKind::Division),
        ])
    }

    fn compress(tree: &Node, level: CompressionLevel) -> CompressedStream {
        Compressor::new(statics(), level).compress(tree).unwrap()
    }

    #[test]
    fn test_short_document_compresses() {
        let tree = Node::document(vec![
            Node::leaf(TagKind::H1, "Titre"),
            Node::leaf(TagKind::Paragraph, "Texte court."),
        ]);
        let stream = compress(&tree, CompressionLevel::Standard);

        assert_eq!(stream.report.canonical_size, 33);
        assert!(stream.report.ratio < 1.0);
        assert_eq!(&stream.bytes[..3], &[MAGIC, 1, 0]);
        assert_eq!(decompress(&stream.bytes, statics()).unwrap(), tree);
    }

    #[test]
    fn test_round_trip_all_levels() {
        let tree = sample_tree();
        for level in [
            CompressionLevel::Light,
            CompressionLevel::Standard,
            CompressionLevel::Aggressive,
        ] {
            let stream = compress(&tree, level);
            assert_eq!(decompress(&stream.bytes, statics()).unwrap(), tree, "{level}");
        }
    }

    #[test]
    fn test_idempotent() {
        let tree = sample_tree();
        let first = compress(&tree, CompressionLevel::Aggressive);
        let decoded = decompress(&first.bytes, statics()).unwrap();
        let second = compress(&decoded, CompressionLevel::Aggressive);
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn test_adaptive_preamble() {
        let phrase = "liaison montagne";
        let tree = Node::document(
            (0..4)
                .map(|i| Node::leaf(TagKind::Paragraph, format!("{phrase} {i}")))
                .collect(),
        );
        let light = compress(&tree, CompressionLevel::Light);
        let standard = compress(&tree, CompressionLevel::Standard);

        assert_eq!(standard.bytes[2], FLAG_PREAMBLE);
        assert_eq!(standard.preamble[0], phrase);
        assert!(standard.report.compressed_size < light.report.compressed_size);
        assert_eq!(decompress(&standard.bytes, statics()).unwrap(), tree);
    }

    #[test]
    fn test_version_mismatch_is_reported_first() {
        let mut bytes = compress(&sample_tree(), CompressionLevel::Standard).bytes;
        bytes[1] = 2;
        bytes.truncate(HEADER_SIZE + 1);

        assert!(matches!(
            decompress(&bytes, statics()),
            Err(Error::DictionaryVersionMismatch { expected: 1, found: 2 })
        ));
        let units: Vec<_> = bytes.iter().map(|b| StreamUnit::Byte(*b)).collect();
        assert!(decompress_partial(&units, statics()).is_err());
    }

    #[test]
    fn test_malformed_offsets() {
        let p = statics().tag_code(TagKind::Paragraph);
        let ul = statics().tag_code(TagKind::UnorderedList);

        let unknown = [MAGIC, 1, 0, p, opcode::TEXT, b'a', opcode::STR_END, 0xFF];
        assert!(matches!(
            decompress(&unknown, statics()),
            Err(Error::MalformedStream { offset: 7, .. })
        ));

        let nesting = [MAGIC, 1, 0, ul, p, opcode::END, opcode::END];
        assert!(matches!(
            decompress(&nesting, statics()),
            Err(Error::MalformedStream { offset: 4, .. })
        ));

        let truncated = [MAGIC, 1, 0, p, opcode::TEXT, b'a'];
        assert!(matches!(
            decompress(&truncated, statics()),
            Err(Error::MalformedStream { .. })
        ));

        let flags = [MAGIC, 1, 0x80];
        assert!(matches!(
            decompress(&flags, statics()),
            Err(Error::MalformedStream { offset: 2, .. })
        ));

        let magic = [b'X', 1, 0];
        assert!(matches!(
            decompress(&magic, statics()),
            Err(Error::MalformedStream { offset: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_tree_rejected() {
        let compressor = Compressor::new(statics(), CompressionLevel::Light);

        let both = Node::document(vec![Node::leaf(TagKind::Paragraph, "x")
            .with_children(vec![Node::text("y")])]);
        assert!(matches!(compressor.compress(&both), Err(Error::InvalidTree(_))));

        let nesting = Node::document(vec![Node::new(TagKind::Table)
            .with_children(vec![Node::leaf(TagKind::TableCell, "x")])]);
        assert!(compressor.compress(&nesting).is_err());

        let mut deep = Node::leaf(TagKind::Span, "bottom");
        for _ in 0..MAX_DEPTH {
            deep = Node::new(TagKind::Division).with_children(vec![deep]);
        }
        assert!(compressor.compress(&Node::document(vec![deep])).is_err());
    }

    #[test]
    fn test_partial_without_gaps_matches_full_decode() {
        let tree = sample_tree();
        let stream = compress(&tree, CompressionLevel::Standard);
        let units: Vec<_> = stream.bytes.iter().map(|b| StreamUnit::Byte(*b)).collect();
        assert_eq!(decompress_partial(&units, statics()).unwrap(), tree);
    }

    #[test]
    fn test_partial_marks_gap_and_resyncs() {
        let tree = Node::document(vec![
            Node::leaf(TagKind::H1, "Alpha bravo"),
            Node::leaf(TagKind::Paragraph, "charlie delta echo foxtrot golf"),
            Node::leaf(TagKind::Paragraph, "hotel india"),
        ]);
        let stream = compress(&tree, CompressionLevel::Light);

        // Header, the whole H1, the P tag and TEXT opcode, then "charlie ".
        let cut = HEADER_SIZE + 2 + "Alpha bravo".len() + 1 + 2 + "charlie ".len();
        let mut units: Vec<_> = stream.bytes[..cut].iter().map(|b| StreamUnit::Byte(*b)).collect();
        units.push(StreamUnit::Unknown);
        units.extend(stream.bytes[cut + 8..].iter().map(|b| StreamUnit::Byte(*b)));

        let partial = decompress_partial(&units, statics()).unwrap();
        assert_eq!(partial.children[0], tree.children[0]);
        assert_eq!(partial.children[1].tag, TagKind::Paragraph);
        assert_eq!(partial.children[1].text.as_deref(), Some("charlie "));
        assert_eq!(partial.children[2].tag, TagKind::Lost);
        assert_eq!(partial.children[3], tree.children[2]);
        assert_eq!(partial.lost_markers(), 1);
    }

    #[test]
    fn test_partial_with_lost_header() {
        let tree = Node::document(vec![
            Node::leaf(TagKind::Paragraph, "one"),
            Node::leaf(TagKind::Paragraph, "two"),
        ]);
        let stream = compress(&tree, CompressionLevel::Light);
        let second = stream.bytes.len() - 6;

        let mut units = vec![StreamUnit::Unknown];
        units.extend(stream.bytes[second..].iter().map(|b| StreamUnit::Byte(*b)));

        let partial = decompress_partial(&units, statics()).unwrap();
        assert_eq!(
            partial.children,
            vec![Node::new(TagKind::Lost), Node::leaf(TagKind::Paragraph, "two")]
        );
    }
}
