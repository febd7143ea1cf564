//! Canonical minimal-markup (MML) document model.
//!
//! A document is a tree of [`Node`]s rooted at a `Document` node. Every tag
//! comes from the closed [`TagKind`] registry; there is no free-form tag name
//! anywhere past the normalizer.
//!
//! # Canonical serialization
//!
//! ```text
//! <H1>Titre</H1><P>Texte <B>court</B>.</P><BR/>
//! ```
//!
//! - The `Document` root contributes only its children
//! - `Text` nodes contribute only their escaped text
//! - Void tags serialize as `<TAG/>`
//! - `<`, `>` and `\` in text and attribute values are backslash-escaped
//!
//! The byte length of this form is the denominator of the compression ratio.

use std::fmt::{self, Write as _};

/// Closed registry of supported structural elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    Document,
    /// Anonymous text run inside mixed content
    Text,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Paragraph,
    Division,
    Span,
    Section,
    Article,
    Header,
    Footer,
    Nav,
    Aside,
    UnorderedList,
    OrderedList,
    ListItem,
    Table,
    TableRow,
    TableCell,
    TableHeader,
    Link,
    Image,
    Strong,
    Emphasis,
    Code,
    Preformatted,
    Blockquote,
    Title,
    LineBreak,
    Rule,
    /// Marks content lost in transit
    Lost,
    Unsupported,
}

impl TagKind {
    /// Every tag, in registry order. Dictionary tag codes follow this order.
    pub const ALL: [TagKind; 36] = [
        TagKind::Document,
        TagKind::Text,
        TagKind::H1,
        TagKind::H2,
        TagKind::H3,
        TagKind::H4,
        TagKind::H5,
        TagKind::H6,
        TagKind::Paragraph,
        TagKind::Division,
        TagKind::Span,
        TagKind::Section,
        TagKind::Article,
        TagKind::Header,
        TagKind::Footer,
        TagKind::Nav,
        TagKind::Aside,
        TagKind::UnorderedList,
        TagKind::OrderedList,
        TagKind::ListItem,
        TagKind::Table,
        TagKind::TableRow,
        TagKind::TableCell,
        TagKind::TableHeader,
        TagKind::Link,
        TagKind::Image,
        TagKind::Strong,
        TagKind::Emphasis,
        TagKind::Code,
        TagKind::Preformatted,
        TagKind::Blockquote,
        TagKind::Title,
        TagKind::LineBreak,
        TagKind::Rule,
        TagKind::Lost,
        TagKind::Unsupported,
    ];

    /// Position in [`TagKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<TagKind> {
        Self::ALL.get(index).copied()
    }

    /// Short name used in the canonical serialization.
    pub fn mml_name(self) -> &'static str {
        match self {
            TagKind::Document => "DOC",
            TagKind::Text => "TX",
            TagKind::H1 => "H1",
            TagKind::H2 => "H2",
            TagKind::H3 => "H3",
            TagKind::H4 => "H4",
            TagKind::H5 => "H5",
            TagKind::H6 => "H6",
            TagKind::Paragraph => "P",
            TagKind::Division => "D",
            TagKind::Span => "S",
            TagKind::Section => "C",
            TagKind::Article => "A",
            TagKind::Header => "R",
            TagKind::Footer => "F",
            TagKind::Nav => "N",
            TagKind::Aside => "I",
            TagKind::UnorderedList => "U",
            TagKind::OrderedList => "O",
            TagKind::ListItem => "L",
            TagKind::Table => "T",
            TagKind::TableRow => "TR",
            TagKind::TableCell => "TD",
            TagKind::TableHeader => "TH",
            TagKind::Link => "K",
            TagKind::Image => "M",
            TagKind::Strong => "B",
            TagKind::Emphasis => "E",
            TagKind::Code => "CD",
            TagKind::Preformatted => "PR",
            TagKind::Blockquote => "Q",
            TagKind::Title => "J",
            TagKind::LineBreak => "BR",
            TagKind::Rule => "HR",
            TagKind::Lost => "LOST",
            TagKind::Unsupported => "X",
        }
    }

    pub fn heading(level: u8) -> Option<TagKind> {
        match level {
            1 => Some(TagKind::H1),
            2 => Some(TagKind::H2),
            3 => Some(TagKind::H3),
            4 => Some(TagKind::H4),
            5 => Some(TagKind::H5),
            6 => Some(TagKind::H6),
            _ => None,
        }
    }

    /// Void tags carry neither text nor children.
    pub fn is_void(self) -> bool {
        matches!(
            self,
            TagKind::LineBreak | TagKind::Rule | TagKind::Image | TagKind::Lost
        )
    }

    /// Block tags trim whitespace at their edges during normalization.
    pub fn is_block(self) -> bool {
        !matches!(
            self,
            TagKind::Text
                | TagKind::Span
                | TagKind::Link
                | TagKind::Strong
                | TagKind::Emphasis
                | TagKind::Code
                | TagKind::Image
                | TagKind::LineBreak
                | TagKind::Lost
                | TagKind::Unsupported
        )
    }

    /// Nesting rule: may `child` appear directly under `self`?
    pub fn allows_child(self, child: TagKind) -> bool {
        if child == TagKind::Document || self == TagKind::Text || self.is_void() {
            return false;
        }
        if child == TagKind::Lost {
            return true;
        }
        match self {
            TagKind::UnorderedList | TagKind::OrderedList => child == TagKind::ListItem,
            TagKind::Table => child == TagKind::TableRow,
            TagKind::TableRow => matches!(child, TagKind::TableCell | TagKind::TableHeader),
            _ => true,
        }
    }

    /// May this tag hold text directly?
    pub fn allows_text(self) -> bool {
        !self.is_void()
            && !matches!(
                self,
                TagKind::Document
                    | TagKind::UnorderedList
                    | TagKind::OrderedList
                    | TagKind::Table
                    | TagKind::TableRow
            )
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mml_name())
    }
}

/// One node of a canonical document tree.
///
/// A node holds either `text` (leaf) or `children`, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: TagKind,
    /// Ordered attribute pairs
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub text: Option<String>,
}

impl Node {
    pub fn new(tag: TagKind) -> Self {
        Self {
            tag,
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn document(children: Vec<Node>) -> Self {
        Self::new(TagKind::Document).with_children(children)
    }

    /// Leaf element holding text.
    pub fn leaf(tag: TagKind, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(tag)
        }
    }

    /// Anonymous text run for mixed content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::leaf(TagKind::Text, text)
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }

    /// Number of loss markers in this subtree.
    pub fn lost_markers(&self) -> usize {
        usize::from(self.tag == TagKind::Lost)
            + self.children.iter().map(Node::lost_markers).sum::<usize>()
    }

    /// Concatenated text of this subtree.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Canonical MML serialization.
    pub fn to_mml(&self) -> String {
        let mut out = String::new();
        self.write_mml(&mut out);
        out
    }

    fn write_mml(&self, out: &mut String) {
        match self.tag {
            TagKind::Document => {
                for child in &self.children {
                    child.write_mml(out);
                }
            }
            TagKind::Text if self.attributes.is_empty() && self.children.is_empty() => {
                escape_into(self.text.as_deref().unwrap_or_default(), out);
            }
            tag => {
                let _ = write!(out, "<{}", tag.mml_name());
                for (name, value) in &self.attributes {
                    let _ = write!(out, " {name}=\"");
                    escape_into(value, out);
                    out.push('"');
                }
                if self.text.is_none() && self.children.is_empty() && tag.is_void() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                if let Some(text) = &self.text {
                    escape_into(text, out);
                }
                for child in &self.children {
                    child.write_mml(out);
                }
                let _ = write!(out, "</{}>", tag.mml_name());
            }
        }
    }
}

/// Byte length of the canonical serialization of `tree`.
pub fn canonical_size(tree: &Node) -> usize {
    tree.to_mml().len()
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        if matches!(ch, '<' | '>' | '\\' | '"') {
            out.push('\\');
        }
        out.push(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_indices_round_trip() {
        for (i, tag) in TagKind::ALL.iter().enumerate() {
            assert_eq!(tag.index(), i);
            assert_eq!(TagKind::from_index(i), Some(*tag));
        }
        assert_eq!(TagKind::from_index(TagKind::ALL.len()), None);
    }

    #[test]
    fn test_canonical_serialization() {
        let doc = Node::document(vec![
            Node::leaf(TagKind::H1, "Titre"),
            Node::leaf(TagKind::Paragraph, "Texte court."),
        ]);
        assert_eq!(doc.to_mml(), "<H1>Titre</H1><P>Texte court.</P>");
        assert_eq!(canonical_size(&doc), 33);
    }

    #[test]
    fn test_mixed_content_and_void() {
        let doc = Node::document(vec![Node::new(TagKind::Paragraph).with_children(vec![
            Node::text("a < b "),
            Node::leaf(TagKind::Strong, "ok"),
            Node::new(TagKind::LineBreak),
        ])]);
        assert_eq!(doc.to_mml(), "<P>a \\< b <B>ok</B><BR/></P>");
    }

    #[test]
    fn test_attributes_serialize_in_order() {
        let link = Node::leaf(TagKind::Link, "site")
            .with_attribute("href", "http://x")
            .with_attribute("title", "say \"hi\"");
        assert_eq!(
            link.to_mml(),
            "<K href=\"http://x\" title=\"say \\\"hi\\\"\">site</K>"
        );
        assert_eq!(link.attribute("href"), Some("http://x"));
    }

    #[test]
    fn test_nesting_rules() {
        assert!(TagKind::UnorderedList.allows_child(TagKind::ListItem));
        assert!(!TagKind::UnorderedList.allows_child(TagKind::Paragraph));
        assert!(TagKind::UnorderedList.allows_child(TagKind::Lost));
        assert!(!TagKind::Table.allows_child(TagKind::TableCell));
        assert!(TagKind::TableRow.allows_child(TagKind::TableHeader));
        assert!(!TagKind::Paragraph.allows_child(TagKind::Document));
        assert!(!TagKind::Text.allows_child(TagKind::Strong));
        assert!(!TagKind::LineBreak.allows_child(TagKind::Text));
        assert!(!TagKind::Image.allows_text());
        assert!(TagKind::ListItem.allows_text());
    }

    #[test]
    fn test_counts() {
        let doc = Node::document(vec![
            Node::leaf(TagKind::Paragraph, "a"),
            Node::new(TagKind::Lost),
            Node::new(TagKind::Division).with_children(vec![Node::text("b")]),
        ]);
        assert_eq!(doc.node_count(), 5);
        assert_eq!(doc.lost_markers(), 1);
        assert_eq!(doc.plain_text(), "ab");
    }
}
