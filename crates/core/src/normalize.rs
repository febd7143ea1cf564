//! Markup normalization: source element tree to canonical MML tree.
//!
//! The front end (an HTML or Markdown parser living outside this crate)
//! hands over a [`SourceNode`] tree with free-form tag names. Normalization
//! resolves every name against the closed [`TagKind`] registry:
//!
//! - Supported tags map directly (`h1` → H1, `a` → Link, ...)
//! - Unsupported tags with a close structural relative are remapped
//!   (`main` → Section, `kbd` → Code, ...) and counted as remapped
//! - Transparent wrappers (`html`, `body`, `tbody`, ...) are unwrapped
//! - Non-content subtrees (`script`, `style`, ...) are dropped and counted
//! - Anything else is unwrapped, keeping its content, and counted as dropped
//!
//! Whitespace collapses to single spaces, block elements trim their edges,
//! and `pre` content is kept verbatim. The result also satisfies the nesting
//! rules in [`TagKind::allows_child`]: stray list and table content is wrapped
//! in the element it is missing. Elements at [`MAX_DEPTH`] keep only their
//! text; anything nested below them is flattened and counted.
//!
//! Normalization is pure and deterministic.

use crate::compressor::MAX_DEPTH;
use crate::markup::{Node, TagKind};
use tracing::debug;

/// Element tree produced by an external markup parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceNode {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<SourceNode>,
    },
    Text(String),
    Comment(String),
}

impl SourceNode {
    pub fn element(name: impl Into<String>, children: Vec<SourceNode>) -> Self {
        SourceNode::Element {
            name: name.into(),
            attributes: Vec::new(),
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        SourceNode::Text(text.into())
    }

    /// Add an attribute; no effect on text or comment nodes.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let SourceNode::Element { attributes, .. } = &mut self {
            attributes.push((key.into(), value.into()));
        }
        self
    }
}

/// Unsupported tags met during normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LossReport {
    /// Tags replaced by their nearest supported equivalent
    pub remapped: usize,
    /// Tags removed (with or without their content)
    pub dropped: usize,
    /// Source names of every remapped or dropped tag, in document order
    pub tags: Vec<String>,
    /// Elements whose subtree was flattened to text at the nesting limit
    pub flattened: usize,
}

impl LossReport {
    pub fn unsupported_tags(&self) -> usize {
        self.remapped + self.dropped
    }

    pub fn is_lossless(&self) -> bool {
        self.unsupported_tags() == 0 && self.flattened == 0
    }

    fn remap(&mut self, name: &str) {
        self.remapped += 1;
        self.tags.push(name.to_string());
    }

    fn drop(&mut self, name: &str) {
        self.dropped += 1;
        self.tags.push(name.to_string());
    }
}

/// Output of normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub tree: Node,
    pub losses: LossReport,
}

/// Normalize one source tree (typically the `html` element).
pub fn normalize(source: &SourceNode) -> Normalized {
    normalize_all(std::slice::from_ref(source))
}

/// Normalize a sequence of top-level source nodes into one document.
pub fn normalize_all(sources: &[SourceNode]) -> Normalized {
    let mut normalizer = Normalizer::default();
    let children = sources
        .iter()
        .flat_map(|source| normalizer.convert(source, false))
        .collect();

    let mut tree = finalize(Node::document(children), false);
    let mut losses = normalizer.losses;
    for child in &mut tree.children {
        limit_depth(child, 1, &mut losses);
    }
    debug!(
        nodes = tree.node_count(),
        remapped = losses.remapped,
        dropped = losses.dropped,
        flattened = losses.flattened,
        "normalized document"
    );

    Normalized { tree, losses }
}

enum Resolution {
    Tag(TagKind),
    Remap(TagKind),
    Transparent,
    Skip,
    Unknown,
}

fn resolve(name: &str) -> Resolution {
    use Resolution::*;

    match name {
        "h1" => Tag(TagKind::H1),
        "h2" => Tag(TagKind::H2),
        "h3" => Tag(TagKind::H3),
        "h4" => Tag(TagKind::H4),
        "h5" => Tag(TagKind::H5),
        "h6" => Tag(TagKind::H6),
        "p" => Tag(TagKind::Paragraph),
        "div" => Tag(TagKind::Division),
        "span" => Tag(TagKind::Span),
        "section" => Tag(TagKind::Section),
        "article" => Tag(TagKind::Article),
        "header" => Tag(TagKind::Header),
        "footer" => Tag(TagKind::Footer),
        "nav" => Tag(TagKind::Nav),
        "aside" => Tag(TagKind::Aside),
        "ul" => Tag(TagKind::UnorderedList),
        "ol" => Tag(TagKind::OrderedList),
        "li" => Tag(TagKind::ListItem),
        "table" => Tag(TagKind::Table),
        "tr" => Tag(TagKind::TableRow),
        "td" => Tag(TagKind::TableCell),
        "th" => Tag(TagKind::TableHeader),
        "a" => Tag(TagKind::Link),
        "img" => Tag(TagKind::Image),
        "strong" | "b" => Tag(TagKind::Strong),
        "em" | "i" => Tag(TagKind::Emphasis),
        "code" => Tag(TagKind::Code),
        "pre" => Tag(TagKind::Preformatted),
        "blockquote" => Tag(TagKind::Blockquote),
        "title" => Tag(TagKind::Title),
        "br" => Tag(TagKind::LineBreak),
        "hr" => Tag(TagKind::Rule),

        "main" => Remap(TagKind::Section),
        "hgroup" => Remap(TagKind::Header),
        "figure" | "details" | "fieldset" | "form" | "center" => Remap(TagKind::Division),
        "dl" | "menu" => Remap(TagKind::UnorderedList),
        "dt" | "dd" => Remap(TagKind::ListItem),
        "mark" => Remap(TagKind::Strong),
        "u" | "cite" | "q" | "dfn" => Remap(TagKind::Emphasis),
        "kbd" | "samp" | "tt" | "var" => Remap(TagKind::Code),
        "small" | "sub" | "sup" | "abbr" | "font" | "s" | "del" | "ins" | "time" | "label"
        | "bdi" => Remap(TagKind::Span),
        "caption" | "figcaption" | "summary" | "address" | "legend" => {
            Remap(TagKind::Paragraph)
        }

        "html" | "body" | "head" | "thead" | "tbody" | "tfoot" => Transparent,

        "script" | "style" | "noscript" | "meta" | "link" | "template" | "iframe" | "object"
        | "embed" | "svg" | "canvas" | "video" | "audio" | "input" | "button" | "select"
        | "textarea" | "colgroup" | "base" => Skip,

        _ => Unknown,
    }
}

/// Attributes kept per tag, in output order.
fn attribute_whitelist(tag: TagKind) -> &'static [&'static str] {
    match tag {
        TagKind::Link => &["href", "title"],
        TagKind::Image => &["src", "alt", "title"],
        TagKind::TableCell | TagKind::TableHeader => &["colspan", "rowspan"],
        TagKind::OrderedList => &["start"],
        _ => &[],
    }
}

#[derive(Default)]
struct Normalizer {
    losses: LossReport,
}

impl Normalizer {
    fn convert(&mut self, source: &SourceNode, pre: bool) -> Vec<Node> {
        match source {
            SourceNode::Comment(_) => Vec::new(),
            SourceNode::Text(text) if pre => vec![Node::text(text.clone())],
            SourceNode::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if collapsed.is_empty() {
                    Vec::new()
                } else {
                    vec![Node::text(collapsed)]
                }
            }
            SourceNode::Element {
                name,
                attributes,
                children,
            } => {
                let lowered = name.to_ascii_lowercase();
                match resolve(&lowered) {
                    Resolution::Tag(tag) => vec![self.build(tag, attributes, children, pre)],
                    Resolution::Remap(tag) => {
                        self.losses.remap(&lowered);
                        vec![self.build(tag, attributes, children, pre)]
                    }
                    Resolution::Transparent => self.convert_children(children, pre),
                    Resolution::Skip => {
                        self.losses.drop(&lowered);
                        Vec::new()
                    }
                    Resolution::Unknown => {
                        self.losses.drop(&lowered);
                        self.convert_children(children, pre)
                    }
                }
            }
        }
    }

    fn convert_children(&mut self, children: &[SourceNode], pre: bool) -> Vec<Node> {
        children
            .iter()
            .flat_map(|child| self.convert(child, pre))
            .collect()
    }

    fn build(
        &mut self,
        tag: TagKind,
        attributes: &[(String, String)],
        children: &[SourceNode],
        pre: bool,
    ) -> Node {
        let pre = pre || tag == TagKind::Preformatted;
        let mut node = Node::new(tag);

        for wanted in attribute_whitelist(tag) {
            if let Some((_, value)) = attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
            {
                node.attributes
                    .push((wanted.to_string(), value.trim().to_string()));
            }
        }

        if tag.is_void() {
            return node;
        }

        node.children = self.convert_children(children, pre);
        finalize(node, pre)
    }
}

/// Collapse every whitespace run to one space. Edge spaces survive so inline
/// boundaries keep their separation; block trimming removes them later.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

fn is_text_run(node: &Node) -> bool {
    node.tag == TagKind::Text && node.children.is_empty() && node.attributes.is_empty()
}

fn is_block_boundary(node: &Node) -> bool {
    node.tag.is_block() && node.tag != TagKind::Text
}

/// Merge, trim, repair and fold the children of a freshly built node.
fn finalize(mut node: Node, pre: bool) -> Node {
    let mut children = merge_text_runs(std::mem::take(&mut node.children), pre);

    if !pre {
        trim_against_blocks(&mut children);
        if node.tag.is_block() {
            trim_edges(&mut children);
        }
        children.retain(|child| !is_text_run(child) || child.text.as_deref() != Some(""));
    }

    node.children = repair_structure(node.tag, children);

    // A sole text run folds into the parent's own text.
    if node.tag != TagKind::Text
        && node.tag.allows_text()
        && node.children.len() == 1
        && is_text_run(&node.children[0])
    {
        node.text = node.children.pop().and_then(|child| child.text);
    }

    node
}

fn merge_text_runs(children: Vec<Node>, pre: bool) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::with_capacity(children.len());
    for child in children {
        if let (Some(last), true) = (merged.last_mut(), is_text_run(&child)) {
            if is_text_run(last) {
                let mut text = last.text.take().unwrap_or_default();
                text.push_str(child.text.as_deref().unwrap_or_default());
                last.text = Some(if pre { text } else { collapse_whitespace(&text) });
                continue;
            }
        }
        merged.push(child);
    }
    merged
}

/// Text next to a block sibling loses the whitespace facing that sibling.
fn trim_against_blocks(children: &mut [Node]) {
    for i in 0..children.len() {
        if !is_text_run(&children[i]) {
            continue;
        }
        let after_block = i > 0 && is_block_boundary(&children[i - 1]);
        let before_block = children.get(i + 1).is_some_and(is_block_boundary);
        if let Some(text) = children[i].text.as_mut() {
            if after_block {
                *text = text.trim_start().to_string();
            }
            if before_block {
                *text = text.trim_end().to_string();
            }
        }
    }
}

/// Trim leading whitespace of the first inline content and trailing
/// whitespace of the last, descending into inline elements.
fn trim_edges(children: &mut [Node]) {
    if let Some(first) = children.first_mut() {
        trim_inline(first, true);
    }
    if let Some(last) = children.last_mut() {
        trim_inline(last, false);
    }
}

fn trim_inline(node: &mut Node, leading: bool) {
    if is_block_boundary(node) {
        return;
    }
    if let Some(text) = node.text.as_mut() {
        *text = if leading {
            text.trim_start().to_string()
        } else {
            text.trim_end().to_string()
        };
        if text.is_empty() && node.tag != TagKind::Text {
            node.text = None;
        }
        return;
    }
    let edge = if leading {
        node.children.first_mut()
    } else {
        node.children.last_mut()
    };
    if let Some(child) = edge {
        trim_inline(child, leading);
    }
}

/// Flatten every element sitting at `MAX_DEPTH` that still has children.
/// Its subtree text becomes its own text where the tag allows text and is
/// dropped otherwise.
fn limit_depth(node: &mut Node, depth: usize, losses: &mut LossReport) {
    if depth < MAX_DEPTH {
        for child in &mut node.children {
            limit_depth(child, depth + 1, losses);
        }
        return;
    }
    if node.children.is_empty() {
        return;
    }

    let text = node.plain_text();
    node.children.clear();
    losses.flattened += 1;
    if !node.tag.allows_text() {
        return;
    }
    let text = if node.tag == TagKind::Preformatted {
        text
    } else {
        collapse_whitespace(&text).trim().to_string()
    };
    if !text.is_empty() {
        node.text = Some(text);
    }
}

/// Wrap children that the nesting rules do not allow directly under `tag`.
fn repair_structure(tag: TagKind, children: Vec<Node>) -> Vec<Node> {
    let wrapper = match tag {
        TagKind::UnorderedList | TagKind::OrderedList => TagKind::ListItem,
        TagKind::Table => TagKind::TableRow,
        TagKind::TableRow => TagKind::TableCell,
        _ => return children,
    };

    let mut repaired = Vec::with_capacity(children.len());
    let mut stray: Vec<Node> = Vec::new();

    for child in children {
        if is_text_run(&child) && child.text.as_deref().is_some_and(|t| t.trim().is_empty()) {
            continue;
        }
        if tag.allows_child(child.tag) {
            flush_stray(tag, wrapper, &mut stray, &mut repaired);
            repaired.push(child);
        } else {
            stray.push(child);
        }
    }
    flush_stray(tag, wrapper, &mut stray, &mut repaired);

    repaired
}

fn flush_stray(parent: TagKind, wrapper: TagKind, stray: &mut Vec<Node>, out: &mut Vec<Node>) {
    if stray.is_empty() {
        return;
    }
    let run = std::mem::take(stray);

    // Bare cells directly under a table need a row; anything else needs a cell too.
    let node = if parent == TagKind::Table
        && !run
            .iter()
            .all(|n| matches!(n.tag, TagKind::TableCell | TagKind::TableHeader))
    {
        let cell = finalize(Node::new(TagKind::TableCell).with_children(run), false);
        Node::new(TagKind::TableRow).with_children(vec![cell])
    } else {
        finalize(Node::new(wrapper).with_children(run), false)
    };

    out.push(node);
}
