use serde::{Deserialize, Serialize};

/// A `[start, end)` byte range into the source text the node was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// True when `other` lies entirely inside this span.
    pub fn covers(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Quoting style an attribute value used in the source. New values are
/// always written back double-quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quote {
    Double,
    Single,
    Bare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrValue {
    /// Value text exactly as written, quotes stripped, entities untouched.
    pub raw: String,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Option<AttrValue>,
    pub span: Span,
}

impl Attribute {
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_ref().map(|v| v.raw.as_str())
    }
}

/// An element with its tag, source-ordered attributes, and children.
///
/// `span` covers the whole element including both tags. `content_span` is the
/// range between the end of the open tag and the start of the close tag, and
/// is `None` for void and self-closing elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub span: Span,
    pub content_span: Option<Span>,
    pub self_closing: bool,
}

impl Element {
    /// Identity key: lowercased tag, `#id` when present, `.class` per class
    /// in source order. `<p class="a b">` yields `p.a.b`.
    pub fn short_name(&self) -> String {
        let mut name = self.tag.to_ascii_lowercase();
        if let Some(id) = self.attr("id") {
            if !id.is_empty() {
                name.push('#');
                name.push_str(id);
            }
        }
        for class in self.classes() {
            name.push('.');
            name.push_str(class);
        }
        name
    }

    /// Case-insensitive attribute lookup returning the raw value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .and_then(|a| a.value_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// Replaces the value in place when the attribute exists, otherwise
    /// appends a new attribute. Source order of existing attributes is kept.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let escaped = crate::serializer::escape_attr(value);
        if let Some(attr) = self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            attr.value = Some(AttrValue {
                raw: escaped,
                quote: Quote::Double,
            });
        } else {
            self.attributes.push(Attribute {
                name: name.to_string(),
                value: Some(AttrValue {
                    raw: escaped,
                    quote: Quote::Double,
                }),
                span: Span::new(0, 0),
            });
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.name.eq_ignore_ascii_case(name));
        self.attributes.len() != before
    }

    pub fn element_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Byte offset immediately before the closing tag, where new content is
    /// inserted. Void and self-closing elements have no interior, so the
    /// offset falls after the element instead.
    pub fn insertion_offset(&self) -> usize {
        match &self.content_span {
            Some(content) => content.end,
            None => self.span.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    /// Source text exactly as written, entities untouched.
    pub content: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    /// Full comment including the `<!--` and `-->` delimiters.
    pub raw: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctypeNode {
    pub raw: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    Element(Element),
    Text(TextNode),
    Comment(CommentNode),
    Doctype(DoctypeNode),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Node::Element(el) => el.span,
            Node::Text(t) => t.span,
            Node::Comment(c) => c.span,
            Node::Doctype(d) => d.span,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Node::Element(_) => "element",
            Node::Text(_) => "text",
            Node::Comment(_) => "comment",
            Node::Doctype(_) => "doctype",
        }
    }
}

/// A parsed document: the root node list plus the span of the whole source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub children: Vec<Node>,
    pub span: Span,
}

impl Document {
    /// Depth-first walk over every element in document order.
    pub fn visit_elements<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        fn walk<'a>(nodes: &'a [Node], f: &mut impl FnMut(&'a Element)) {
            for node in nodes {
                if let Node::Element(el) = node {
                    f(el);
                    walk(&el.children, f);
                }
            }
        }
        walk(&self.children, f);
    }

    pub fn element_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Tags that never have a closing tag in HTML.
pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t))
}

/// Tags whose content is raw text rather than markup.
pub fn is_rawtext_tag(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("script") || tag.eq_ignore_ascii_case("style")
}
