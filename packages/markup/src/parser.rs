use crate::ast::{
    is_void_tag, AttrValue, Attribute, CommentNode, Document, DoctypeNode, Element, Node,
    Quote, Span, TextNode,
};
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize, Token};

/// Parse a whole document. Tolerant and total: stray `<`, unmatched close
/// tags and unclosed elements all produce a tree rather than an error, so a
/// document can be snapshotted mid-edit.
pub fn parse(source: &str) -> Document {
    Parser::new(source).parse_document(source.len())
}

/// Parse a fragment that must be exactly one element, optionally surrounded
/// by whitespace. Anything else is rejected: the fragment is about to be
/// rewritten, and content outside the single element would be lost.
pub fn parse_fragment(source: &str) -> ParseResult<Element> {
    let doc = parse(source);
    let mut element: Option<Element> = None;
    let mut extra = 0usize;

    for node in doc.children {
        match node {
            Node::Element(el) => {
                if element.is_none() {
                    element = Some(el);
                } else {
                    extra += 1;
                }
            }
            Node::Text(t) if t.content.trim().is_empty() => {}
            other => {
                return Err(ParseError::not_an_element(
                    other.kind_str(),
                    other.span().start,
                ))
            }
        }
    }

    match element {
        Some(el) if extra == 0 => Ok(el),
        Some(_) => Err(ParseError::multiple_roots(extra + 1)),
        None => Err(ParseError::NoElement),
    }
}

/// How an open tag ended.
enum TagEnding {
    Gt,
    SlashGt,
    Eof,
}

/// An element whose close tag has not been seen yet.
struct OpenFrame {
    tag: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
    start: usize,
    content_start: usize,
}

impl OpenFrame {
    /// Close with an explicit close tag at `[close_start, close_end)`.
    fn close(self, close_start: usize, close_end: usize) -> Element {
        Element {
            tag: self.tag,
            attributes: self.attributes,
            children: self.children,
            span: Span::new(self.start, close_end),
            content_span: Some(Span::new(self.content_start, close_start)),
            self_closing: false,
        }
    }

    /// Close implicitly at `end` (EOF, or the close tag of an ancestor).
    fn close_at(self, end: usize) -> Element {
        Element {
            tag: self.tag,
            attributes: self.attributes,
            children: self.children,
            span: Span::new(self.start, end),
            content_span: Some(Span::new(self.content_start, end)),
            self_closing: false,
        }
    }
}

struct Parser<'src> {
    tokens: Vec<(Token<'src>, Span)>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            tokens: tokenize(source),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<(Token<'src>, Span)> {
        self.tokens.get(self.pos).cloned()
    }

    fn advance(&mut self) -> Option<(Token<'src>, Span)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn parse_document(mut self, len: usize) -> Document {
        let mut roots: Vec<Node> = Vec::new();
        let mut stack: Vec<OpenFrame> = Vec::new();

        while let Some((token, span)) = self.advance() {
            match token {
                Token::Text(s) | Token::RawText(s) => {
                    push_text(&mut stack, &mut roots, s, span);
                }
                Token::Comment(s) => {
                    attach(
                        &mut stack,
                        &mut roots,
                        Node::Comment(CommentNode {
                            raw: s.to_string(),
                            span,
                        }),
                    );
                }
                Token::Doctype(s) => {
                    attach(
                        &mut stack,
                        &mut roots,
                        Node::Doctype(DoctypeNode {
                            raw: s.to_string(),
                            span,
                        }),
                    );
                }
                Token::TagOpen(name) => {
                    let (attributes, interior_end, ending) =
                        self.parse_tag_interior(span.end);
                    match ending {
                        TagEnding::SlashGt => {
                            let el = Element {
                                tag: name.to_string(),
                                attributes,
                                children: Vec::new(),
                                span: Span::new(span.start, interior_end),
                                content_span: None,
                                self_closing: true,
                            };
                            attach(&mut stack, &mut roots, Node::Element(el));
                        }
                        TagEnding::Gt if is_void_tag(name) => {
                            let el = Element {
                                tag: name.to_string(),
                                attributes,
                                children: Vec::new(),
                                span: Span::new(span.start, interior_end),
                                content_span: None,
                                self_closing: false,
                            };
                            attach(&mut stack, &mut roots, Node::Element(el));
                        }
                        TagEnding::Gt => {
                            stack.push(OpenFrame {
                                tag: name.to_string(),
                                attributes,
                                children: Vec::new(),
                                start: span.start,
                                content_start: interior_end,
                            });
                        }
                        TagEnding::Eof => {
                            // open tag never ended; element runs to EOF
                            let el = Element {
                                tag: name.to_string(),
                                attributes,
                                children: Vec::new(),
                                span: Span::new(span.start, len),
                                content_span: None,
                                self_closing: false,
                            };
                            attach(&mut stack, &mut roots, Node::Element(el));
                        }
                    }
                }
                Token::TagClose(name) => {
                    match stack.iter().rposition(|f| f.tag.eq_ignore_ascii_case(name)) {
                        Some(idx) => {
                            // anything opened after the matching frame closes
                            // implicitly where this close tag begins
                            while stack.len() > idx + 1 {
                                if let Some(frame) = stack.pop() {
                                    let el = frame.close_at(span.start);
                                    attach(&mut stack, &mut roots, Node::Element(el));
                                }
                            }
                            if let Some(frame) = stack.pop() {
                                let el = frame.close(span.start, span.end);
                                attach(&mut stack, &mut roots, Node::Element(el));
                            }
                        }
                        // stray close tag with no open element: dropped
                        None => {}
                    }
                }
                // tag-interior tokens only appear between TagOpen and Gt,
                // which parse_tag_interior consumes
                Token::Ident(_) | Token::Quoted(_) | Token::Eq | Token::Gt
                | Token::SlashGt => {}
            }
        }

        while let Some(frame) = stack.pop() {
            let el = frame.close_at(len);
            attach(&mut stack, &mut roots, Node::Element(el));
        }

        Document {
            children: roots,
            span: Span::new(0, len),
        }
    }

    /// Consumes attribute tokens up to `>` / `/>`. Returns the attributes,
    /// the byte offset where the open tag ends, and how it ended.
    fn parse_tag_interior(
        &mut self,
        after_name: usize,
    ) -> (Vec<Attribute>, usize, TagEnding) {
        let mut attributes = Vec::new();
        let mut end = after_name;

        loop {
            let Some((token, span)) = self.peek() else {
                return (attributes, end, TagEnding::Eof);
            };
            match token {
                Token::Gt => {
                    self.advance();
                    return (attributes, span.end, TagEnding::Gt);
                }
                Token::SlashGt => {
                    self.advance();
                    return (attributes, span.end, TagEnding::SlashGt);
                }
                Token::Ident(name) => {
                    self.advance();
                    let mut attr_end = span.end;
                    let mut value = None;
                    if matches!(self.peek(), Some((Token::Eq, _))) {
                        self.advance();
                        match self.peek() {
                            Some((Token::Quoted(q), vspan)) => {
                                self.advance();
                                value = Some(parse_quoted(q));
                                attr_end = vspan.end;
                            }
                            Some((Token::Ident(v), vspan)) => {
                                self.advance();
                                value = Some(AttrValue {
                                    raw: v.to_string(),
                                    quote: Quote::Bare,
                                });
                                attr_end = vspan.end;
                            }
                            // `name=` directly before `>` or EOF: flag attr
                            _ => {}
                        }
                    }
                    attributes.push(Attribute {
                        name: name.to_string(),
                        value,
                        span: Span::new(span.start, attr_end),
                    });
                    end = attr_end;
                }
                // value without a name, stray equals: skip
                Token::Quoted(_) | Token::Eq => {
                    self.advance();
                    end = span.end;
                }
                // tokenizer left tag mode without a closer: treat as EOF-ended tag
                _ => return (attributes, end, TagEnding::Eof),
            }
        }
    }
}

fn parse_quoted(q: &str) -> AttrValue {
    let quote = if q.starts_with('\'') {
        Quote::Single
    } else {
        Quote::Double
    };
    let inner = &q[1..q.len().saturating_sub(1)];
    AttrValue {
        raw: inner.to_string(),
        quote,
    }
}

fn attach(stack: &mut [OpenFrame], roots: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(top) => top.children.push(node),
        None => roots.push(node),
    }
}

/// Pushes text, merging with a directly preceding text node so runs split by
/// the tokenizer come back together.
fn push_text(stack: &mut [OpenFrame], roots: &mut Vec<Node>, content: &str, span: Span) {
    let children = match stack.last_mut() {
        Some(top) => &mut top.children,
        None => roots,
    };
    if let Some(Node::Text(prev)) = children.last_mut() {
        if prev.span.end == span.start {
            prev.content.push_str(content);
            prev.span.end = span.end;
            return;
        }
    }
    children.push(Node::Text(TextNode {
        content: content.to_string(),
        span,
    }));
}
