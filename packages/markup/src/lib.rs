//! Tolerant HTML-subset parsing with exact byte spans, plus strict fragment
//! parsing and re-serialization for in-place rewrites.

pub mod ast;
pub mod error;
pub mod parser;
pub mod serializer;
pub mod tokenizer;

pub use ast::{
    is_rawtext_tag, is_void_tag, AttrValue, Attribute, CommentNode, Document,
    DoctypeNode, Element, Node, Quote, Span, TextNode,
};
pub use error::{ParseError, ParseResult};
pub use parser::{parse, parse_fragment};
pub use serializer::{escape_attr, escape_text, serialize_element, serialize_node};
pub use tokenizer::{tokenize, Token};
