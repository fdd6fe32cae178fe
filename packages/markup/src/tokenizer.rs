use logos::Logos;

use crate::ast::{is_rawtext_tag, Span};

/// Document-level tokens. No skip patterns: every byte of text content must
/// end up in a token so node spans stay exact.
#[derive(Logos, Debug, Clone, PartialEq)]
enum DocToken {
    #[regex(r"<!--([^-]|-[^-]|--[^>])*-->", priority = 10)]
    Comment,

    #[regex(r"<![^>]*>")]
    Doctype,

    #[regex(r"</[a-zA-Z][^>]*>")]
    TagClose,

    #[regex(r"<[a-zA-Z][a-zA-Z0-9:_-]*")]
    TagOpen,

    #[token("<")]
    StrayLt,

    #[regex(r"[^<]+")]
    Text,
}

/// Tokens inside an open tag, between the tag name and `>` / `/>`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum AttrToken {
    #[token("/>")]
    SelfClose,

    #[token(">")]
    Gt,

    #[token("=")]
    Eq,

    #[regex(r#""[^"]*""#)]
    DoubleQuoted,

    #[regex(r"'[^']*'")]
    SingleQuoted,

    #[regex(r#"[^\s"'>/=]+"#)]
    Ident,

    #[token("/")]
    Slash,
}

/// Flat token stream the parser consumes. Tag-interior tokens are
/// interleaved between `TagOpen` and `Gt`/`SlashGt`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    Text(&'src str),
    Comment(&'src str),
    Doctype(&'src str),
    /// Tag name only, `<` stripped.
    TagOpen(&'src str),
    /// Tag name only, `</` and `>` stripped.
    TagClose(&'src str),
    Ident(&'src str),
    /// Quoted attribute value including its quotes.
    Quoted(&'src str),
    Eq,
    Gt,
    SlashGt,
    /// Content of a `script`/`style` element, verbatim.
    RawText(&'src str),
}

/// Tokenize a source string. Never fails: anything that does not lex as
/// markup comes out as text.
pub fn tokenize(source: &str) -> Vec<(Token<'_>, Span)> {
    let mut tokens = Vec::new();
    let mut outer = DocToken::lexer(source);

    while let Some(result) = outer.next() {
        let span = to_span(outer.span());
        match result {
            Ok(DocToken::Text) => tokens.push((Token::Text(outer.slice()), span)),
            Ok(DocToken::StrayLt) => tokens.push((Token::Text(outer.slice()), span)),
            Ok(DocToken::Comment) => tokens.push((Token::Comment(outer.slice()), span)),
            Ok(DocToken::Doctype) => tokens.push((Token::Doctype(outer.slice()), span)),
            Ok(DocToken::TagClose) => {
                tokens.push((Token::TagClose(close_tag_name(outer.slice())), span));
            }
            Ok(DocToken::TagOpen) => {
                let name = &outer.slice()[1..];
                tokens.push((Token::TagOpen(name), span));

                let mut inner = outer.morph::<AttrToken>();
                let mut open_ended = false;
                let mut self_closed = false;
                while let Some(res) = inner.next() {
                    let ispan = to_span(inner.span());
                    match res {
                        Ok(AttrToken::Gt) => {
                            tokens.push((Token::Gt, ispan));
                            open_ended = true;
                            break;
                        }
                        Ok(AttrToken::SelfClose) => {
                            tokens.push((Token::SlashGt, ispan));
                            open_ended = true;
                            self_closed = true;
                            break;
                        }
                        Ok(AttrToken::Eq) => tokens.push((Token::Eq, ispan)),
                        Ok(AttrToken::Ident) => {
                            tokens.push((Token::Ident(inner.slice()), ispan))
                        }
                        Ok(AttrToken::DoubleQuoted) | Ok(AttrToken::SingleQuoted) => {
                            tokens.push((Token::Quoted(inner.slice()), ispan))
                        }
                        Ok(AttrToken::Slash) => {}
                        Err(()) => {}
                    }
                }
                outer = inner.morph();

                if open_ended && !self_closed && is_rawtext_tag(name) {
                    let rest = outer.remainder();
                    let start = source.len() - rest.len();
                    let needle = format!("</{}", name.to_ascii_lowercase());
                    let end = find_ascii_ci(rest, &needle).unwrap_or(rest.len());
                    if end > 0 {
                        tokens.push((
                            Token::RawText(&rest[..end]),
                            Span::new(start, start + end),
                        ));
                        outer.bump(end);
                    }
                }
            }
            Err(()) => tokens.push((Token::Text(outer.slice()), span)),
        }
    }

    tokens
}

fn to_span(range: std::ops::Range<usize>) -> Span {
    Span::new(range.start, range.end)
}

/// Extracts the tag name out of a `</name ...>` slice.
fn close_tag_name(slice: &str) -> &str {
    let body = &slice[2..];
    let end = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-'))
        .unwrap_or(body.len());
    &body[..end]
}

/// Case-insensitive substring search; `needle` must already be lowercase.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let ned = needle.as_bytes();
    if ned.is_empty() || hay.len() < ned.len() {
        return None;
    }
    (0..=hay.len() - ned.len()).find(|&i| {
        hay[i..i + ned.len()]
            .iter()
            .zip(ned.iter())
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
    })
}
