use crate::ast::{is_void_tag, Element, Node, Quote};

/// Serialize an element back to markup.
///
/// Text and comment nodes are emitted verbatim from their parsed form, so an
/// untouched element round-trips byte-for-byte when the source used single
/// spaces between attributes. Attribute whitespace inside rewritten tags is
/// normalized to single spaces.
pub fn serialize_element(el: &Element) -> String {
    let mut out = String::new();
    write_element(el, &mut out);
    out
}

pub fn serialize_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(el) => write_element(el, out),
        Node::Text(t) => out.push_str(&t.content),
        Node::Comment(c) => out.push_str(&c.raw),
        Node::Doctype(d) => out.push_str(&d.raw),
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for attr in &el.attributes {
        out.push(' ');
        out.push_str(&attr.name);
        if let Some(value) = &attr.value {
            out.push('=');
            match value.quote {
                Quote::Double => {
                    out.push('"');
                    out.push_str(&value.raw);
                    out.push('"');
                }
                Quote::Single => {
                    out.push('\'');
                    out.push_str(&value.raw);
                    out.push('\'');
                }
                Quote::Bare => out.push_str(&value.raw),
            }
        }
    }

    if el.self_closing {
        out.push_str("/>");
        return;
    }
    out.push('>');
    if is_void_tag(&el.tag) {
        return;
    }

    for child in &el.children {
        serialize_node(child, out);
    }

    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

/// Escape text content: `&`, `<`, `>`.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a double-quoted attribute value: `&`, `"`.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
