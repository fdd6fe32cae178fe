use serde::{Deserialize, Serialize};
use tandem_markup::{
    escape_text, is_rawtext_tag, is_void_tag, parse_fragment, serialize_element,
    AttrValue, Attribute, Element, Node, Quote, Span, TextNode,
};

use crate::error::FragmentError;
use crate::target::EditTarget;

/// One mutation against a resolved element. Wire shape is a tagged union:
/// `{ "type": "setStyle", "property": "color", "value": "red" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditOp {
    SetAttribute { name: String, value: String },
    RemoveAttribute { name: String },
    SetStyle { property: String, value: String },
    RemoveStyle { property: String },
    ReplaceClasses { classes: Vec<String> },
    SetText { content: String },
}

/// A target descriptor plus the operations to run against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub target: EditTarget,
    pub ops: Vec<EditOp>,
}

impl EditRequest {
    pub fn new(target: EditTarget, ops: Vec<EditOp>) -> Self {
        Self { target, ops }
    }
}

/// Parse a sliced fragment, run the operations, serialize back.
///
/// The fragment must be exactly one element; anything else is a rejection,
/// never retried.
pub fn rewrite_fragment(fragment: &str, ops: &[EditOp]) -> Result<String, FragmentError> {
    let mut el = parse_fragment(fragment)?;
    apply_ops(&mut el, ops)?;
    Ok(serialize_element(&el))
}

pub fn apply_ops(el: &mut Element, ops: &[EditOp]) -> Result<(), FragmentError> {
    for op in ops {
        apply_op(el, op)?;
    }
    Ok(())
}

fn apply_op(el: &mut Element, op: &EditOp) -> Result<(), FragmentError> {
    match op {
        EditOp::SetAttribute { name, value } => {
            el.set_attr(name, value);
        }
        EditOp::RemoveAttribute { name } => {
            el.remove_attr(name);
        }
        EditOp::SetStyle { property, value } => {
            validate_style_property(property)?;
            validate_style_value(property, value)?;
            let mut decls = parse_style(el.attr("style").unwrap_or(""));
            match decls
                .iter_mut()
                .find(|d| d.property.eq_ignore_ascii_case(property))
            {
                Some(decl) => decl.value = value.clone(),
                None => decls.push(StyleDecl {
                    property: property.clone(),
                    value: value.clone(),
                }),
            }
            write_style(el, &decls);
        }
        EditOp::RemoveStyle { property } => {
            let mut decls = parse_style(el.attr("style").unwrap_or(""));
            decls.retain(|d| !d.property.eq_ignore_ascii_case(property));
            if decls.is_empty() {
                el.remove_attr("style");
            } else {
                write_style(el, &decls);
            }
        }
        EditOp::ReplaceClasses { classes } => {
            if classes.is_empty() {
                el.remove_attr("class");
            } else {
                el.set_attr("class", &classes.join(" "));
            }
        }
        EditOp::SetText { content } => {
            if is_void_tag(&el.tag) {
                return Err(FragmentError::VoidElement {
                    tag: el.tag.clone(),
                });
            }
            // a self-closing element gains an interior when given text
            el.self_closing = false;
            el.children.clear();
            if !content.is_empty() {
                let written = if is_rawtext_tag(&el.tag) {
                    content.clone()
                } else {
                    escape_text(content)
                };
                el.children.push(Node::Text(TextNode {
                    content: written,
                    span: Span::new(0, 0),
                }));
            }
        }
    }
    Ok(())
}

struct StyleDecl {
    property: String,
    value: String,
}

/// `;`-separated declarations, each `property: value`. Parts without a colon
/// are dropped on rewrite.
fn parse_style(raw: &str) -> Vec<StyleDecl> {
    raw.split(';')
        .filter_map(|part| {
            let (property, value) = part.split_once(':')?;
            let property = property.trim();
            if property.is_empty() {
                return None;
            }
            Some(StyleDecl {
                property: property.to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Existing declarations came from source text verbatim, so the merged value
/// is written back without entity escaping. Quote style is kept when the old
/// value was single-quoted, everything else ends up double-quoted; value
/// validation keeps both quote characters out of new declarations.
fn write_style(el: &mut Element, decls: &[StyleDecl]) {
    let raw = decls
        .iter()
        .map(|d| format!("{}:{}", d.property, d.value))
        .collect::<Vec<_>>()
        .join("; ");
    let quote = match el
        .attributes
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case("style"))
        .and_then(|a| a.value.as_ref())
    {
        Some(v) if v.quote == Quote::Single && !raw.contains('\'') => Quote::Single,
        _ => Quote::Double,
    };
    let value = Some(AttrValue { raw, quote });
    if let Some(attr) = el
        .attributes
        .iter_mut()
        .find(|a| a.name.eq_ignore_ascii_case("style"))
    {
        attr.value = value;
    } else {
        el.attributes.push(Attribute {
            name: "style".to_string(),
            value,
            span: Span::new(0, 0),
        });
    }
}

fn validate_style_property(property: &str) -> Result<(), FragmentError> {
    let ok = !property.is_empty()
        && property
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(FragmentError::InvalidStyleProperty {
            property: property.to_string(),
        })
    }
}

fn validate_style_value(property: &str, value: &str) -> Result<(), FragmentError> {
    let ok = !value.trim().is_empty()
        && !value.contains([';', '{', '}', '"', '\'']);
    if ok {
        Ok(())
    } else {
        Err(FragmentError::InvalidStyleValue {
            property: property.to_string(),
            value: value.to_string(),
        })
    }
}
