use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tandem_markup::{parse, Document, Element, Node};

/// The element tree parsed from one exact document version.
///
/// A snapshot is built from the current text immediately before every
/// resolution and is never cached across an await point; the version tag
/// records which document state the spans refer to.
#[derive(Debug, Clone)]
pub struct DomSnapshot {
    version: u64,
    root: Document,
}

/// An element paired with its structural path (`div:0/p:1`).
#[derive(Debug, Clone)]
pub struct LocatedElement<'a> {
    pub element: &'a Element,
    pub path: String,
}

/// Wire payload of an offset resync: every element's identity and range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRange {
    #[serde(rename = "elementShortName")]
    pub short_name: String,
    pub start: usize,
    pub end: usize,
}

impl DomSnapshot {
    pub fn parse(text: &str, version: u64) -> Self {
        Self {
            version,
            root: parse(text),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn document(&self) -> &Document {
        &self.root
    }

    /// Depth-first walk in document order, each element with its path.
    pub fn elements(&self) -> Vec<LocatedElement<'_>> {
        let mut out = Vec::new();
        walk_with_paths(&self.root.children, "", &mut out);
        out
    }

    /// Direct structural lookup. Each `tag:index` segment counts element
    /// children of that tag, case-insensitively.
    pub fn resolve_path(&self, path: &str) -> Option<&Element> {
        let mut scope: Option<&Element> = None;
        for segment in path.split('/') {
            let (tag, index) = segment.split_once(':')?;
            let index: usize = index.parse().ok()?;
            let found = match scope {
                None => nth_of_tag(self.root.element_children(), tag, index),
                Some(el) => nth_of_tag(el.element_children(), tag, index),
            };
            scope = Some(found?);
        }
        scope
    }

    pub fn element_ranges(&self) -> Vec<ElementRange> {
        let mut out = Vec::new();
        self.root.visit_elements(&mut |el| {
            out.push(ElementRange {
                short_name: el.short_name(),
                start: el.span.start,
                end: el.span.end,
            });
        });
        out
    }

    /// External files the document references: stylesheet links, image,
    /// script and media sources.
    pub fn resource_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.visit_elements(&mut |el| {
            let attr = if el.tag.eq_ignore_ascii_case("link") {
                "href"
            } else if ["img", "script", "video", "audio", "source"]
                .iter()
                .any(|t| el.tag.eq_ignore_ascii_case(t))
            {
                "src"
            } else {
                return;
            };
            if let Some(value) = el.attr(attr) {
                if !value.is_empty() {
                    out.push(value.to_string());
                }
            }
        });
        out
    }
}

fn nth_of_tag<'a>(
    children: impl Iterator<Item = &'a Element>,
    tag: &str,
    index: usize,
) -> Option<&'a Element> {
    children
        .filter(|el| el.tag.eq_ignore_ascii_case(tag))
        .nth(index)
}

fn walk_with_paths<'a>(nodes: &'a [Node], prefix: &str, out: &mut Vec<LocatedElement<'a>>) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for node in nodes {
        let Node::Element(el) = node else { continue };
        let tag = el.tag.to_ascii_lowercase();
        let index = counts.entry(tag.clone()).or_insert(0);
        let path = if prefix.is_empty() {
            format!("{tag}:{index}")
        } else {
            format!("{prefix}/{tag}:{index}")
        };
        *index += 1;
        out.push(LocatedElement { element: el, path: path.clone() });
        walk_with_paths(&el.children, &path, out);
    }
}
