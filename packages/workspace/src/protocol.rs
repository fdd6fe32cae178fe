//! Wire-shaped messages between surfaces and the engine. Transport is out of
//! scope here; both sides are plain serde types with a `type` tag, matched
//! exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_engine::{EditRequest, EditTarget, ElementRange};
use tandem_markup::Span;

/// What a surface sends in. Target references are the same descriptor edits
/// carry: structural path, short name, captured range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurfaceMessage {
    Edit { data: Vec<EditRequest> },
    Delete { data: Vec<EditTarget> },
    Copy { data: Vec<EditTarget> },
    Cut { data: Vec<EditTarget> },
    Paste { data: PasteRequest },
    Select { data: Vec<Span> },
    Refresh,
    /// Opaque surface state, relayed to sibling surfaces untouched.
    State { data: Value },
}

/// What the engine pushes out to a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineMessage {
    /// Full re-render: the current document text.
    Render { html: String },
    /// Offset resync after a change the surface itself caused.
    CodeRanges { data: Vec<ElementRange> },
    /// Highlight projection of a document selection.
    Select { data: Vec<Span> },
    State { data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteRequest {
    pub target: EditTarget,
    pub is_markup: bool,
}

/// Origin of a document selection change. Only human-originated selections
/// are projected back out as highlights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionKind {
    Keyboard,
    Mouse,
    Command,
}

impl SelectionKind {
    pub fn is_human(&self) -> bool {
        matches!(self, SelectionKind::Keyboard | SelectionKind::Mouse)
    }
}
