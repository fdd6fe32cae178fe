use serde::{Deserialize, Serialize};
use tandem_markup::Span;

/// Identifies an element the way the surface last saw it.
///
/// `captured` is the element's byte range at capture time and may be stale by
/// the time the edit reaches the document. `dom_path` is a structural path
/// (`tag:index` segments over element children, e.g. `div:0/p:1`) and
/// survives pure offset shifts; the short name plus captured range is the
/// fallback identity when structure moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_path: Option<String>,
    #[serde(rename = "elementShortName")]
    pub short_name: String,
    #[serde(rename = "capturedRange")]
    pub captured: Span,
}

impl EditTarget {
    pub fn new(short_name: impl Into<String>, captured: Span) -> Self {
        Self {
            dom_path: None,
            short_name: short_name.into(),
            captured,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.dom_path = Some(path.into());
        self
    }
}
