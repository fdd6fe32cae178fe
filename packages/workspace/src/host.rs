//! External collaborator seams.
//!
//! The engine never touches text directly: it reads versioned snapshots and
//! submits atomic, version-checked edits through [`TextHost`]. Clipboard and
//! code formatting are separate services so an editor integration can wire
//! in its own. [`MemoryHost`] backs all three in memory and is the test host.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tandem_engine::{splice, TextEdit};
use tandem_markup::Span;

use crate::errors::HostError;

/// One read of a document: its text and the version that text belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedText {
    pub text: String,
    pub version: u64,
}

/// The text-mutation service owning the authoritative document buffers.
#[async_trait]
pub trait TextHost: Send + Sync {
    async fn read(&self, uri: &str) -> Result<VersionedText, HostError>;

    /// Apply non-overlapping edits as one atomic replacement. Fails with
    /// [`HostError::Stale`] when the document is no longer at
    /// `expected_version`; an edit set that changes nothing must not bump
    /// the version.
    async fn apply_atomic(
        &self,
        uri: &str,
        edits: &[TextEdit],
        expected_version: u64,
    ) -> Result<u64, HostError>;

    async fn set_selections(&self, uri: &str, ranges: &[Span]) -> Result<(), HostError>;
}

#[async_trait]
pub trait ClipboardService: Send + Sync {
    async fn write(&self, text: &str) -> Result<(), HostError>;
    async fn read(&self) -> Result<String, HostError>;
}

/// Advisory code formatting. Returned edits are applied like any other edit;
/// failures are logged and swallowed.
#[async_trait]
pub trait FormatterService: Send + Sync {
    async fn format_range(
        &self,
        uri: &str,
        range: Span,
        text: &str,
    ) -> Result<Vec<TextEdit>, HostError>;
}

/// Formatter that never has an opinion.
pub struct NoFormatter;

#[async_trait]
impl FormatterService for NoFormatter {
    async fn format_range(
        &self,
        _uri: &str,
        _range: Span,
        _text: &str,
    ) -> Result<Vec<TextEdit>, HostError> {
        Ok(Vec::new())
    }
}

/// In-memory host: versioned buffers, recorded selections, a clipboard slot,
/// and an injection point for simulating edits made behind the engine's back.
#[derive(Default)]
pub struct MemoryHost {
    inner: Mutex<MemoryHostInner>,
}

#[derive(Default)]
struct MemoryHostInner {
    documents: HashMap<String, VersionedText>,
    selections: HashMap<String, Vec<Span>>,
    clipboard: String,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document at version 1.
    pub fn open(&self, uri: &str, text: &str) {
        self.inner.lock().unwrap().documents.insert(
            uri.to_string(),
            VersionedText {
                text: text.to_string(),
                version: 1,
            },
        );
    }

    pub fn close(&self, uri: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.documents.remove(uri);
        inner.selections.remove(uri);
    }

    /// Splice an edit in without a version check, as another author would.
    /// Always bumps the version; the caller is responsible for notifying the
    /// engine through `document_changed`.
    pub fn external_edit(&self, uri: &str, edit: &TextEdit) -> Result<u64, HostError> {
        let mut inner = self.inner.lock().unwrap();
        let doc = inner
            .documents
            .get_mut(uri)
            .ok_or_else(|| HostError::DocumentClosed(uri.to_string()))?;
        doc.text = splice(&doc.text, std::slice::from_ref(edit));
        doc.version += 1;
        Ok(doc.version)
    }

    pub fn text_of(&self, uri: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .documents
            .get(uri)
            .map(|d| d.text.clone())
    }

    pub fn version_of(&self, uri: &str) -> Option<u64> {
        self.inner
            .lock()
            .unwrap()
            .documents
            .get(uri)
            .map(|d| d.version)
    }

    pub fn selections_of(&self, uri: &str) -> Vec<Span> {
        self.inner
            .lock()
            .unwrap()
            .selections
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clipboard_text(&self) -> String {
        self.inner.lock().unwrap().clipboard.clone()
    }

    pub fn set_clipboard(&self, text: &str) {
        self.inner.lock().unwrap().clipboard = text.to_string();
    }
}

#[async_trait]
impl TextHost for MemoryHost {
    async fn read(&self, uri: &str) -> Result<VersionedText, HostError> {
        self.inner
            .lock()
            .unwrap()
            .documents
            .get(uri)
            .cloned()
            .ok_or_else(|| HostError::DocumentClosed(uri.to_string()))
    }

    async fn apply_atomic(
        &self,
        uri: &str,
        edits: &[TextEdit],
        expected_version: u64,
    ) -> Result<u64, HostError> {
        let mut inner = self.inner.lock().unwrap();
        let doc = inner
            .documents
            .get_mut(uri)
            .ok_or_else(|| HostError::DocumentClosed(uri.to_string()))?;
        if doc.version != expected_version {
            return Err(HostError::Stale {
                expected: expected_version,
                current: doc.version,
            });
        }
        for edit in edits {
            if edit.range.end < edit.range.start || edit.range.end > doc.text.len() {
                return Err(HostError::InvalidRange);
            }
        }
        if edits.iter().all(|e| e.is_noop_on(&doc.text)) {
            return Ok(doc.version);
        }
        doc.text = splice(&doc.text, edits);
        doc.version += 1;
        Ok(doc.version)
    }

    async fn set_selections(&self, uri: &str, ranges: &[Span]) -> Result<(), HostError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.documents.contains_key(uri) {
            return Err(HostError::DocumentClosed(uri.to_string()));
        }
        inner.selections.insert(uri.to_string(), ranges.to_vec());
        Ok(())
    }
}

#[async_trait]
impl ClipboardService for MemoryHost {
    async fn write(&self, text: &str) -> Result<(), HostError> {
        self.inner.lock().unwrap().clipboard = text.to_string();
        Ok(())
    }

    async fn read(&self) -> Result<String, HostError> {
        Ok(self.inner.lock().unwrap().clipboard.clone())
    }
}
