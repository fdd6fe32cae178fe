//! Per-document bookkeeping: attached surfaces with their outbound channels
//! and edit-source flags, plus the resource-link index that maps saved files
//! back to the documents referencing them. One registry instance owns all of
//! it; the server guards it with a lock held only for non-await sections.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;

use crate::protocol::EngineMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SurfaceHandle {
    id: SurfaceId,
    sender: mpsc::Sender<EngineMessage>,
    edit_source: bool,
}

/// A surface's routing decision for one document change: where to send, and
/// whether the change is explained by that surface's own edit.
pub struct RouteEntry {
    pub id: SurfaceId,
    pub sender: mpsc::Sender<EngineMessage>,
    pub suppressed: bool,
}

#[derive(Default)]
pub struct Registry {
    next_surface: u64,
    surfaces: HashMap<String, Vec<SurfaceHandle>>,
    resources: HashMap<String, Vec<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_surface(
        &mut self,
        uri: &str,
        sender: mpsc::Sender<EngineMessage>,
    ) -> SurfaceId {
        self.next_surface += 1;
        let id = SurfaceId(self.next_surface);
        self.surfaces
            .entry(uri.to_string())
            .or_default()
            .push(SurfaceHandle {
                id,
                sender,
                edit_source: false,
            });
        id
    }

    pub fn detach_surface(&mut self, uri: &str, id: SurfaceId) -> bool {
        let Some(handles) = self.surfaces.get_mut(uri) else {
            return false;
        };
        let before = handles.len();
        handles.retain(|h| h.id != id);
        handles.len() != before
    }

    pub fn surface_count(&self, uri: &str) -> usize {
        self.surfaces.get(uri).map(Vec::len).unwrap_or(0)
    }

    pub fn mark_edit_source(&mut self, uri: &str, id: SurfaceId) {
        if let Some(handle) = self.handle_mut(uri, id) {
            handle.edit_source = true;
        }
    }

    pub fn clear_edit_source(&mut self, uri: &str, id: SurfaceId) {
        if let Some(handle) = self.handle_mut(uri, id) {
            handle.edit_source = false;
        }
    }

    pub fn edit_source(&self, uri: &str, id: SurfaceId) -> bool {
        self.surfaces
            .get(uri)
            .and_then(|handles| handles.iter().find(|h| h.id == id))
            .map(|h| h.edit_source)
            .unwrap_or(false)
    }

    /// Routing for one document change. Consumes every edit-source flag: a
    /// flag explains exactly one change notification.
    pub fn take_routing(&mut self, uri: &str) -> Vec<RouteEntry> {
        let Some(handles) = self.surfaces.get_mut(uri) else {
            return Vec::new();
        };
        handles
            .iter_mut()
            .map(|h| {
                let suppressed = h.edit_source;
                h.edit_source = false;
                RouteEntry {
                    id: h.id,
                    sender: h.sender.clone(),
                    suppressed,
                }
            })
            .collect()
    }

    /// All outbound channels for a document, flags untouched.
    pub fn senders_of(&self, uri: &str) -> Vec<mpsc::Sender<EngineMessage>> {
        self.surfaces
            .get(uri)
            .map(|handles| handles.iter().map(|h| h.sender.clone()).collect())
            .unwrap_or_default()
    }

    pub fn sender_of(&self, uri: &str, id: SurfaceId) -> Option<mpsc::Sender<EngineMessage>> {
        self.surfaces
            .get(uri)?
            .iter()
            .find(|h| h.id == id)
            .map(|h| h.sender.clone())
    }

    /// Every surface of the document except the named one.
    pub fn siblings_of(&self, uri: &str, id: SurfaceId) -> Vec<mpsc::Sender<EngineMessage>> {
        self.surfaces
            .get(uri)
            .map(|handles| {
                handles
                    .iter()
                    .filter(|h| h.id != id)
                    .map(|h| h.sender.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace a document's resource links, as extracted from its latest
    /// snapshot.
    pub fn set_resource_links(&mut self, uri: &str, links: Vec<String>) {
        if links.is_empty() {
            self.resources.remove(uri);
        } else {
            self.resources.insert(uri.to_string(), links);
        }
    }

    /// Documents whose link set matches a saved file path.
    pub fn documents_for_resource(&self, saved: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .resources
            .iter()
            .filter(|(_, links)| links.iter().any(|l| link_matches_saved(l, saved)))
            .map(|(uri, _)| uri.clone())
            .collect();
        out.sort();
        out
    }

    pub fn close_document(&mut self, uri: &str) {
        self.surfaces.remove(uri);
        self.resources.remove(uri);
    }

    fn handle_mut(&mut self, uri: &str, id: SurfaceId) -> Option<&mut SurfaceHandle> {
        self.surfaces
            .get_mut(uri)?
            .iter_mut()
            .find(|h| h.id == id)
    }
}

/// Lexical path cleanup: drops `.` segments, resolves `..` against what came
/// before, treats `/` and `\` alike. No filesystem access.
fn lexical_segments(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for seg in path.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            _ => out.push(seg),
        }
    }
    out
}

/// A relative link matches a saved path when its cleaned segments are a
/// suffix of the saved path's segments. Remote URLs never match.
fn link_matches_saved(link: &str, saved: &str) -> bool {
    if link.contains("://") || link.starts_with("//") {
        return false;
    }
    let link_segs = lexical_segments(link);
    if link_segs.is_empty() {
        return false;
    }
    lexical_segments(saved).ends_with(&link_segs)
}
