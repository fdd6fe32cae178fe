//! Every document change funnels through here. Per surface, an edit-source
//! flag decides between an offset resync (`codeRanges`) and a full re-render;
//! resource saves re-render unconditionally; human selections are projected
//! onto covering elements and broadcast.

use std::sync::Arc;

use tandem_engine::{covering_element_range, DomSnapshot};
use tandem_markup::Span;
use tracing::debug;

use crate::errors::SyncResult;
use crate::protocol::{EngineMessage, SelectionKind};
use crate::server::SyncContext;

pub(crate) async fn route_document_changed(ctx: &Arc<SyncContext>, uri: &str) -> SyncResult<()> {
    let current = ctx.host.read(uri).await?;
    let snapshot = DomSnapshot::parse(&current.text, current.version);
    let ranges = snapshot.element_ranges();

    // flags are consumed and links refreshed under one lock, then the
    // channel sends happen without it
    let routes = {
        let mut registry = ctx.registry.write().unwrap();
        registry.set_resource_links(uri, snapshot.resource_paths());
        registry.take_routing(uri)
    };

    for route in routes {
        let message = if route.suppressed {
            EngineMessage::CodeRanges {
                data: ranges.clone(),
            }
        } else {
            EngineMessage::Render {
                html: current.text.clone(),
            }
        };
        debug!(
            uri,
            surface = %route.id,
            suppressed = route.suppressed,
            "routing document change"
        );
        if route.sender.send(message).await.is_err() {
            debug!(uri, surface = %route.id, "surface channel closed");
        }
    }
    Ok(())
}

/// A referenced file was saved: full re-render to every surface of every
/// linked document. Suppression flags are neither consulted nor consumed.
pub(crate) async fn route_resource_saved(ctx: &Arc<SyncContext>, path: &str) -> SyncResult<()> {
    let uris = { ctx.registry.read().unwrap().documents_for_resource(path) };
    if uris.is_empty() {
        debug!(path, "saved file referenced by no open document");
        return Ok(());
    }
    for uri in uris {
        let current = match ctx.host.read(&uri).await {
            Ok(current) => current,
            Err(err) => {
                debug!(uri, error = %err, "skipping resource re-render");
                continue;
            }
        };
        let snapshot = DomSnapshot::parse(&current.text, current.version);
        let senders = {
            let mut registry = ctx.registry.write().unwrap();
            registry.set_resource_links(&uri, snapshot.resource_paths());
            registry.senders_of(&uri)
        };
        debug!(uri, path, surfaces = senders.len(), "resource save re-render");
        for sender in senders {
            let _ = sender
                .send(EngineMessage::Render {
                    html: current.text.clone(),
                })
                .await;
        }
    }
    Ok(())
}

/// Project a document selection onto the deepest covering elements and
/// broadcast the highlight. Programmatic selections are filtered out.
pub(crate) async fn route_selection(
    ctx: &Arc<SyncContext>,
    uri: &str,
    ranges: &[Span],
    kind: SelectionKind,
) -> SyncResult<()> {
    if !kind.is_human() {
        debug!(uri, ?kind, "ignoring programmatic selection");
        return Ok(());
    }
    let current = ctx.host.read(uri).await?;
    let snapshot = DomSnapshot::parse(&current.text, current.version);
    let mut spans: Vec<Span> = ranges
        .iter()
        .filter_map(|range| covering_element_range(snapshot.document(), *range))
        .collect();
    spans.dedup();

    let senders = { ctx.registry.read().unwrap().senders_of(uri) };
    for sender in senders {
        let _ = sender
            .send(EngineMessage::Select { data: spans.clone() })
            .await;
    }
    Ok(())
}
