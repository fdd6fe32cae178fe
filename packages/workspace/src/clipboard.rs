//! Copy, cut, and paste. Copy reads; cut is copy plus an awaited line-widened
//! deletion; paste inserts before the target's closing tag and then asks the
//! formatter for an advisory pass over the inserted range.

use std::sync::Arc;

use tandem_engine::{
    extract_dedented, resolve_element, resolve_range, DomSnapshot, EditOutcome, EditTarget,
    TextEdit,
};
use tandem_markup::{escape_text, Span};
use tracing::{debug, warn};

use crate::driver::{self, Prepare};
use crate::errors::SyncResult;
use crate::protocol::PasteRequest;
use crate::registry::SurfaceId;
use crate::router;
use crate::server::SyncContext;

/// Resolve the targets, dedent each extracted block against its first line's
/// indentation, and hand the joined result to the clipboard. Targets that no
/// longer resolve are skipped; with nothing resolved the clipboard is left
/// alone.
pub(crate) async fn copy(
    ctx: &Arc<SyncContext>,
    uri: &str,
    targets: &[EditTarget],
) -> SyncResult<()> {
    let current = ctx.host.read(uri).await?;
    let snapshot = DomSnapshot::parse(&current.text, current.version);
    let blocks: Vec<String> = targets
        .iter()
        .filter_map(|t| resolve_range(&snapshot, t))
        .map(|range| extract_dedented(&current.text, range))
        .collect();
    if blocks.is_empty() {
        debug!(uri, "copy resolved no targets");
        return Ok(());
    }
    ctx.clipboard.write(&blocks.join("\n")).await?;
    Ok(())
}

pub(crate) async fn cut(
    ctx: &Arc<SyncContext>,
    uri: &str,
    surface: SurfaceId,
    targets: &[EditTarget],
) -> SyncResult<EditOutcome> {
    copy(ctx, uri, targets).await?;
    driver::delete_targets(ctx, uri, surface, targets).await
}

pub(crate) async fn paste(
    ctx: &Arc<SyncContext>,
    uri: &str,
    surface: SurfaceId,
    request: &PasteRequest,
) -> SyncResult<EditOutcome> {
    let clip = ctx.clipboard.read().await?;
    let insert_text = if request.is_markup {
        clip
    } else {
        escape_text(&clip)
    };

    let (outcome, edits) = driver::apply_with_retry(ctx, uri, surface, |_current, snapshot| {
        let Some(el) = resolve_element(snapshot, &request.target) else {
            return Prepare::Gone;
        };
        let offset = el.insertion_offset();
        Prepare::Apply(vec![TextEdit::insert(offset, insert_text.clone())])
    })
    .await?;

    if let (EditOutcome::Applied { version }, Some(edit)) = (&outcome, edits.first()) {
        let inserted = Span::new(edit.range.start, edit.range.start + edit.text.len());
        format_pass(ctx, uri, surface, *version, inserted).await;
    }
    Ok(outcome)
}

/// Advisory formatting over the affected range. Anything that goes wrong here
/// is logged and swallowed; the paste already landed.
async fn format_pass(
    ctx: &Arc<SyncContext>,
    uri: &str,
    surface: SurfaceId,
    version: u64,
    range: Span,
) {
    let current = match ctx.host.read(uri).await {
        Ok(current) => current,
        Err(err) => {
            debug!(uri, error = %err, "format pass skipped");
            return;
        }
    };
    if current.version != version {
        debug!(uri, "format pass skipped, document moved");
        return;
    }
    let edits = match ctx.formatter.format_range(uri, range, &current.text).await {
        Ok(edits) => edits,
        Err(err) => {
            debug!(uri, error = %err, "formatter unavailable");
            return;
        }
    };
    if edits.is_empty() {
        return;
    }
    ctx.mark_edit_source(uri, surface);
    match ctx.host.apply_atomic(uri, &edits, current.version).await {
        Ok(version) => {
            debug!(uri, version, "formatting pass applied");
            if let Err(err) = router::route_document_changed(ctx, uri).await {
                warn!(uri, error = %err, "change routing failed");
            }
        }
        Err(err) => {
            debug!(uri, error = %err, "formatting pass dropped");
            ctx.clear_edit_source(uri, surface);
        }
    }
}
