//! Executes queued jobs against the host. The per-edit lifecycle lives in
//! `tandem_engine::apply` as a pure machine; this module does the reads,
//! resolution, and version-checked writes around it, and routes the change
//! notification inline after a successful apply so suppression is consumed
//! in order.

use std::sync::Arc;

use tandem_engine::{
    merge_ranges, resolve_range, rewrite_fragment, widen_to_lines, ApplyEvent, ApplyMachine,
    ApplyState, DomSnapshot, DropReason, EditOutcome, EditRequest, EditTarget, FragmentError,
    TextEdit,
};
use tandem_markup::Span;
use tracing::{debug, error, warn};

use crate::clipboard;
use crate::errors::{HostError, SyncResult};
use crate::host::VersionedText;
use crate::queue::Job;
use crate::registry::SurfaceId;
use crate::router;
use crate::server::SyncContext;

pub(crate) async fn run_job(ctx: &Arc<SyncContext>, uri: &str, job: Job) {
    match job {
        Job::Edit {
            surface,
            requests,
            reply,
        } => {
            let result = apply_requests(ctx, uri, surface, &requests).await;
            let _ = reply.send(result);
        }
        Job::Delete {
            surface,
            targets,
            reply,
        } => {
            let result = delete_targets(ctx, uri, surface, &targets).await;
            let _ = reply.send(result);
        }
        Job::Cut {
            surface,
            targets,
            reply,
        } => {
            let result = clipboard::cut(ctx, uri, surface, &targets).await;
            let _ = reply.send(result);
        }
        Job::Paste {
            surface,
            request,
            reply,
        } => {
            let result = clipboard::paste(ctx, uri, surface, &request).await;
            let _ = reply.send(result);
        }
    }
}

async fn apply_requests(
    ctx: &Arc<SyncContext>,
    uri: &str,
    surface: SurfaceId,
    requests: &[EditRequest],
) -> SyncResult<Vec<EditOutcome>> {
    let mut outcomes = Vec::with_capacity(requests.len());
    for request in requests {
        let outcome = apply_edit(ctx, uri, surface, request).await?;
        if let EditOutcome::Dropped(reason) = &outcome {
            warn!(uri, target = %request.target.short_name, ?reason, "edit dropped");
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

pub(crate) async fn apply_edit(
    ctx: &Arc<SyncContext>,
    uri: &str,
    surface: SurfaceId,
    request: &EditRequest,
) -> SyncResult<EditOutcome> {
    let (outcome, _) = apply_with_retry(ctx, uri, surface, |current, snapshot| {
        let Some(range) = resolve_range(snapshot, &request.target) else {
            return Prepare::Gone;
        };
        match rewrite_fragment(&current.text[range.start..range.end], &request.ops) {
            Ok(rewritten) => Prepare::Apply(vec![TextEdit::replace(range, rewritten)]),
            Err(err) => Prepare::Reject(err),
        }
    })
    .await?;
    Ok(outcome)
}

pub(crate) async fn delete_targets(
    ctx: &Arc<SyncContext>,
    uri: &str,
    surface: SurfaceId,
    targets: &[EditTarget],
) -> SyncResult<EditOutcome> {
    let (outcome, _) = apply_with_retry(ctx, uri, surface, |current, snapshot| {
        let resolved: Vec<Span> = targets
            .iter()
            .filter_map(|t| resolve_range(snapshot, t))
            .collect();
        if resolved.is_empty() {
            return Prepare::Gone;
        }
        let widened = resolved
            .into_iter()
            .map(|range| widen_to_lines(&current.text, range))
            .collect();
        let edits = merge_ranges(widened)
            .into_iter()
            .map(TextEdit::delete)
            .collect();
        Prepare::Apply(edits)
    })
    .await?;
    Ok(outcome)
}

/// What one resolution attempt produced.
pub(crate) enum Prepare {
    Apply(Vec<TextEdit>),
    /// Target gone; silent drop.
    Gone,
    /// Fragment or operations rejected; drop, never retry.
    Reject(FragmentError),
}

/// Read, resolve, write, and retry per the apply machine. On success the
/// applied edits come back so callers can run follow-ups over the affected
/// range.
pub(crate) async fn apply_with_retry<F>(
    ctx: &Arc<SyncContext>,
    uri: &str,
    surface: SurfaceId,
    prepare: F,
) -> SyncResult<(EditOutcome, Vec<TextEdit>)>
where
    F: Fn(&VersionedText, &DomSnapshot) -> Prepare,
{
    let mut machine = ApplyMachine::new();
    loop {
        let current = match ctx.host.read(uri).await {
            Ok(current) => current,
            Err(err) => {
                ctx.clear_edit_source(uri, surface);
                return Err(err.into());
            }
        };
        let snapshot = DomSnapshot::parse(&current.text, current.version);

        let edits = match prepare(&current, &snapshot) {
            Prepare::Apply(edits) => edits,
            Prepare::Gone => {
                machine.advance(ApplyEvent::ResolutionFailed);
                ctx.clear_edit_source(uri, surface);
                return Ok((EditOutcome::Dropped(DropReason::TargetMissing), Vec::new()));
            }
            Prepare::Reject(err) => {
                machine.advance(ApplyEvent::FragmentRejected(err.clone()));
                ctx.clear_edit_source(uri, surface);
                return Ok((
                    EditOutcome::Dropped(DropReason::FragmentInvalid(err)),
                    Vec::new(),
                ));
            }
        };
        machine.advance(ApplyEvent::Resolved);

        // the change about to land is explained by this surface
        ctx.mark_edit_source(uri, surface);
        match ctx.host.apply_atomic(uri, &edits, current.version).await {
            Ok(version) => {
                machine.advance(ApplyEvent::ApplyOk { version });
                debug!(uri, version, attempt = machine.attempt(), "edit applied");
                if let Err(err) = router::route_document_changed(ctx, uri).await {
                    warn!(uri, error = %err, "change routing failed");
                }
                return Ok((EditOutcome::Applied { version }, edits));
            }
            Err(HostError::Stale { current: now, .. }) => {
                let state = machine
                    .advance(ApplyEvent::ApplyStale {
                        version_advanced: now > current.version,
                    })
                    .clone();
                if state == ApplyState::Retrying {
                    machine.advance(ApplyEvent::RetryBegun);
                    debug!(uri, attempt = machine.attempt(), "stale write, re-resolving");
                    continue;
                }
                let reason = match state {
                    ApplyState::Dropped(reason) => reason,
                    _ => DropReason::StaleNoProgress,
                };
                warn!(uri, ?reason, "edit dropped after stale write");
                ctx.clear_edit_source(uri, surface);
                return Ok((EditOutcome::Dropped(reason), Vec::new()));
            }
            Err(err) => {
                error!(uri, error = %err, "atomic apply failed");
                ctx.clear_edit_source(uri, surface);
                return Err(err.into());
            }
        }
    }
}
