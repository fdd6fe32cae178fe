use tandem_markup::{Element, Span};
use tracing::debug;

use crate::snapshot::DomSnapshot;
use crate::target::EditTarget;

/// Resolves a target descriptor against a fresh snapshot.
///
/// Two phases: the structural path first (immune to pure offset shifts),
/// then a scan over elements sharing the short name whose current span still
/// covers the captured range, picking the tightest fit. `None` means the
/// target is gone and the edit is silently dropped.
pub fn resolve_element<'a>(
    snapshot: &'a DomSnapshot,
    target: &EditTarget,
) -> Option<&'a Element> {
    if let Some(path) = &target.dom_path {
        if let Some(el) = snapshot.resolve_path(path) {
            if el.short_name() == target.short_name {
                debug!(path, short_name = %target.short_name, "resolved by structural path");
                return Some(el);
            }
            debug!(
                path,
                expected = %target.short_name,
                found = %el.short_name(),
                "path points at a different element, falling back to scan"
            );
        }
    }

    let mut with_name = 0usize;
    let mut best: Option<(&Element, usize)> = None;
    snapshot.document().visit_elements(&mut |el| {
        if el.short_name() != target.short_name {
            return;
        }
        with_name += 1;
        if !el.span.covers(&target.captured) {
            return;
        }
        let drift = (target.captured.start - el.span.start)
            + (el.span.end - target.captured.end);
        match best {
            // earlier element wins ties
            Some((_, d)) if d <= drift => {}
            _ => best = Some((el, drift)),
        }
    });

    match best {
        Some((el, drift)) => {
            debug!(short_name = %target.short_name, drift, "resolved by covering scan");
            Some(el)
        }
        None => {
            // distinguishes "target gone" from "locator could not absorb the
            // drift" so dropped edits stay debuggable
            if with_name == 0 {
                debug!(
                    short_name = %target.short_name,
                    "no element with this short name, target gone"
                );
            } else {
                debug!(
                    short_name = %target.short_name,
                    candidates = with_name,
                    captured_start = target.captured.start,
                    captured_end = target.captured.end,
                    "short name present but no span covers the captured range"
                );
            }
            None
        }
    }
}

/// The resolved element's current byte range.
pub fn resolve_range(snapshot: &DomSnapshot, target: &EditTarget) -> Option<Span> {
    resolve_element(snapshot, target).map(|el| el.span)
}
