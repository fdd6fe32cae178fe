//! The pure synchronization core: snapshots of the document tree, edit
//! targets and operations, stale-range resolution, and the apply-with-retry
//! state machine. Everything here is synchronous; the async driver lives in
//! `tandem-workspace`.

pub mod apply;
pub mod error;
pub mod locator;
pub mod ops;
pub mod selection;
pub mod snapshot;
pub mod target;

pub use apply::{
    splice, ApplyEvent, ApplyMachine, ApplyState, DropReason, EditOutcome, TextEdit,
    MAX_ATTEMPTS,
};
pub use error::FragmentError;
pub use locator::{resolve_element, resolve_range};
pub use ops::{apply_ops, rewrite_fragment, EditOp, EditRequest};
pub use selection::{covering_element_range, extract_dedented, merge_ranges, widen_to_lines};
pub use snapshot::{DomSnapshot, ElementRange, LocatedElement};
pub use target::EditTarget;
