//! Navigation consolidation, restoration and coordination.

pub mod lock;
pub mod pipeline;
pub mod record;
pub mod restoration;
pub mod scroll;

pub use lock::{LockRelease, LockToken, NavigationLock};
pub use pipeline::{consolidate, PipelineContext, PipelineOutcome};
pub use record::{
    ItemSnapshot, NavigationDirection, NavigationDraft, NavigationId, NavigationKind,
    NavigationMeta, NavigationRecord, NavigationRequest, TriggeredBy,
};
pub use restoration::restore;
pub use scroll::ScrollSettler;
