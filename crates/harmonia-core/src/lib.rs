//! Harmonia communication-integrity pipeline.
//!
//! A draft is classified by the moderation filter, appended to the
//! per-thread message store, tracked for read state as the other guardian
//! opens the thread, and can be snapshotted at any time into a
//! deterministic plain-text evidentiary export carrying SHA-256
//! fingerprints.
//!
//! Every store mutation is serialized per thread and reported to the
//! external audit sink without blocking the caller.

pub mod audit;
pub mod clock;
pub mod error;
pub mod export;
pub mod metadata;
pub mod moderation;
pub mod store;
pub mod tracker;

pub use audit::{
    AuditDispatcher, AuditSink, HttpAuditSink, RetryPolicy, TracingAuditSink, spawn_audit_worker,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PipelineError, Result};
pub use export::{ExportDocument, ExportEngine, ExportRequest};
pub use metadata::{MetadataProvider, StaticMetadata};
pub use moderation::{ContentFilter, WordlistFilter};
pub use store::MessageStore;
