//! Behavioral event pipeline
//!
//! Classifies storefront interactions semantically, detects rapid-click
//! frustration, lets middleware override classification and delivers
//! deduplicated batches of event records to a sink.
//!
//! Pipeline: RawInteraction → Classifier → Middleware → Frustration → EventRecord → Ledger → Batch

pub mod capture;
pub mod classifier;
pub mod frustration;
pub mod ledger;
pub mod middleware;
pub mod pipeline;
pub mod sink;
pub mod store;
pub mod types;

pub use capture::{CaptureHandle, CaptureState};
pub use classifier::{ClassifierConfig, ElementClassifier, Evaluation};
pub use frustration::{identity_key, FrustrationConfig, FrustrationDetector};
pub use ledger::{EventLedger, LedgerConfig, PushOutcome, DEFAULT_STORAGE_KEY};
pub use middleware::{Middleware, MiddlewareChain, MiddlewareContext, MiddlewareOverride};
pub use pipeline::{EventPipeline, HandleOutcome};
pub use sink::{BatchSink, BufferSink, LogSink, NdjsonSink};
pub use store::{EventStore, FileStore, MemoryStore};
pub use types::{
    Batch, DedupStats, ElementDescriptor, EventRecord, EventType, FlushSummary, FlushTrigger,
    InteractionKind, InteractionTarget, LastFlush, LedgerStats, MiddlewareData, RawInteraction,
    SemanticScore,
};
