//! Storefront Flux - On-device storefront personalization and session telemetry
//!
//! Flux resolves visitor intent from visit context into a structured content
//! and layout decision, and turns raw storefront interactions into
//! deduplicated, batched behavioral event records:
//! signal collection → intent resolution → decision composition, and
//! element classification → middleware → frustration detection → ledger.
//!
//! ## Modules
//!
//! - **Intent Engine**: Resolve a visit (query params + referrer) into a `Decision`
//! - **Behavior Module**: Classify interactions and deliver event batches to a sink

pub mod behavior;
pub mod collector;
pub mod composer;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod text;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::FluxConfig;
pub use error::{FluxError, SinkError, StoreError};
pub use pipeline::{visit_to_decision, IntentEngine};
pub use types::{Category, Confidence, Decision, FunnelStage, Signal, VisitContext};

// Behavioral exports
pub use behavior::{EventLedger, EventPipeline, EventRecord, FlushTrigger, RawInteraction};

/// Flux version
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI schema output
pub const PRODUCER_NAME: &str = "storefront-flux";
