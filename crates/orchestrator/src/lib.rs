pub mod consumer;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod publisher;
pub mod schema;
pub mod store;
pub mod transition;

pub use consumer::EventConsumer;
pub use engine::{Engine, EventOutcome};
pub use error::{OrchestratorError, StoreError};
pub use ledger::{DedupLedger, LedgerOutcome};
pub use publisher::SideEffectPublisher;
pub use schema::{EventSchema, FieldKind, SchemaError, SchemaRegistry};
pub use store::{MemoryPhaseStore, PgPhaseStore, PhaseStore, ProcessedEvent, StoreOp};
pub use transition::{Effect, RequiredEventSet, TransitionManager, TransitionReport};
