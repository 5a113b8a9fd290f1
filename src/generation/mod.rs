//! Generation Pipeline
//!
//! Everything between an admitted request and its result envelope: the
//! vendor client seam, the bounded poll loop, the audit trail, and the
//! orchestrator that sequences check, fan-out, the single post-success
//! quota charge, and best-effort persistence.

pub mod audit;
pub mod envelope;
pub mod orchestrator;
pub mod poller;
pub mod vendor;

pub use audit::{AuditRecord, AuditStats, AuditStore, GenerationStatus, InMemoryAuditStore};
pub use envelope::{GenerationRequest, GenerationResponse, ItemOutcome, PersonImage};
pub use orchestrator::GenerationOrchestrator;
pub use poller::{poll_to_completion, PollPolicy};
pub use vendor::{
    GarmentCategory, GenerationVendor, HttpVendorClient, TaskHandle, TaskPoll, TaskState,
    VendorError,
};
