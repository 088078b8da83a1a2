//! ============================================================================
//! Pipeline - stream consumption, routing, bounded per-item work
//! ============================================================================

pub mod ingest;
pub mod retry;
pub mod router;
pub mod supervisor;
pub mod worker_pool;

pub use ingest::{post_from_status, AccountFilter};
pub use retry::{calculate_delay, BackoffConfig};
pub use router::{decode_event, IngestionRouter, PayloadHandler, RouteOutcome, StreamEvent};
pub use supervisor::{StreamSupervisor, SupervisorConfig, SupervisorState};
pub use worker_pool::WorkerPool;
