//! Analytics subsystem: metric ingestion, summaries, and the external
//! data dependency served through the circuit breaker.
//!
//! # Data Flow
//! ```text
//! POST /api/metrics        → storage.rs (append MetricRecord)
//! GET  /api/metrics/summary→ summary.rs (cache lookup, else aggregate)
//! GET  /api/external-data  → external.rs via CircuitBreaker
//! ```

pub mod external;
pub mod storage;
pub mod summary;

pub use external::{ExternalData, ExternalService, ExternalServiceError};
pub use storage::{MetricRecord, MetricStore};
pub use summary::{MetricSummary, SummaryService};
