//! Audit Log
//!
//! Operator-visible record of what happened to each notification:
//! - **Message set**: stable codes with severity and recommended actions
//! - **Store**: persistent JSON lines log with rotation and queries
//!
//! Tracing covers diagnostics; this log is what an operator reviews.

pub mod store;
pub mod types;

pub use store::AuditStore;
pub use types::*;
