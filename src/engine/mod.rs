// Reconciliation Engine Module
// Turns change notifications into an idempotently maintained lineage graph

pub mod columns;
pub mod dispatcher;
pub mod events;
pub mod lineage;
pub mod resolver;
pub mod retry;
pub mod timed;

pub use columns::{DerivedColumnReconciler, ReconcileOutcome, RetractOutcome};
pub use dispatcher::{DispatchOutcome, EventDispatcher, RunStats};
pub use events::{ChangeNotification, Decoded};
pub use lineage::{LineageGraphBuilder, LineageHandles, LineageProfile, LineageSource};
pub use resolver::{EntityRef, EntityResolver};
pub use retry::RetryPolicy;
pub use timed::TimedRepository;
