//! Turn orchestration: one inbound message → one agent turn.

mod turn;

use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::pool::WorkerPool;
use crate::router::InFlightTracker;
use crate::store::BindingStore;
use crate::telegram::gateway::Gateway;

pub use turn::{handle_inbound, run_turn};

/// Everything a turn needs, built once at startup and passed explicitly
/// into every orchestrator task.
pub struct AppContext {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// The worker pool (owns the pending queue).
    pub pool: WorkerPool,
    /// Outbound platform operations.
    pub gateway: Arc<dyn Gateway>,
    /// Thread→session persistence.
    pub store: BindingStore,
    /// Per-thread cancel signals for in-flight turns.
    pub inflight: InFlightTracker,
}
