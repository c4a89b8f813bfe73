//! Session lifecycle: records, the bounded pool, and the named registry.

pub mod pool;
pub mod record;
pub mod registry;

pub use pool::{PoolConfig, PoolCounts, PoolError, SessionPool, SharedRecord};
pub use record::{ActionHistory, ActionRecord, PerfCounters, SessionRecord, ACTION_HISTORY_CAP};
pub use registry::{RegistryError, RegistryMetrics, SessionRegistry, SessionSummary};
