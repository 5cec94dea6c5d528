// Field worker pool: read-only directory snapshots plus the engine-owned
// open assignment counters.

pub mod directory;
pub mod types;
pub mod workload;

pub use directory::{InMemoryWorkerDirectory, WorkerDirectory};
#[cfg(any(test, feature = "testing"))]
pub use directory::MockWorkerDirectory;
pub use types::{normalize_key, LiveStatus, SkillAliases, WorkerId, WorkerSnapshot, GENERALIST_SKILL};
pub use workload::WorkloadLedger;
