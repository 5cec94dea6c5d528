// Field Dispatch Library - work-order assignment and SLA tracking for field crews
// This exposes the core components for testing and integration

pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod observability;
pub mod orders;
pub mod sinks;
pub mod sla;
pub mod telemetry;
pub mod workers;

// Re-export key types for easy access
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{config, init_config, DispatchConfig};
pub use dispatch::{
    AssignTarget, BatchOutcome, DispatchEngine, DispatchEngineBuilder, EscalationSweep,
    OrderFilter, OrderView, ReminderOutcome,
};
pub use errors::{DispatchError, ErrorKind};
pub use observability::{DispatchMetrics, DispatchStats, OperationTimer};
pub use orders::{
    Actor, AssignmentAction, AssignmentEvent, NewWorkOrder, OrderId, OrderStatus, VisitKind,
    WorkOrder,
};
pub use sinks::{AuditTrail, NotificationGateway, NotificationTemplate};
pub use sla::{SlaMonitor, SlaPolicy, SlaReport, SlaThresholds, SlaTier};
pub use telemetry::{create_dispatch_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use workers::{LiveStatus, WorkerDirectory, WorkerId, WorkerSnapshot};
