// Work orders: data model, guarded transitions and the versioned store.

pub mod state_machine;
pub mod store;
pub mod types;

pub use state_machine::{
    apply_transition, transition_target, OrderAction, OrderActionKind, Transition,
    WORKER_DECLINED_REASON,
};
pub use store::OrderStore;
pub use types::{
    Actor, AssignmentAction, AssignmentEvent, CustomerContact, NewWorkOrder, OrderId,
    OrderStatus, ProjectAddress, VisitKind, WorkOrder,
};
