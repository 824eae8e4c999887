//! Caller-side state shared by every Skein client runtime.
//!
//! Nothing in here owns a socket or a task. The tokio client drives these
//! structures; other runtimes can drive them the same way.

mod call_metrics;
pub use call_metrics::*;

pub mod constants;

mod discovery;
pub use discovery::*;

mod instance;
pub use instance::*;

mod liveness;
pub use liveness::*;

pub mod load_balancer;
pub use load_balancer::{LoadBalanceStrategy, LoadBalancer, LoadBalancerRegistry, SelectContext};

mod pending_call_table;
pub use pending_call_table::*;
