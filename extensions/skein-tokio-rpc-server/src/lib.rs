//! Note: This `RpcServer` does not authenticate or authorize callers. Put an
//! authenticating filter in front of the services, or run it on a trusted
//! network.

mod config;
pub use config::*;

mod in_flight;

mod rpc_server;
pub use rpc_server::*;

pub mod utils;
