mod config;
pub use config::*;

mod connection;
pub use connection::*;

mod heartbeat;
pub use heartbeat::*;

mod rpc_client;
pub use rpc_client::*;

mod service_reference;
pub use service_reference::*;

mod transport;
pub use transport::*;
