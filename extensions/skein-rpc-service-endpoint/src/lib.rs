mod dispatcher;
pub use dispatcher::*;

mod invoker_registry;
pub use invoker_registry::*;

mod service_invoker;
pub use service_invoker::*;
