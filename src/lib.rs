//! Core building blocks shared by every Skein crate: the request/response
//! message model, the envelope frame codec, and the error taxonomy.

pub mod constants;
pub mod frame;
pub mod rpc;
pub mod utils;
