mod codec;
pub use codec::*;

pub mod constants;

mod filter;
pub use filter::*;

mod method_args;
pub use method_args::*;
