mod increment_u32_id;
mod now;

pub use increment_u32_id::IncrementU32Id;
pub use now::now;
