pub mod cache;
pub mod digest;
pub mod hash;
pub mod load;
