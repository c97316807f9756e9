pub mod asset;
pub mod tag;
pub mod task;
