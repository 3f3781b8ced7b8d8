pub mod api;
pub mod execution;
pub mod job;
pub mod lock;
