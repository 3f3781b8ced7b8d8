//! Marketplace job scheduler
//!
//! Periodic jobs (product and order collection across Coupang, Naver and
//! 11st, database backups and a few placeholders) are stored in PostgreSQL.
//! The scheduler daemon polls them, takes a per-job lock row, runs the
//! registered handler and records every attempt as an execution. The
//! operator API manages jobs and reads execution history.

pub mod app_state;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod shutdown;
pub mod store;
