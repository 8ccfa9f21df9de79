//! PostgreSQL persistence for chat turns and generated plans.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
