pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod queries;
