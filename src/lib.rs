//! Job catalog with a read-through, write-invalidated cache over SQLite.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod invalidation;
pub mod logging;
pub mod model;
pub mod store;
