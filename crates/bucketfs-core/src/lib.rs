//! Bucketfs Core Library
//!
//! Configuration and backend selection types shared by every storage driver.

pub mod config;
pub mod storage_types;

pub use config::{DriverConfig, ResolvedDriverConfig, StorageSettings};
pub use storage_types::StorageBackend;
