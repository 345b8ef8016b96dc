//! Bucketfs Storage Library
//!
//! A uniform storage driver abstraction: read, write, stat, exists, copy, move, delete
//! and list, implemented against an object store and against the local filesystem.
//! Callers hold an `Arc<dyn Driver>` and never depend on a concrete backend.
//!
//! # Path format
//!
//! Callers pass `/`-separated relative paths. Every driver resolves them under its
//! configured root through [`keys::PathResolver`]: redundant separators and `.` segments
//! are dropped and `..` never climbs above the root. `"."` and `""` both name the root
//! itself, which is what `list` uses to mean "everything".

pub mod client;
pub mod factory;
pub mod keys;
pub mod list;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod metadata;
pub mod object;
pub mod stream;
pub mod traits;

// Re-export commonly used types
pub use bucketfs_core::StorageBackend;
#[cfg(feature = "storage-object-store")]
pub use client::ObjectStoreClient;
#[cfg(feature = "storage-tos")]
pub use client::S3Client;
pub use client::{ObjectClient, MetadataDirective};
pub use factory::create_driver;
pub use keys::PathResolver;
#[cfg(feature = "storage-local")]
pub use local::LocalDriver;
pub use metadata::{ObjectMetadata, Stat};
pub use object::ObjectStorageDriver;
pub use stream::{byte_stream, read_to_bytes, ByteRange, ByteStream};
pub use traits::{Driver, StorageError, StorageResult};
