//! Storage layer module.
//!
//! This module provides trait-based storage abstraction over a local disk or
//! S3-compatible backend, a key-value store on top of it, and the `Driver`
//! that ties both to configuration.

pub mod disk;
pub mod driver;
pub mod factory;
pub mod kv;
pub mod s3;
pub mod traits;

pub use crate::error::StorageError;
pub use driver::Driver;
pub use factory::create_storage;
pub use kv::KvStore;
pub use traits::{Presign, Storage};
