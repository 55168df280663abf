//! Object storage layer
//!
//! - `ObjectStore`: the object operations the storage service relies on
//! - `S3Client`: S3-compatible HTTP implementation with AWS SigV4 signing
//! - `MemoryStore`: in-process implementation with the same listing rules

pub mod client;
pub mod memory;
pub mod signer;
pub mod store;
pub mod types;

pub use client::{ClientOptions, Result, S3Client, S3Error};
pub use memory::{MemoryStore, Operation};
pub use signer::S3SignerV4;
pub use store::ObjectStore;
pub use types::{ListObjectsResponse, ObjectBody, ObjectStream, S3Object};
