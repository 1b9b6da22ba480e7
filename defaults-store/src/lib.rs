//! # defaults-store - Durable default action records
//!
//! Keeps the user's preferred action per association key ("image/*",
//! "x-scheme/mailto", ...) across process restarts.
//!
//! ## Key Features
//! - Async [`DefaultsStore`] trait consumed by the resolver
//! - In-memory store for tests and ephemeral sessions
//! - File-backed store with versioned MessagePack records, checksums,
//!   atomic temp-file swapping and backup recovery
//! - Single-writer discipline: writes are serialized, readers never block on them

pub mod error;
pub mod memory;
pub mod persistence;
pub mod store;

// Re-export main types for easy use
pub use error::{DefaultsError, DefaultsResult};
pub use memory::MemoryDefaults;
pub use persistence::{FileDefaults, PersistenceConfig};
pub use store::{DefaultRecord, DefaultsStore};
