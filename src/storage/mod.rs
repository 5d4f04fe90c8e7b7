// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage tiers.
//!
//! A synced cache pairs a [`LocalStore`] (this process only) with a
//! [`PersistentStore`] shared by every process.

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::InMemoryStore;
pub use redis::RedisStore;
pub use traits::{Fetched, LocalStore, PersistentStore, StorageError};
