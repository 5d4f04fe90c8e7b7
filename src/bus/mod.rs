// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pub/sub transports for change notifications.

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::InMemoryBus;
pub use redis::RedisBus;
pub use traits::{BusError, BusMessage, BusSubscription, MessageBus};
