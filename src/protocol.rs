// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire protocol for cache synchronization events.
//!
//! Events travel on three topics, one per event kind. Every record carries
//! the `origin_id` of the cache instance that produced it so receivers can
//! skip their own echoes.
//!
//! # Message Format
//!
//! ## Write (always a batch, one or more records)
//! ```text
//! PUBLISH cache.writes
//!   [{"origin_id": "6f1c…", "key": "user.42",
//!     "entry": {"value": "<hex>", "options": {"ttl": "Hour", "compress": false}, "written_at": 1735776000000}}]
//! ```
//!
//! ## Delete
//! ```text
//! PUBLISH cache.deletes {"origin_id": "6f1c…", "key": "user.42"}
//! ```
//!
//! ## Clear
//! ```text
//! PUBLISH cache.clears {"origin_id": "6f1c…"}
//! ```
//!
//! Values are hex-encoded so arbitrary bytes survive the JSON envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::CacheEntry;

/// Topic suffix for write batches.
pub const WRITES_TOPIC: &str = "cache.writes";
/// Topic suffix for deletes.
pub const DELETES_TOPIC: &str = "cache.deletes";
/// Topic suffix for clears.
pub const CLEARS_TOPIC: &str = "cache.clears";

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("write message contains no records")]
    EmptyBatch,
    #[error("{kind} message has an empty origin_id")]
    MissingOrigin { kind: EventKind },
    #[error("message on unknown topic '{0}'")]
    UnknownTopic(String),
    #[error("failed to encode {kind} message: {source}")]
    Encode {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Event kind, one topic each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Write,
    Delete,
    Clear,
}

impl EventKind {
    /// Returns the label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Write => "write",
            EventKind::Delete => "delete",
            EventKind::Clear => "clear",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified topic names for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub writes: String,
    pub deletes: String,
    pub clears: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self::new("")
    }
}

impl Topics {
    /// Build topic names under `prefix` (e.g. "myapp:" → "myapp:cache.writes").
    pub fn new(prefix: &str) -> Self {
        Self {
            writes: format!("{prefix}{WRITES_TOPIC}"),
            deletes: format!("{prefix}{DELETES_TOPIC}"),
            clears: format!("{prefix}{CLEARS_TOPIC}"),
        }
    }

    /// All topics, for the subscribe call.
    pub fn all(&self) -> Vec<String> {
        vec![self.writes.clone(), self.deletes.clone(), self.clears.clone()]
    }

    pub fn for_kind(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Write => &self.writes,
            EventKind::Delete => &self.deletes,
            EventKind::Clear => &self.clears,
        }
    }

    pub fn kind_of(&self, topic: &str) -> Option<EventKind> {
        if topic == self.writes {
            Some(EventKind::Write)
        } else if topic == self.deletes {
            Some(EventKind::Delete)
        } else if topic == self.clears {
            Some(EventKind::Clear)
        } else {
            None
        }
    }
}

/// One write record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteEvent {
    pub origin_id: String,
    pub key: String,
    pub entry: CacheEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEvent {
    pub origin_id: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearEvent {
    pub origin_id: String,
}

/// A decoded bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// One or more write records published as a single message
    Write(Vec<WriteEvent>),
    Delete(DeleteEvent),
    Clear(ClearEvent),
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::Write(_) => EventKind::Write,
            SyncEvent::Delete(_) => EventKind::Delete,
            SyncEvent::Clear(_) => EventKind::Clear,
        }
    }

    /// Encode to the bytes published on this event's topic.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            SyncEvent::Write(records) => encode_write_batch(records),
            SyncEvent::Delete(event) => to_bytes(EventKind::Delete, event),
            SyncEvent::Clear(event) => to_bytes(EventKind::Clear, event),
        }
    }

    /// Number of records carried.
    pub fn len(&self) -> usize {
        match self {
            SyncEvent::Write(records) => records.len(),
            SyncEvent::Delete(_) | SyncEvent::Clear(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn to_bytes<T: Serialize + ?Sized>(kind: EventKind, value: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(value).map_err(|source| ProtocolError::Encode { kind, source })
}

fn check_origin(kind: EventKind, origin_id: &str) -> Result<(), ProtocolError> {
    if origin_id.is_empty() {
        Err(ProtocolError::MissingOrigin { kind })
    } else {
        Ok(())
    }
}

/// Encode a single write as a one-record batch.
pub fn encode_write(origin_id: &str, key: &str, entry: &CacheEntry) -> Result<Vec<u8>, ProtocolError> {
    encode_write_batch(&[WriteEvent {
        origin_id: origin_id.to_string(),
        key: key.to_string(),
        entry: entry.clone(),
    }])
}

/// Encode several writes into one message.
pub fn encode_write_batch(records: &[WriteEvent]) -> Result<Vec<u8>, ProtocolError> {
    if records.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    to_bytes(EventKind::Write, records)
}

pub fn decode_write(bytes: &[u8]) -> Result<Vec<WriteEvent>, ProtocolError> {
    let records: Vec<WriteEvent> = serde_json::from_slice(bytes)
        .map_err(|source| ProtocolError::Malformed { kind: EventKind::Write, source })?;
    if records.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    for record in &records {
        check_origin(EventKind::Write, &record.origin_id)?;
    }
    Ok(records)
}

pub fn encode_delete(origin_id: &str, key: &str) -> Result<Vec<u8>, ProtocolError> {
    to_bytes(
        EventKind::Delete,
        &DeleteEvent {
            origin_id: origin_id.to_string(),
            key: key.to_string(),
        },
    )
}

pub fn decode_delete(bytes: &[u8]) -> Result<DeleteEvent, ProtocolError> {
    let event: DeleteEvent = serde_json::from_slice(bytes)
        .map_err(|source| ProtocolError::Malformed { kind: EventKind::Delete, source })?;
    check_origin(EventKind::Delete, &event.origin_id)?;
    Ok(event)
}

pub fn encode_clear(origin_id: &str) -> Result<Vec<u8>, ProtocolError> {
    to_bytes(
        EventKind::Clear,
        &ClearEvent {
            origin_id: origin_id.to_string(),
        },
    )
}

pub fn decode_clear(bytes: &[u8]) -> Result<ClearEvent, ProtocolError> {
    let event: ClearEvent = serde_json::from_slice(bytes)
        .map_err(|source| ProtocolError::Malformed { kind: EventKind::Clear, source })?;
    check_origin(EventKind::Clear, &event.origin_id)?;
    Ok(event)
}

/// Decode a message received on `topic`.
pub fn decode(topics: &Topics, topic: &str, bytes: &[u8]) -> Result<SyncEvent, ProtocolError> {
    match topics.kind_of(topic) {
        Some(EventKind::Write) => decode_write(bytes).map(SyncEvent::Write),
        Some(EventKind::Delete) => decode_delete(bytes).map(SyncEvent::Delete),
        Some(EventKind::Clear) => decode_clear(bytes).map(SyncEvent::Clear),
        None => Err(ProtocolError::UnknownTopic(topic.to_string())),
    }
}
