//! Redis pub/sub transport.
//!
//! Publishing goes through a shared [`ConnectionManager`], which reconnects
//! on its own. Each subscription opens a dedicated pub/sub connection; when
//! that connection drops the stream ends and the subscriber resubscribes.
//!
//! Channel names are the topic strings as given, so processes only see each
//! other when they share a channel prefix (see `SyncConfig::channel_prefix`).

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

use super::traits::{BusError, BusMessage, BusSubscription, MessageBus};
use crate::resilience::retry::{retry, RetryConfig};

pub struct RedisBus {
    client: Client,
    connection: ConnectionManager,
}

impl RedisBus {
    /// Connect to Redis. Uses the startup retry preset, so an unreachable
    /// server fails after a bounded wait instead of hanging.
    pub async fn new(connection_string: &str) -> Result<Self, BusError> {
        let client = Client::open(connection_string)
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let connection = retry("redis_bus_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| BusError::Connection(e.to_string()))?;

        Ok(Self { client, connection })
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        let mut conn = self.connection.clone();
        let receivers: i64 = conn
            .publish(topic, payload)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        debug!(topic, receivers, bytes = payload.len(), "Published to Redis");
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<BusSubscription, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        for topic in topics {
            pubsub
                .subscribe(topic)
                .await
                .map_err(|e| BusError::Connection(e.to_string()))?;
        }
        debug!(?topics, "Subscribed to Redis channels");

        let stream = pubsub.into_on_message().map(|msg| {
            Ok(BusMessage::new(
                msg.get_channel_name(),
                msg.get_payload_bytes().to_vec(),
            ))
        });
        Ok(BusSubscription::new(stream))
    }
}
