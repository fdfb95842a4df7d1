//! Kafka access via `rskafka`.
//!
//! The consumer subscribes to partition 0 of the order topic and starts at
//! the newest offset every time the process starts. No consumer group is
//! joined and no offsets are committed, so messages published while the
//! process is down are never read.
//!
//! Within one process the subscription is kept alive: `rskafka` ends a
//! partition stream after its first fetch error, so [`KafkaSource`] builds a
//! fresh stream that resumes after the last offset it handed out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use rskafka::BackoffConfig;
use rskafka::client::ClientBuilder;
use rskafka::client::consumer::{StartOffset, StreamConsumer, StreamConsumerBuilder};
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::record::Record;
use tracing::{debug, info, warn};

use super::{MessageSource, StreamError, StreamMessage};
use crate::config::KafkaConfig;

/// The only partition this service reads or writes.
pub const PARTITION: i32 = 0;

/// Upper bound on how long a fetch waits for new records.
const MAX_WAIT_MS: i32 = 500;

/// Retry policy for broker requests; gives up after `deadline`.
fn backoff(deadline: Duration) -> BackoffConfig {
    BackoffConfig {
        init_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(5),
        base: 3.0,
        deadline: Some(deadline),
    }
}

async fn partition_client(config: &KafkaConfig) -> Result<PartitionClient, StreamError> {
    let client = ClientBuilder::new(config.brokers.clone())
        .backoff_config(backoff(config.connect_timeout))
        .build()
        .await?;
    let partition = client
        .partition_client(config.topic.clone(), PARTITION, UnknownTopicHandling::Retry)
        .await?;
    Ok(partition)
}

/// Where a new partition stream starts.
///
/// After the first record, resume right after the last offset seen; before
/// it, keep the newest-offset behavior.
const fn resume_from(last_offset: Option<i64>) -> StartOffset {
    match last_offset {
        Some(offset) => StartOffset::At(offset + 1),
        None => StartOffset::Latest,
    }
}

/// Partition subscription reading from the newest offset.
pub struct KafkaSource {
    partition: Arc<PartitionClient>,
    stream: Option<StreamConsumer>,
    last_offset: Option<i64>,
    closed: bool,
    topic: String,
}

impl KafkaSource {
    /// Connect to the brokers and subscribe to the order topic.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Kafka` if the brokers cannot be reached or the
    /// partition cannot be resolved within `connect_timeout`.
    pub async fn connect(config: &KafkaConfig) -> Result<Self, StreamError> {
        let partition = Arc::new(partition_client(config).await?);

        info!(topic = %config.topic, partition = PARTITION, "Subscribed to order topic");

        Ok(Self {
            partition,
            stream: None,
            last_offset: None,
            closed: false,
            topic: config.topic.clone(),
        })
    }

    fn subscribe(&self) -> StreamConsumer {
        StreamConsumerBuilder::new(Arc::clone(&self.partition), resume_from(self.last_offset))
            .with_max_wait_ms(MAX_WAIT_MS)
            .build()
    }
}

impl std::fmt::Debug for KafkaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSource")
            .field("topic", &self.topic)
            .field("last_offset", &self.last_offset)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    /// Never reports exhaustion while open: a stream that ends or fails is
    /// replaced on the next call.
    async fn recv(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        loop {
            if self.closed {
                return Ok(None);
            }

            if self.stream.is_none() {
                self.stream = Some(self.subscribe());
            }
            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            match stream.next().await {
                Some(Ok((record, high_watermark))) => {
                    debug!(offset = record.offset, high_watermark, "Received record");
                    self.last_offset = Some(record.offset);
                    return Ok(Some(StreamMessage {
                        offset: record.offset,
                        payload: record.record.value.unwrap_or_default(),
                    }));
                }
                Some(Err(e)) => {
                    // The stream is terminated after yielding an error.
                    self.stream = None;
                    return Err(e.into());
                }
                None => {
                    warn!(topic = %self.topic, last_offset = ?self.last_offset, "Partition stream ended, resubscribing");
                    self.stream = None;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        if self.stream.take().is_some() {
            info!(topic = %self.topic, "Partition subscription closed");
        }
    }
}

/// Publishes orders to the topic's partition 0.
pub struct KafkaProducer {
    partition: PartitionClient,
}

impl KafkaProducer {
    /// Connect to the brokers for the configured topic.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Kafka` if the brokers cannot be reached.
    pub async fn connect(config: &KafkaConfig) -> Result<Self, StreamError> {
        Ok(Self {
            partition: partition_client(config).await?,
        })
    }

    /// Publish one message and return its offset.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Kafka` if the broker rejects the record.
    pub async fn send(&self, key: &str, value: Vec<u8>) -> Result<i64, StreamError> {
        let record = Record {
            key: Some(key.as_bytes().to_vec()),
            value: Some(value),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let offsets = self
            .partition
            .produce(vec![record], Compression::NoCompression)
            .await?;

        Ok(offsets.first().copied().unwrap_or_default())
    }
}

impl std::fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducer").finish_non_exhaustive()
    }
}
