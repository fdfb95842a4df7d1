//! Message stream plumbing.
//!
//! The consumer reads raw payloads through the [`MessageSource`] trait so
//! the loop can run against Kafka in production and a channel in tests.
//!
//! # Sources
//!
//! - [`kafka::KafkaSource`] - One topic partition, starting at the newest offset
//! - [`ChannelSource`] - An in-process `mpsc` channel

pub mod kafka;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use kafka::{KafkaProducer, KafkaSource};

/// Errors from the message stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Broker connection, metadata, or fetch failure.
    #[error("kafka error: {0}")]
    Kafka(#[from] rskafka::client::error::Error),
}

/// One message read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Partition offset, or a sequence number for non-Kafka sources.
    pub offset: i64,
    /// Raw message value.
    pub payload: Vec<u8>,
}

/// A source of raw order payloads.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message.
    ///
    /// `Ok(None)` means the source is exhausted and will never yield again.
    async fn recv(&mut self) -> Result<Option<StreamMessage>, StreamError>;

    /// Release the subscription. Called once when the consumer stops.
    async fn close(&mut self) {}
}

/// Message source fed by an `mpsc` channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
    next_offset: i64,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx, next_offset: 0 })
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        let Some(payload) = self.rx.recv().await else {
            return Ok(None);
        };
        let offset = self.next_offset;
        self.next_offset += 1;
        Ok(Some(StreamMessage { offset, payload }))
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_assigns_offsets() {
        let (tx, mut source) = ChannelSource::new(4);
        tx.send(b"one".to_vec()).await.unwrap();
        tx.send(b"two".to_vec()).await.unwrap();

        let first = source.recv().await.unwrap().unwrap();
        let second = source.recv().await.unwrap().unwrap();

        assert_eq!(first.offset, 0);
        assert_eq!(first.payload, b"one");
        assert_eq!(second.offset, 1);
    }

    #[tokio::test]
    async fn test_channel_source_ends_when_sender_dropped() {
        let (tx, mut source) = ChannelSource::new(1);
        drop(tx);
        assert!(source.recv().await.unwrap().is_none());
    }
}
