//! Publish orders to the order topic.
//!
//! Every order in the file is validated with the same decoder the consumer
//! uses, so a file that fails here would also be dropped by the server.
//!
//! # Environment Variables
//!
//! - `KAFKA_BROKERS` - comma-separated bootstrap brokers
//! - `KAFKA_TOPIC` - order topic

use std::path::{Path, PathBuf};

use orderstream_core::{DecodeError, Order};
use orderstream_server::config::{ConfigError, KafkaConfig};
use orderstream_server::stream::{KafkaProducer, StreamError};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while publishing.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Order #{index} is not valid: {source}")]
    InvalidOrder { index: usize, source: DecodeError },

    #[error("No orders in {}", .0.display())]
    Empty(PathBuf),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Publish every order found in `path`.
///
/// # Errors
///
/// Returns `ProduceError` if the file cannot be read, any order fails to
/// decode (nothing is published in that case), or the broker rejects a
/// record.
pub async fn run(path: &Path, key: Option<&str>) -> Result<(), ProduceError> {
    let contents = std::fs::read(path).map_err(|source| ProduceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let payloads = split_payloads(&contents).map_err(|source| ProduceError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if payloads.is_empty() {
        return Err(ProduceError::Empty(path.to_path_buf()));
    }

    let orders = payloads
        .iter()
        .enumerate()
        .map(|(index, payload)| {
            Order::from_json(payload)
                .map(|order| order.order_uid)
                .map_err(|source| ProduceError::InvalidOrder { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let config = KafkaConfig::from_env()?;
    tracing::info!(brokers = ?config.brokers, topic = %config.topic, "Connecting to Kafka...");
    let producer = KafkaProducer::connect(&config).await?;

    for (order_uid, payload) in orders.iter().zip(payloads) {
        let offset = producer.send(key.unwrap_or(order_uid), payload).await?;
        tracing::info!(order_uid = %order_uid, offset, "Order published");
    }

    tracing::info!(count = orders.len(), "Done");
    Ok(())
}

/// Split a file into one payload per order.
///
/// A top-level array yields one payload per element; anything else is a
/// single payload, sent as the original bytes.
fn split_payloads(contents: &[u8]) -> Result<Vec<Vec<u8>>, serde_json::Error> {
    match serde_json::from_slice::<Value>(contents)? {
        Value::Array(values) => values.iter().map(serde_json::to_vec).collect(),
        _ => Ok(vec![contents.to_vec()]),
    }
}
