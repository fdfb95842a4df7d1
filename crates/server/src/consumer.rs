//! Stream consumer.
//!
//! Turns order events into durable writes. The loop has two states,
//! [`ConsumerState::Listening`] and [`ConsumerState::Stopped`]; each
//! iteration waits for whichever comes first, a message or the shutdown
//! signal. Stopped is terminal.
//!
//! Delivery is at-most-once and best effort: a message that fails to
//! decode, or whose order fails to persist, is logged and dropped. There
//! is no retry, backoff, or dead-letter routing.
//!
//! A failed read from the stream is not a message and is not dropped; the
//! loop pauses briefly and reads again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use orderstream_core::Order;

use crate::services::OrderService;
use crate::stream::{MessageSource, StreamError, StreamMessage};

/// Pause after a failed stream read before reading again.
pub const STREAM_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Consumer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Listening,
    Stopped,
}

/// What happened to a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Persisted and cached.
    Persisted,
    /// Payload was not a valid order; nothing was written.
    DecodeFailed,
    /// Store rejected the order (including duplicates); nothing was cached.
    SaveFailed,
}

/// Counters for one run of the consumer loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub received: u64,
    pub persisted: u64,
    pub decode_failures: u64,
    pub save_failures: u64,
    pub stream_errors: u64,
}

impl ConsumerReport {
    const fn record(&mut self, outcome: MessageOutcome) {
        self.received += 1;
        match outcome {
            MessageOutcome::Persisted => self.persisted += 1,
            MessageOutcome::DecodeFailed => self.decode_failures += 1,
            MessageOutcome::SaveFailed => self.save_failures += 1,
        }
    }
}

/// Consumes order events from a [`MessageSource`] into the [`OrderService`].
pub struct OrderConsumer<M> {
    source: M,
    service: OrderService,
    state: ConsumerState,
    error_pause: Duration,
}

impl<M: MessageSource> OrderConsumer<M> {
    /// Create a consumer in the listening state.
    pub const fn new(source: M, service: OrderService) -> Self {
        Self {
            source,
            service,
            state: ConsumerState::Listening,
            error_pause: STREAM_ERROR_PAUSE,
        }
    }

    /// Override the pause after a failed stream read.
    #[must_use]
    pub const fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ConsumerState {
        self.state
    }

    /// Run until `shutdown` flips to `true`, its sender is dropped, or the
    /// source is exhausted. Closes the source before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> ConsumerReport {
        let mut report = ConsumerReport::default();
        info!("Consumer started, waiting for orders");

        while self.state == ConsumerState::Listening {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping consumer");
                        break;
                    }
                }
                received = self.source.recv() => match received {
                    Ok(Some(message)) => {
                        let outcome = process(&self.service, &message).await;
                        report.record(outcome);
                    }
                    Ok(None) => {
                        info!("Message source exhausted, stopping consumer");
                        break;
                    }
                    Err(e) => {
                        report.stream_errors += 1;
                        error!(error = %e, "Failed to read from message stream");
                        tokio::select! {
                            () = tokio::time::sleep(self.error_pause) => {}
                            _ = shutdown.wait_for(|stopped| *stopped) => {
                                info!("Shutdown signal received, stopping consumer");
                                break;
                            }
                        }
                    }
                },
            }
        }

        self.source.close().await;
        self.state = ConsumerState::Stopped;
        info!(?report, "Consumer stopped");
        report
    }

    /// Decode, persist, and cache one message.
    pub async fn handle_message(&self, message: &StreamMessage) -> MessageOutcome {
        process(&self.service, message).await
    }
}

/// Decode, persist, and cache one message.
///
/// Borrows only the service so the loop future stays `Send` for any source.
async fn process(service: &OrderService, message: &StreamMessage) -> MessageOutcome {
    let order = match Order::from_json(&message.payload) {
        Ok(order) => Arc::new(order),
        Err(e) => {
            warn!(offset = message.offset, error = %e, "Dropping undecodable order message");
            return MessageOutcome::DecodeFailed;
        }
    };

    if let Err(e) = service.save_order(Arc::clone(&order)).await {
        warn!(
            offset = message.offset,
            order_uid = %order.order_uid,
            error = %e,
            "Failed to save order"
        );
        return MessageOutcome::SaveFailed;
    }

    // save_order already caches on success, so the only possible failure
    // here is a collision with this very order.
    if let Err(e) = service.update_cache(Arc::clone(&order)).await {
        debug!(order_uid = %order.order_uid, error = %e, "Order already cached");
    }

    info!(order_uid = %order.order_uid, "Order saved");
    MessageOutcome::Persisted
}

/// Open a message source, then consume from it until shutdown.
///
/// Opening races against the shutdown signal, so a source that is still
/// connecting never holds up process exit. Returns `None` if the source
/// could not be opened or shutdown came first.
pub async fn subscribe_and_run<M, F>(
    connect: F,
    service: OrderService,
    mut shutdown: watch::Receiver<bool>,
) -> Option<ConsumerReport>
where
    M: MessageSource,
    F: Future<Output = Result<M, StreamError>>,
{
    let source = tokio::select! {
        connected = connect => match connected {
            Ok(source) => source,
            Err(e) => {
                error!(error = %e, "Failed to subscribe to order topic");
                return None;
            }
        },
        _ = shutdown.wait_for(|stopped| *stopped) => {
            info!("Shutdown signal received before subscription completed");
            return None;
        }
    };

    Some(OrderConsumer::new(source, service).run(shutdown).await)
}

impl<M> std::fmt::Debug for OrderConsumer<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderConsumer")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
