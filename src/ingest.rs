use rdkafka::consumer::StreamConsumer;
use rdkafka::Message;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::cache::OrderCache;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::OrderStore;

// ============================================================================
// Ingestion Pipeline
// ============================================================================
//
// The single writer path into durable storage and the cache for channel
// traffic. Per message: decode, persist the aggregate in one transaction,
// then write through to the cache. Only after the commit succeeds does the
// order become visible in the cache, so the cache can never hold an order
// the store does not.
//
// Errors are isolated per message. A message that cannot be decoded or
// persisted is dropped with a structured failure event and a labelled
// counter, not retried and not requeued, and the loop moves on. The loop
// itself runs for the process lifetime.
// ============================================================================

/// Stage at which a message was lost. The label feeds the drop counter and
/// the structured drop event.
#[derive(Debug)]
pub(crate) enum DropReason {
    Decode(serde_json::Error),
    Store(anyhow::Error),
}

impl DropReason {
    pub(crate) fn stage(&self) -> &'static str {
        match self {
            DropReason::Decode(_) => "decode",
            DropReason::Store(_) => "store",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Decode(err) => write!(f, "invalid order payload: {err}"),
            DropReason::Store(err) => write!(f, "order persistence failed: {err}"),
        }
    }
}

/// Drain the message channel until the process exits.
pub async fn run(
    consumer: StreamConsumer,
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    metrics: Arc<Metrics>,
) {
    tracing::info!("ingestion pipeline started");

    loop {
        let message = match consumer.recv().await {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "kafka receive error");
                continue;
            }
        };

        metrics.orders_consumed.inc();
        let payload = message.payload().unwrap_or_default();
        let started = Instant::now();

        match process_message(payload, store.as_ref(), &cache).await {
            Ok(order_uid) => {
                metrics.record_ingested(started.elapsed().as_secs_f64());
                tracing::info!(order_uid = %order_uid, "✅ order ingested");
            }
            Err(reason) => {
                // One structured event per dropped message. There is no
                // retry and no dead letter path, so this event plus the
                // counter is the only trace the message ever existed.
                let drop_id = Uuid::new_v4();
                metrics.record_drop(reason.stage());
                tracing::error!(
                    drop_id = %drop_id,
                    stage = reason.stage(),
                    error = %reason,
                    partition = message.partition(),
                    offset = message.offset(),
                    payload_bytes = payload.len(),
                    "💀 order message dropped"
                );
            }
        }
    }
}

/// Handle one message: decode, persist, write through. Returns the order id
/// on success so the caller can log it.
pub(crate) async fn process_message(
    payload: &[u8],
    store: &dyn OrderStore,
    cache: &OrderCache,
) -> Result<String, DropReason> {
    let order: Order = serde_json::from_slice(payload).map_err(DropReason::Decode)?;

    store.insert_order(&order).await.map_err(DropReason::Store)?;

    let order_uid = order.order_uid.clone();
    cache.add(&order_uid, order);
    Ok(order_uid)
}
