use anyhow::Result;

use crate::cache::OrderCache;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::OrderStore;

/// Point lookup: cache first, durable store on miss.
///
/// A store hit after a cache miss is returned without being written back
/// into the cache: only ingestion and preload populate it. That asymmetry
/// is deliberate. Repopulating on fallback would let read traffic evict
/// recently ingested orders, changing which orders a full cache retains.
pub async fn find_order(
    cache: &OrderCache,
    store: &dyn OrderStore,
    id: &str,
    metrics: &Metrics,
) -> Result<Option<Order>> {
    if let Some(order) = cache.get(id) {
        metrics.cache_hits.inc();
        tracing::debug!(order_uid = %id, "cache hit");
        return Ok(Some(order));
    }

    metrics.cache_misses.inc();
    tracing::debug!(order_uid = %id, "cache miss, falling back to store");
    store.fetch_order(id).await
}
