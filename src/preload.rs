use crate::cache::OrderCache;
use crate::store::OrderStore;

/// Reference batch size for cache warming.
pub const PRELOAD_LIMIT: i64 = 100;

/// Warm the cache from durable storage before lookup traffic starts.
///
/// Best-effort: a failure to list the recent ids aborts the whole preload
/// and the cache starts empty, but the process still serves. A failure to
/// load any single order is logged and skipped.
///
/// Ids arrive newest-first, and `add` records arrival order, so the least
/// recently created order of the batch is the first eviction candidate once
/// live traffic starts filling the remaining capacity.
pub async fn warm_cache(store: &dyn OrderStore, cache: &OrderCache, limit: i64) {
    tracing::info!(limit, "preloading cache with recent orders");

    let ids = match store.fetch_recent_ids(limit).await {
        Ok(ids) => ids,
        Err(err) => {
            tracing::error!(error = %err, "failed to list recent orders, cache starts empty");
            return;
        }
    };

    let mut loaded = 0usize;
    for id in ids {
        match store.fetch_order(&id).await {
            Ok(Some(order)) => {
                cache.add(&id, order);
                loaded += 1;
            }
            Ok(None) => {
                tracing::warn!(order_uid = %id, "listed order vanished before preload, skipping");
            }
            Err(err) => {
                tracing::warn!(order_uid = %id, error = %err, "failed to load order, skipping");
            }
        }
    }

    tracing::info!(loaded, cached = cache.len(), "📦 cache warm-up complete");
}
