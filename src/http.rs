use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::cache::OrderCache;
use crate::lookup;
use crate::messaging::KafkaClient;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::OrderStore;

// ============================================================================
// HTTP Surface
// ============================================================================
//
// POST /order      - accept an order document and queue it to the channel;
//                    replies 202 before the order is durable (the submit
//                    contract is at-least-attempted, not at-least-confirmed)
// GET  /order/{id} - point lookup, cache first then store
// GET  /health     - liveness document
// GET  /metrics    - Prometheus text exposition
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<OrderCache>,
    pub store: Arc<dyn OrderStore>,
    pub kafka: Arc<KafkaClient>,
    pub metrics: Arc<Metrics>,
    pub topic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid order payload: {0}")]
    BadPayload(String),

    #[error("order not found")]
    NotFound,

    #[error("order queue unavailable")]
    QueueUnavailable,

    #[error("internal error")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::QueueUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(err) = self {
            tracing::error!(error = %err, "request failed");
        }
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/order", web::post().to(submit_order))
        .route("/order/{id}", web::get().to(get_order))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_endpoint));
}

pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    tracing::info!(port, "http server listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

/// Accept an order and forward it into the asynchronous path. The reply is
/// optimistic: the caller gets 202 once the message is on the channel, even
/// though ingestion may still drop it later.
async fn submit_order(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let order: Order =
        serde_json::from_slice(&body).map_err(|err| ApiError::BadPayload(err.to_string()))?;

    let payload = serde_json::to_string(&order)
        .map_err(|err| ApiError::Internal(err.into()))?;

    state
        .kafka
        .publish(&state.topic, &order.order_uid, &payload)
        .await
        .map_err(|_| ApiError::QueueUnavailable)?;

    state.metrics.orders_submitted.inc();
    tracing::info!(order_uid = %order.order_uid, "order queued");

    Ok(HttpResponse::Accepted().json(serde_json::json!({"status": "queued"})))
}

async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let order = lookup::find_order(&state.cache, state.store.as_ref(), &id, &state.metrics)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(HttpResponse::Ok().json(order))
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "orderflow",
        "cached_orders": state.cache.len(),
        "producer_breaker": state.kafka.breaker_state().to_string(),
    }))
}

async fn metrics_endpoint(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    state
        .metrics
        .producer_breaker_state
        .set(state.kafka.breaker_state().as_gauge());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.metrics.registry().gather(), &mut buffer)
        .map_err(|err| ApiError::Internal(err.into()))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer))
}
