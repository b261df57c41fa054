// ============================================================================
// Messaging Module
// ============================================================================
//
// Kafka adapter: a producer client for the submit path and a group consumer
// for the ingestion pipeline. Delivery guarantees (at-least-once) come from
// the broker; this module only wires up to them.
// ============================================================================

mod kafka;

pub use kafka::{build_consumer, KafkaClient};
