use anyhow::{anyhow, bail, Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

use crate::config::Config;
use crate::utils::{BreakerConfig, BreakerState, CircuitBreaker};

/// Producer half of the message channel, used by the submit endpoint.
///
/// Publishes are guarded by a circuit breaker so a dead broker turns into
/// fast 503s instead of a pile of five-second timeouts per request.
pub struct KafkaClient {
    producer: FutureProducer,
    breaker: CircuitBreaker,
}

impl KafkaClient {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .context("failed to create kafka producer")?;

        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 3,
        });

        Ok(Self { producer, breaker })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        if !self.breaker.try_acquire() {
            tracing::warn!(topic = %topic, "circuit breaker open, refusing publish");
            bail!("message channel unavailable");
        }

        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok(_) => {
                self.breaker.record_success();
                tracing::debug!(topic = %topic, key = %key, "published order message");
                Ok(())
            }
            Err((err, _)) => {
                self.breaker.record_failure();
                tracing::error!(
                    error = %err,
                    topic = %topic,
                    key = %key,
                    "failed to publish order message"
                );
                Err(anyhow!("kafka send error: {err}"))
            }
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}

/// Build the group consumer for the ingestion pipeline and subscribe it to
/// the order topic. Offsets are auto-committed; a message that fails to
/// ingest is dropped, not redelivered.
pub fn build_consumer(config: &Config) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_brokers)
        .set("group.id", &config.kafka_group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .context("failed to create kafka consumer")?;

    consumer
        .subscribe(&[config.kafka_topic.as_str()])
        .with_context(|| format!("failed to subscribe to topic {}", config.kafka_topic))?;

    tracing::info!(
        brokers = %config.kafka_brokers,
        topic = %config.kafka_topic,
        group_id = %config.kafka_group_id,
        "kafka consumer subscribed"
    );

    Ok(consumer)
}
