//! Transcript event publishing.
//!
//! The publisher is a capability seam: the session handler only sees the
//! [`TranscriptSink`] trait. The Kafka sink writes keyed JSON records to two
//! destinations (partial and final); the log sink is the "disabled" mode that
//! records the event and succeeds unconditionally.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::model::{FINAL_EVENT_TYPE, PARTIAL_EVENT_TYPE, TranscriptFinal, TranscriptPartial};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write to bus: {0}")]
    Transport(String),
}

/// Message bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub enabled: bool,
    pub brokers: Vec<String>,
    /// Destination for interim transcripts.
    pub topic_partial: String,
    /// Destination for final transcripts.
    pub topic_final: String,
    /// Service identity stamped on every message header.
    pub principal: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: vec!["localhost:9092".to_string()],
            topic_partial: PARTIAL_EVENT_TYPE.to_string(),
            topic_final: FINAL_EVENT_TYPE.to_string(),
            principal: "svc-speech-ingress".to_string(),
        }
    }
}

/// Destination for transcript events, shared by all stream handlers.
///
/// Write failures are reported to the caller but must never influence the
/// segment lifecycle; retries and dead-lettering belong to the bus layer.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Publishes an interim transcript, keyed by interaction id.
    async fn publish_partial(&self, key: &str, event: TranscriptPartial)
    -> Result<(), PublishError>;

    /// Publishes a final transcript, keyed by interaction id.
    async fn publish_final(&self, key: &str, event: TranscriptFinal) -> Result<(), PublishError>;

    /// Flushes and releases the underlying writers. Idempotent.
    async fn close(&self);
}

/// Builds the configured sink: Kafka when enabled (and compiled in),
/// otherwise the log-only sink.
pub fn build_sink(config: &BusConfig) -> Result<std::sync::Arc<dyn TranscriptSink>, PublishError> {
    if !config.enabled || config.brokers.is_empty() {
        info!("event publishing disabled, using log-only sink");
        return Ok(std::sync::Arc::new(LogSink::new(&config.principal)));
    }

    #[cfg(feature = "kafka")]
    {
        Ok(std::sync::Arc::new(KafkaSink::new(config)?))
    }
    #[cfg(not(feature = "kafka"))]
    {
        tracing::warn!("built without the `kafka` feature, falling back to log-only sink");
        Ok(std::sync::Arc::new(LogSink::new(&config.principal)))
    }
}

/// Log-only sink used when bus publishing is disabled.
pub struct LogSink {
    principal: String,
}

impl LogSink {
    pub fn new(principal: &str) -> Self {
        Self {
            principal: principal.to_string(),
        }
    }
}

#[async_trait]
impl TranscriptSink for LogSink {
    async fn publish_partial(
        &self,
        key: &str,
        event: TranscriptPartial,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&event)?;
        info!(
            principal = %self.principal,
            topic = PARTIAL_EVENT_TYPE,
            %key,
            %payload,
            "transcript event (log-only)"
        );
        Ok(())
    }

    async fn publish_final(&self, key: &str, event: TranscriptFinal) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&event)?;
        info!(
            principal = %self.principal,
            topic = FINAL_EVENT_TYPE,
            %key,
            %payload,
            "transcript event (log-only)"
        );
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaSink;

#[cfg(feature = "kafka")]
mod kafka {
    use std::time::Duration;

    use async_trait::async_trait;
    use rdkafka::ClientConfig;
    use rdkafka::message::{Header, OwnedHeaders};
    use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
    use rdkafka::util::Timeout;
    use tracing::{debug, info};

    use super::{BusConfig, PublishError, TranscriptSink};
    use crate::model::{TranscriptFinal, TranscriptPartial};

    /// Per-send deadline, independent of any RPC stream lifetime so a
    /// closing stream cannot cancel an in-flight publish.
    const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Kafka-backed transcript sink.
    ///
    /// Messages are keyed by interaction id so all events for one interaction
    /// land on one partition, preserving per-interaction order. Each message
    /// carries `eventType` and `principal` headers.
    pub struct KafkaSink {
        producer: FutureProducer,
        topic_partial: String,
        topic_final: String,
        principal: String,
    }

    impl KafkaSink {
        pub fn new(config: &BusConfig) -> Result<Self, PublishError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", config.brokers.join(","))
                .set("message.timeout.ms", "10000")
                .set("request.required.acks", "1")
                .create()
                .map_err(|e| PublishError::Transport(e.to_string()))?;

            info!(
                brokers = %config.brokers.join(","),
                topic_partial = %config.topic_partial,
                topic_final = %config.topic_final,
                "kafka publisher enabled"
            );

            Ok(Self {
                producer,
                topic_partial: config.topic_partial.clone(),
                topic_final: config.topic_final.clone(),
                principal: config.principal.clone(),
            })
        }

        async fn publish(
            &self,
            topic: &str,
            key: &str,
            payload: Vec<u8>,
        ) -> Result<(), PublishError> {
            let record = FutureRecord::to(topic)
                .key(key)
                .payload(&payload)
                .headers(
                    OwnedHeaders::new()
                        .insert(Header {
                            key: "eventType",
                            value: Some(topic),
                        })
                        .insert(Header {
                            key: "principal",
                            value: Some(self.principal.as_str()),
                        }),
                );

            self.producer
                .send(record, Timeout::After(PUBLISH_TIMEOUT))
                .await
                .map_err(|(err, _)| PublishError::Transport(err.to_string()))?;

            debug!(%topic, %key, "transcript event published");
            Ok(())
        }
    }

    #[async_trait]
    impl TranscriptSink for KafkaSink {
        async fn publish_partial(
            &self,
            key: &str,
            event: TranscriptPartial,
        ) -> Result<(), PublishError> {
            let payload = serde_json::to_vec(&event)?;
            self.publish(&self.topic_partial, key, payload).await
        }

        async fn publish_final(
            &self,
            key: &str,
            event: TranscriptFinal,
        ) -> Result<(), PublishError> {
            let payload = serde_json::to_vec(&event)?;
            self.publish(&self.topic_final, key, payload).await
        }

        async fn close(&self) {
            if let Err(err) = self.producer.flush(Timeout::After(PUBLISH_TIMEOUT)) {
                tracing::warn!(%err, "kafka flush on close failed");
            }
        }
    }
}
