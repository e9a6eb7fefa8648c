pub mod model;
pub mod publisher;

pub use model::{
    FINAL_EVENT_TYPE, PARTIAL_EVENT_TYPE, TranscriptFinal, TranscriptPartial, unix_timestamp_ms,
};
#[cfg(feature = "kafka")]
pub use publisher::KafkaSink;
pub use publisher::{BusConfig, LogSink, PublishError, TranscriptSink, build_sink};
