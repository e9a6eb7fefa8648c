//! Environment-variable configuration with safe defaults.

use std::str::FromStr;
use std::time::Duration;

use speechgate_events::{BusConfig, FINAL_EVENT_TYPE, PARTIAL_EVENT_TYPE};
use speechgate_transcription::{AudioEncoding, SegmentLimits, SttConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub grpc_port: u16,
    /// STT provider selection: "mock" or "google". Unknown values fall back
    /// to mock.
    pub provider: String,
    pub stt: SttConfig,
    pub continuous_mode: bool,
    pub limits: SegmentLimits,
    pub bus: BusConfig,
    /// Callback-idle gap after which end-of-input draining gives up.
    pub drain_idle: Duration,
    /// Upper bound on end-of-input draining.
    pub drain_max: Duration,
    pub log_level: String,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            grpc_port: env_or("GRPC_PORT", 50051),
            provider: env_or_str("STT_PROVIDER", "mock"),
            stt: SttConfig {
                language_code: env_or_str("STT_LANGUAGE_CODE", "en-US"),
                sample_rate_hz: env_or("STT_SAMPLE_RATE_HZ", 8000),
                interim_results: env_or_bool("STT_INTERIM_RESULTS", true),
                encoding: AudioEncoding::parse(&env_or_str("STT_AUDIO_ENCODING", "LINEAR16")),
                single_utterance: env_or_bool("STT_SINGLE_UTTERANCE", true),
                endpoint: std::env::var("STT_ENDPOINT").ok(),
            },
            continuous_mode: env_or_bool("STT_CONTINUOUS_MODE", false),
            limits: SegmentLimits {
                max_audio_bytes: env_or("SEGMENT_MAX_AUDIO_BYTES", 5 * 1024 * 1024_u64),
                max_duration: Duration::from_secs(env_or("SEGMENT_MAX_DURATION_SECS", 300_u64)),
                max_partials: env_or("SEGMENT_MAX_PARTIALS", 500_u32),
            },
            bus: BusConfig {
                enabled: env_or_bool("KAFKA_ENABLED", false),
                brokers: split_brokers(&env_or_str("KAFKA_BROKERS", "localhost:9092")),
                topic_partial: env_or_str("KAFKA_TOPIC_PARTIAL", PARTIAL_EVENT_TYPE),
                topic_final: env_or_str("KAFKA_TOPIC_FINAL", FINAL_EVENT_TYPE),
                principal: env_or_str("KAFKA_PRINCIPAL", "svc-speech-ingress"),
            },
            drain_idle: Duration::from_millis(env_or("STREAM_DRAIN_IDLE_MS", 250_u64)),
            drain_max: Duration::from_millis(env_or("STREAM_DRAIN_TIMEOUT_MS", 3000_u64)),
            log_level: env_or_str("LOG_LEVEL", "info"),
            log_format: env_or_str("LOG_FORMAT", "json"),
        }
    }
}

fn env_or_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    parse_or(std::env::var(key).ok(), default)
}

fn env_or_bool(key: &str, default: bool) -> bool {
    parse_bool(std::env::var(key).ok(), default)
}

fn parse_or<T: FromStr + Copy>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn split_brokers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_takes_valid_values_and_falls_back() {
        assert_eq!(parse_or(Some("8080".to_string()), 50051_u16), 8080);
        assert_eq!(parse_or(Some("not a port".to_string()), 50051_u16), 50051);
        assert_eq!(parse_or::<u16>(None, 50051), 50051);
    }

    #[test]
    fn parse_bool_recognises_true_false_and_defaults() {
        assert!(parse_bool(Some("true".to_string()), false));
        assert!(parse_bool(Some("1".to_string()), false));
        assert!(!parse_bool(Some("false".to_string()), true));
        assert!(!parse_bool(Some("0".to_string()), true));
        assert!(parse_bool(Some("yes".to_string()), true));
        assert!(!parse_bool(None, false));
    }

    #[test]
    fn brokers_split_on_commas_and_trim() {
        assert_eq!(
            split_brokers("kafka-0:9092, kafka-1:9092"),
            vec!["kafka-0:9092".to_string(), "kafka-1:9092".to_string()]
        );
        assert!(split_brokers("").is_empty());
    }
}
