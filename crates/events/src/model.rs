use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Destination name for interim transcript events.
pub const PARTIAL_EVENT_TYPE: &str = "interaction.transcript.partial";
/// Destination name for final transcript events.
pub const FINAL_EVENT_TYPE: &str = "interaction.transcript.final";

/// An interim transcript hypothesis for an open segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPartial {
    pub event_type: String,
    pub interaction_id: String,
    pub tenant_id: String,
    pub segment_id: String,
    pub text: String,
    /// Unix epoch milliseconds at publish time.
    pub timestamp: i64,
}

/// The confirmed transcript for a segment. At most one per segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptFinal {
    pub event_type: String,
    pub interaction_id: String,
    pub tenant_id: String,
    pub segment_id: String,
    pub text: String,
    /// Provider confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Last audio offset reported by the client for this segment.
    pub audio_offset_ms: i64,
    /// Unix epoch milliseconds at publish time.
    pub timestamp: i64,
}

/// Current wall-clock time as Unix epoch milliseconds.
pub fn unix_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_serializes_with_camel_case_wire_names() {
        let ev = TranscriptPartial {
            event_type: PARTIAL_EVENT_TYPE.to_string(),
            interaction_id: "int-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            segment_id: "int-1-seg-1".to_string(),
            text: "I want".to_string(),
            timestamp: 1_700_000_000_000,
        };

        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["eventType"], "interaction.transcript.partial");
        assert_eq!(json["interactionId"], "int-1");
        assert_eq!(json["tenantId"], "tenant-1");
        assert_eq!(json["segmentId"], "int-1-seg-1");
        assert_eq!(json["text"], "I want");
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
    }

    #[test]
    fn final_serializes_confidence_and_offset() {
        let ev = TranscriptFinal {
            event_type: FINAL_EVENT_TYPE.to_string(),
            interaction_id: "int-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            segment_id: "int-1-seg-1".to_string(),
            text: "I want to cancel my subscription".to_string(),
            confidence: 0.94,
            audio_offset_ms: 1200,
            timestamp: 1_700_000_000_000,
        };

        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["eventType"], "interaction.transcript.final");
        assert_eq!(json["confidence"], 0.94);
        assert_eq!(json["audioOffsetMs"], 1200);
    }

    #[test]
    fn unix_timestamp_is_plausible() {
        let ms = unix_timestamp_ms();
        // After 2023-01-01, before 2100.
        assert!(ms > 1_672_531_200_000);
        assert!(ms < 4_102_444_800_000);
    }
}
