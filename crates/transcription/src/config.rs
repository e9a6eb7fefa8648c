use std::time::Duration;

/// Audio encoding sent in the provider session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioEncoding {
    #[default]
    Linear16,
    Mulaw,
    Flac,
    Amr,
    AmrWb,
    OggOpus,
    SpeexWithHeaderByte,
    WebmOpus,
}

impl AudioEncoding {
    /// Parses a provider encoding name. Unknown values fall back to LINEAR16.
    pub fn parse(value: &str) -> Self {
        match value {
            "LINEAR16" => AudioEncoding::Linear16,
            "MULAW" => AudioEncoding::Mulaw,
            "FLAC" => AudioEncoding::Flac,
            "AMR" => AudioEncoding::Amr,
            "AMR_WB" => AudioEncoding::AmrWb,
            "OGG_OPUS" => AudioEncoding::OggOpus,
            "SPEEX_WITH_HEADER_BYTE" => AudioEncoding::SpeexWithHeaderByte,
            "WEBM_OPUS" => AudioEncoding::WebmOpus,
            _ => AudioEncoding::Linear16,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AudioEncoding::Linear16 => "LINEAR16",
            AudioEncoding::Mulaw => "MULAW",
            AudioEncoding::Flac => "FLAC",
            AudioEncoding::Amr => "AMR",
            AudioEncoding::AmrWb => "AMR_WB",
            AudioEncoding::OggOpus => "OGG_OPUS",
            AudioEncoding::SpeexWithHeaderByte => "SPEEX_WITH_HEADER_BYTE",
            AudioEncoding::WebmOpus => "WEBM_OPUS",
        }
    }
}

/// Provider session configuration shared by all STT backends.
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// BCP-47 language code (e.g. "en-US").
    pub language_code: String,
    /// Audio sample rate in Hertz.
    pub sample_rate_hz: u32,
    /// Request interim (partial) hypotheses.
    pub interim_results: bool,
    pub encoding: AudioEncoding,
    /// Ask the provider to detect end-of-utterance and stop the session there.
    pub single_utterance: bool,
    /// Provider endpoint override. None = the backend's default.
    pub endpoint: Option<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            sample_rate_hz: 8000,
            interim_results: true,
            encoding: AudioEncoding::Linear16,
            single_utterance: true,
            endpoint: None,
        }
    }
}

/// Safety guardrails for a single segment. A segment that exceeds any limit
/// is dropped; zero disables the corresponding check.
#[derive(Debug, Clone)]
pub struct SegmentLimits {
    /// Max audio bytes per segment.
    pub max_audio_bytes: u64,
    /// Max wall-clock duration per segment.
    pub max_duration: Duration,
    /// Max partial transcripts per segment.
    pub max_partials: u32,
}

impl Default for SegmentLimits {
    fn default() -> Self {
        Self {
            // ~625 seconds at 8kHz 16-bit mono
            max_audio_bytes: 5 * 1024 * 1024,
            max_duration: Duration::from_secs(300),
            max_partials: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_parse_round_trips_known_names() {
        for name in [
            "LINEAR16",
            "MULAW",
            "FLAC",
            "AMR",
            "AMR_WB",
            "OGG_OPUS",
            "SPEEX_WITH_HEADER_BYTE",
            "WEBM_OPUS",
        ] {
            assert_eq!(AudioEncoding::parse(name).as_str(), name);
        }
    }

    #[test]
    fn unknown_encoding_falls_back_to_linear16() {
        assert_eq!(AudioEncoding::parse("OPUS_RAW"), AudioEncoding::Linear16);
        assert_eq!(AudioEncoding::parse(""), AudioEncoding::Linear16);
    }

    #[test]
    fn default_limits_match_guardrails() {
        let limits = SegmentLimits::default();
        assert_eq!(limits.max_audio_bytes, 5 * 1024 * 1024);
        assert_eq!(limits.max_duration, Duration::from_secs(300));
        assert_eq!(limits.max_partials, 500);
    }
}
