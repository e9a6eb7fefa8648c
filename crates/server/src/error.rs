use tonic::{Code, Status};

/// Maps a stream receive error onto a human-readable drop reason.
pub fn classify_stream_error(status: &Status) -> String {
    match status.code() {
        Code::Cancelled => "client disconnect".to_string(),
        Code::DeadlineExceeded => "timeout".to_string(),
        Code::Unavailable => "network error".to_string(),
        Code::ResourceExhausted => "resource exhausted".to_string(),
        Code::Unknown if status.message().to_ascii_lowercase().contains("eof") => {
            "unexpected connection close".to_string()
        }
        code => format!("stream error: {} ({})", status.message(), code),
    }
}
