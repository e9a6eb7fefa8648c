//! Minimal streaming test client: sends a few canned audio frames and
//! prints the terminal ack.

use std::time::Duration;

use tokio_stream::wrappers::ReceiverStream;

use speechgate_server::proto::AudioFrame;
use speechgate_server::proto::audio_stream_service_client::AudioStreamServiceClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint =
        std::env::var("SPEECHGATE_ADDR").unwrap_or_else(|_| "http://localhost:50051".to_string());
    let mut client = AudioStreamServiceClient::connect(endpoint.clone()).await?;
    println!("connected to {endpoint}");

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    tokio::spawn(async move {
        let chunks: [(&str, bool); 3] = [
            ("audio-chunk-1", false),
            ("audio-chunk-2", false),
            ("audio-chunk-3", true),
        ];
        for (i, (chunk, end_of_utterance)) in chunks.into_iter().enumerate() {
            let frame = AudioFrame {
                interaction_id: "int-123".to_string(),
                tenant_id: "tenant-456".to_string(),
                audio: chunk.as_bytes().to_vec(),
                audio_offset_ms: i as i64 * 100,
                end_of_utterance,
            };
            println!("sending frame {} (end_of_utterance={end_of_utterance})", i + 1);
            if tx.send(frame).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let ack = client
        .stream_audio(ReceiverStream::new(rx))
        .await?
        .into_inner();
    println!("ack received: interaction_id={}", ack.interaction_id);
    Ok(())
}
