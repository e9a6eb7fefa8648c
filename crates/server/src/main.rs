use std::net::SocketAddr;
use std::sync::Arc;

use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

use speechgate_server::proto::audio_stream_service_server::AudioStreamServiceServer;
use speechgate_server::{AudioGateway, Config, GatewaySettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    init_tracing(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "starting speechgate");
    info!(
        provider = %config.provider,
        language = %config.stt.language_code,
        sample_rate_hz = config.stt.sample_rate_hz,
        interim_results = config.stt.interim_results,
        encoding = config.stt.encoding.as_str(),
        single_utterance = config.stt.single_utterance,
        continuous_mode = config.continuous_mode,
        "stt config"
    );
    info!(
        max_audio_bytes = config.limits.max_audio_bytes,
        max_duration_secs = config.limits.max_duration.as_secs(),
        max_partials = config.limits.max_partials,
        "segment limits"
    );

    let sink = speechgate_events::build_sink(&config.bus)?;
    let gateway = AudioGateway::new(
        GatewaySettings {
            provider: config.provider.clone(),
            stt: config.stt.clone(),
            limits: config.limits.clone(),
            continuous_mode: config.continuous_mode,
            drain_idle: config.drain_idle,
            drain_max: config.drain_max,
        },
        Arc::clone(&sink),
    );

    let addr: SocketAddr = ([0, 0, 0, 0], config.grpc_port).into();
    info!(%addr, "grpc server listening");

    Server::builder()
        .add_service(AudioStreamServiceServer::new(gateway))
        .serve_with_shutdown(addr, shutdown_signal())
        .await?;

    sink.close().await;
    info!("server shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(%err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
