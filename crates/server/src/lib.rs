pub mod config;
pub mod error;
pub mod grpc;

/// Generated gRPC types for the audio stream service.
pub mod proto {
    tonic::include_proto!("speechgate.v1");
}

pub use config::Config;
pub use error::classify_stream_error;
pub use grpc::{AudioGateway, GatewaySettings};
