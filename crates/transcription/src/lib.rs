pub mod config;
pub mod handler;
pub mod lifecycle;
pub mod segment;
pub mod stt;

pub use config::{AudioEncoding, SegmentLimits, SttConfig};
pub use handler::{SegmentMetrics, SessionError, SessionHandler, TransitionCallback};
pub use lifecycle::{Lifecycle, LifecycleError, State};
pub use segment::SegmentIdGenerator;
pub use stt::{SttAdapter, SttCallback, SttError};
