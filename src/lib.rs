pub mod codec;
pub mod control_forwarder;
pub mod net;
pub mod packet;
pub mod video_sink;

pub use control_forwarder::error::{ForwarderError, ForwarderResult};
pub use control_forwarder::types::{ControllerSocket, ForwarderPhase};
pub use control_forwarder::ControlForwarder;
pub use packet::{Codec, Packet, UpstreamCodecId};
pub use video_sink::error::{SinkError, SinkResult};
pub use video_sink::types::{CodecContext, SinkPhase};
pub use video_sink::{PacketSink, VideoSink};

/// Error returned by most functions in this crate.
///
/// Each component has its own error enum (`SinkError`, `ForwarderError`) covering the handful
/// of cases that reach the caller synchronously. This boxed alias exists for call sites
/// (demos, tests) that want to handle either uniformly.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type using the boxed `Error` above.
pub type Result<T> = std::result::Result<T, Error>;
