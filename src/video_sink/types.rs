// ABOUTME: Supporting types for the video sink: the codec context passed to `open` and the
// ABOUTME: observable state-machine phase the worker thread moves through

use crate::packet::Codec;

/// Codec metadata the upstream pipeline reports to `open`.
///
/// `codec_id` is a raw identifier in the upstream demuxer's own codec enumeration (see
/// `UpstreamCodecId`); it is validated and narrowed to `Codec` inside `open`, not here, so the
/// struct can be constructed directly from whatever the caller has on hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecContext {
    pub codec_id: u32,
    pub width: u32,
    pub height: u32,
}

impl CodecContext {
    pub fn new(codec_id: u32, width: u32, height: u32) -> Self {
        CodecContext {
            codec_id,
            width,
            height,
        }
    }
}

/// Codec metadata as recorded once `open` succeeds: a validated `Codec` plus dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CodecInfo {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
}

/// The sink worker's state-machine position.
///
/// This is tracked purely for observability (tests and diagnostics can poll
/// `VideoSink::phase`); it does not gate any behavior that the mutex/condvar pair and the
/// `stopped` flag don't already gate on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkPhase {
    Listening,
    AwaitCodec,
    Serving,
    Draining,
    Terminated,
}
