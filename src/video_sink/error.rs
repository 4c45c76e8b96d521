// ABOUTME: Video sink error types: one enum covering both setup failures and
// ABOUTME: upstream-contract violations

use std::io;
use thiserror::Error;

/// Errors returned by `VideoSink` operations.
///
/// Transient per-client failures (accept errors, a disconnected client, a short write) are
/// never surfaced here — the worker logs and retries those internally. This enum only covers
/// the cases that reach the caller synchronously: setup failures from `start`, and
/// upstream-contract violations from `open`/`push`.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to create, bind, or listen on the server socket, or to spawn the worker thread.
    #[error("video sink setup failed: {0}")]
    Setup(#[from] io::Error),

    /// `open` was called with a codec identifier that is neither H.264 nor HEVC.
    #[error("unsupported codec id {0:#x}")]
    UnsupportedCodec(u32),

    /// `open` was called with a zero width or height.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// `push`/`open` was called after `close`.
    #[error("video sink is stopped")]
    Stopped,

    /// `push` was given a payload too large to frame (its length does not fit in the wire
    /// format's 32-bit length field). In practice unreachable at realistic packet sizes; this
    /// variant exists so the enqueue path has a real error to return rather than panicking or
    /// silently truncating if it ever is.
    #[error("packet payload of {0} bytes exceeds the 32-bit frame length field")]
    PayloadTooLarge(usize),
}

pub type SinkResult<T> = Result<T, SinkError>;
