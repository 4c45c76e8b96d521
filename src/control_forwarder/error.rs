// ABOUTME: Control forwarder error type, covering only the setup failures that reach the
// ABOUTME: caller synchronously; transient per-client failures are logged, not returned

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwarderError {
    /// Failed to create, bind, or listen on the server socket, or to spawn the worker thread.
    #[error("control forwarder setup failed: {0}")]
    Setup(#[from] io::Error),
}

pub type ForwarderResult<T> = Result<T, ForwarderError>;
