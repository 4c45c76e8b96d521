// ABOUTME: Supporting types for the control forwarder: the controller collaborator trait and
// ABOUTME: the observable state-machine phase the worker thread moves through

use std::io;
use std::net::TcpStream;

/// The external collaborator that owns the downstream control socket.
///
/// The forwarder never owns the controller: it holds only a `Weak<dyn ControllerSocket>`, and
/// never owns the control socket either. `control_stream` must hand back a cheap handle
/// (`try_clone`) to the controller's own already-open connection, not open a new one — the
/// downstream endpoint is a session-oriented device, not something to reconnect to per chunk.
pub trait ControllerSocket: Send + Sync {
    /// A duplicate handle to the already-open downstream control stream. Returning `Err` (no
    /// socket open right now) is treated the same as a failed write: the forwarder drops its
    /// TCP client and resumes listening.
    fn control_stream(&self) -> io::Result<TcpStream>;
}

/// The forwarder worker's state-machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderPhase {
    Listening,
    Connected,
    Terminated,
}
