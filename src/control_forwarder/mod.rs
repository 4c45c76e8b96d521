// ABOUTME: Control forwarder: relays raw bytes from a single TCP client verbatim to whatever
// ABOUTME: control socket the controller collaborator currently has open

pub mod error;
pub mod types;

use crate::net;
use error::{ForwarderError, ForwarderResult};
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use types::{ControllerSocket, ForwarderPhase};

/// Maximum bytes read from the TCP client per `recv`. The forwarder imposes no message
/// framing of its own; whatever the kernel yields in one read is forwarded in one write.
pub const READ_BUFFER_SIZE: usize = 256;

struct ForwarderState {
    stopped: bool,
    client: Option<TcpStream>,
    phase: ForwarderPhase,
}

struct Shared {
    port: u16,
    state: Mutex<ForwarderState>,
    listener: Mutex<Option<TcpListener>>,
    controller: Mutex<Option<Weak<dyn ControllerSocket>>>,
}

/// Forwards a single TCP client's byte stream to the controller's downstream control socket.
pub struct ControlForwarder {
    inner: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ControlForwarder {
    /// `init`: configure the port and shared state. Does not bind or spawn anything yet.
    pub fn new(port: u16) -> Self {
        ControlForwarder {
            inner: Arc::new(Shared {
                port,
                state: Mutex::new(ForwarderState {
                    stopped: false,
                    client: None,
                    phase: ForwarderPhase::Listening,
                }),
                listener: Mutex::new(None),
                controller: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// `start`: bind the forwarder to `controller` (held only as a `Weak` reference) and spawn
    /// the worker thread.
    pub fn start(&self, controller: Weak<dyn ControllerSocket>) -> ForwarderResult<()> {
        *self.inner.controller.lock().unwrap() = Some(controller);

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("control-forwarder".into())
            .spawn(move || run_worker(inner))
            .map_err(ForwarderError::Setup)?;
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Current state-machine phase, for diagnostics and tests.
    pub fn phase(&self) -> ForwarderPhase {
        self.inner.state.lock().unwrap().phase
    }

    /// The address the worker actually bound to, once it has done so. See
    /// `VideoSink::local_addr` for why this exists.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner
            .listener
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    /// `stop`: set the terminal flag, then shut down both sockets so the worker's blocking
    /// `accept`/`recv` return immediately. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.stopped = true;
        }

        if let Some(listener) = self.inner.listener.lock().unwrap().as_ref() {
            if let Err(e) = net::interrupt_listener(listener) {
                tracing::debug!(error = %e, "control forwarder: interrupting listener failed (already closed?)");
            }
        }

        let client_handle = self
            .inner
            .state
            .lock()
            .unwrap()
            .client
            .as_ref()
            .and_then(|c| c.try_clone().ok());
        if let Some(client) = client_handle {
            if let Err(e) = net::interrupt_stream(&client) {
                tracing::debug!(error = %e, "control forwarder: interrupting client failed (already closed?)");
            }
        }
    }

    /// `join`: block until the worker thread exits.
    pub fn join(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("control forwarder: worker thread panicked");
            }
        }
    }

    /// `destroy`: consume the forwarder, releasing its shared state. See
    /// `VideoSink::destroy` for why this exists despite Rust's ownership already handling it.
    pub fn destroy(self) {
        debug_assert!(
            self.worker.lock().unwrap().is_none(),
            "destroy called before join"
        );
    }
}

impl Drop for ControlForwarder {
    fn drop(&mut self) {
        if self.worker.lock().unwrap().is_some() {
            tracing::warn!("control forwarder dropped without join; worker thread leaked");
        }
    }
}

fn is_stopped(shared: &Shared) -> bool {
    shared.state.lock().unwrap().stopped
}

fn set_phase(shared: &Shared, phase: ForwarderPhase) {
    shared.state.lock().unwrap().phase = phase;
}

fn run_worker(shared: Arc<Shared>) {
    let listener = match net::bind_loopback(shared.port) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, port = shared.port, "control forwarder: could not listen");
            return;
        }
    };

    match listener.try_clone() {
        Ok(clone) => *shared.listener.lock().unwrap() = Some(clone),
        Err(e) => tracing::warn!(error = %e, "control forwarder: could not duplicate listener handle"),
    }

    tracing::info!(port = shared.port, "control forwarder: listening");

    while !is_stopped(&shared) {
        set_phase(&shared, ForwarderPhase::Listening);

        let (stream, _) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                if is_stopped(&shared) {
                    break;
                }
                tracing::warn!(error = %e, "control forwarder: accept failed, retrying");
                continue;
            }
        };
        tracing::info!("control forwarder: client connected");
        shared.state.lock().unwrap().client = stream.try_clone().ok();
        set_phase(&shared, ForwarderPhase::Connected);

        forward_client(&shared, stream);

        shared.state.lock().unwrap().client = None;
    }

    set_phase(&shared, ForwarderPhase::Terminated);
    tracing::debug!("control forwarder: worker thread ended");
}

fn forward_client(shared: &Arc<Shared>, mut stream: TcpStream) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    while !is_stopped(shared) {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                tracing::info!("control forwarder: client disconnected");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "control forwarder: receive error");
                break;
            }
        };

        let Some(controller) = shared
            .controller
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
        else {
            tracing::warn!("control forwarder: controller is gone, dropping client");
            break;
        };

        let mut control_stream = match controller.control_stream() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "control forwarder: no downstream control socket");
                break;
            }
        };

        if let Err(e) = net::send_all(&mut control_stream, &buf[..n]) {
            tracing::warn!(error = %e, "control forwarder: failed to forward control message");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener as StdListener;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Holds a single already-open connection to the downstream capture point and hands out
    /// cheap `try_clone` duplicates of it, the way a real controller hands out handles to its
    /// one persistent control socket rather than reconnecting per call.
    struct CaptureController {
        downstream: TcpStream,
        failed: AtomicBool,
    }

    impl ControllerSocket for CaptureController {
        fn control_stream(&self) -> std::io::Result<TcpStream> {
            if self.failed.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("controller unavailable"));
            }
            self.downstream.try_clone()
        }
    }

    #[test]
    fn new_forwarder_starts_in_listening_phase() {
        let forwarder = ControlForwarder::new(0);
        assert_eq!(forwarder.phase(), ForwarderPhase::Listening);
    }

    #[test]
    fn echo_forwards_bytes_to_controller_socket() {
        let capture = StdListener::bind("127.0.0.1:0").unwrap();
        let capture_addr = capture.local_addr().unwrap();
        let downstream = TcpStream::connect(capture_addr).unwrap();
        let controller: Arc<dyn ControllerSocket> = Arc::new(CaptureController {
            downstream,
            failed: AtomicBool::new(false),
        });

        let forwarder = ControlForwarder::new(0);
        forwarder.start(Arc::downgrade(&controller)).unwrap();

        // Spin until the worker has bound its listener.
        let listener_addr = loop {
            if let Some(addr) = forwarder.local_addr() {
                break addr;
            }
        };

        let mut client = TcpStream::connect(listener_addr).unwrap();
        client.write_all(&[0x04, 0x00, 0x00, 0x17, 0x70]).unwrap();

        let (mut captured, _) = capture.accept().unwrap();
        let mut buf = [0u8; 5];
        captured.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x04, 0x00, 0x00, 0x17, 0x70]);

        forwarder.stop();
        forwarder.join();
    }
}
