// ABOUTME: Video packet sink: accepts one TCP client at a time and streams framed H.264/H.265
// ABOUTME: packets to it, late-binding codec metadata and caching the latest config packet

pub mod error;
pub mod types;

use crate::codec::{encode_codec_header, encode_packet_frame};
use crate::net;
use crate::packet::{Codec, Packet, UpstreamCodecId};
use error::{SinkError, SinkResult};
use std::collections::VecDeque;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use types::{CodecContext, CodecInfo, SinkPhase};

/// The three-operation capability the upstream pipeline drives the sink through.
///
/// Calls are expected from a single upstream thread; concurrent calls across threads are not
/// required to be safe, though this implementation's shared-mutex design tolerates them (see
/// `DESIGN.md`).
pub trait PacketSink {
    /// Record codec metadata. Must be called once, before any `push`.
    fn open(&self, ctx: CodecContext) -> SinkResult<()>;
    /// Hand a packet to the sink. Never blocks on I/O.
    fn push(&self, packet: &Packet) -> SinkResult<()>;
    /// Signal shutdown. Idempotent; does not join the worker.
    fn close(&self);
}

struct SinkState {
    stopped: bool,
    codec: Option<CodecInfo>,
    codec_sent: bool,
    config_packet: Option<Packet>,
    queue: VecDeque<Packet>,
    client: Option<TcpStream>,
    phase: SinkPhase,
}

impl SinkState {
    fn new() -> Self {
        SinkState {
            stopped: false,
            codec: None,
            codec_sent: false,
            config_packet: None,
            queue: VecDeque::new(),
            client: None,
            phase: SinkPhase::Listening,
        }
    }
}

struct Shared {
    port: u16,
    state: Mutex<SinkState>,
    cond: Condvar,
    /// A handle to the listening socket, set once by the worker before its accept loop so
    /// `stop` can shut it down from outside. Guarded separately from `state` because `stop`
    /// only ever duplicates this handle to shut it down; it never replaces the worker's copy.
    listener: Mutex<Option<TcpListener>>,
}

/// A video packet sink bound to a single loopback TCP port.
///
/// Owns one worker thread (spawned by `start`) that accepts at most one client at a time,
/// sends it the codec header and any cached config packet, then streams queued packets until
/// the client disconnects or the sink is stopped.
pub struct VideoSink {
    inner: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VideoSink {
    /// `init`: configure the port and shared state. Does not bind or spawn anything yet.
    pub fn new(port: u16) -> Self {
        VideoSink {
            inner: Arc::new(Shared {
                port,
                state: Mutex::new(SinkState::new()),
                cond: Condvar::new(),
                listener: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// `start`: spawn the worker thread. Returns an error (without spawning) if the thread
    /// cannot be created; the caller must not call `stop`/`join` in that case.
    pub fn start(&self) -> SinkResult<()> {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("video-sink".into())
            .spawn(move || run_worker(inner))
            .map_err(SinkError::Setup)?;
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Current state-machine phase, for diagnostics and tests.
    pub fn phase(&self) -> SinkPhase {
        self.inner.state.lock().unwrap().phase
    }

    /// The address the worker actually bound to, once it has done so.
    ///
    /// Useful with `port = 0` (bind to an OS-assigned ephemeral port): callers that need to
    /// know which port that turned out to be (tests, mainly) can poll this after `start`.
    /// Returns `None` until the worker has bound its listener, and after `stop`/`join`.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner
            .listener
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    /// `stop`: set the terminal flag and unblock any socket the worker may be blocked in.
    /// Idempotent.
    pub fn stop(&self) {
        signal_stop(&self.inner);

        if let Some(listener) = self.inner.listener.lock().unwrap().as_ref() {
            if let Err(e) = net::interrupt_listener(listener) {
                tracing::debug!(error = %e, "video sink: interrupting listener failed (already closed?)");
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
                tracing::debug!(error = %e, "video sink: interrupting client failed (already closed?)");
            }
        }
    }

    /// `join`: block until the worker thread exits.
    pub fn join(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("video sink: worker thread panicked");
            }
        }
    }

    /// `destroy`: consume the sink, releasing its queue and cached config packet.
    ///
    /// Ownership already guarantees this happens on drop; this method exists as an explicit
    /// lifecycle step, so misuse (destroying before joining) is caught in debug builds rather
    /// than silently racing the worker thread.
    pub fn destroy(self) {
        debug_assert!(
            self.worker.lock().unwrap().is_none(),
            "destroy called before join"
        );
    }
}

impl PacketSink for VideoSink {
    fn open(&self, ctx: CodecContext) -> SinkResult<()> {
        if ctx.width == 0 || ctx.height == 0 {
            return Err(SinkError::InvalidDimensions {
                width: ctx.width,
                height: ctx.height,
            });
        }

        let codec: Codec = UpstreamCodecId::try_from(ctx.codec_id)
            .map_err(|_| SinkError::UnsupportedCodec(ctx.codec_id))?
            .into();

        {
            let mut state = self.inner.state.lock().unwrap();
            state.codec = Some(CodecInfo {
                codec,
                width: ctx.width,
                height: ctx.height,
            });
            state.codec_sent = true;
        }
        self.inner.cond.notify_all();
        tracing::info!(?codec, width = ctx.width, height = ctx.height, "video sink: codec ready");
        Ok(())
    }

    fn push(&self, packet: &Packet) -> SinkResult<()> {
        if u32::try_from(packet.payload.len()).is_err() {
            return Err(SinkError::PayloadTooLarge(packet.payload.len()));
        }

        let mut state = self.inner.state.lock().unwrap();
        if state.stopped {
            return Err(SinkError::Stopped);
        }

        if packet.is_config() {
            state.config_packet = Some(packet.clone());
            tracing::debug!(size = packet.payload.len(), "video sink: cached config packet");
        }

        if state.client.is_none() {
            // No client connected: drop, but the config cache above still applies.
            return Ok(());
        }

        state.queue.push_back(packet.clone());
        drop(state);
        self.inner.cond.notify_all();
        Ok(())
    }

    fn close(&self) {
        signal_stop(&self.inner);
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        if self.worker.lock().unwrap().is_some() {
            tracing::warn!("video sink dropped without join; worker thread leaked");
        }
    }
}

fn signal_stop(shared: &Arc<Shared>) {
    {
        let mut state = shared.state.lock().unwrap();
        state.stopped = true;
    }
    shared.cond.notify_all();
}

fn set_phase(shared: &Shared, phase: SinkPhase) {
    shared.state.lock().unwrap().phase = phase;
}

fn is_stopped(shared: &Shared) -> bool {
    shared.state.lock().unwrap().stopped
}

fn run_worker(shared: Arc<Shared>) {
    let listener = match net::bind_loopback(shared.port) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, port = shared.port, "video sink: could not listen");
            return;
        }
    };

    match listener.try_clone() {
        Ok(clone) => *shared.listener.lock().unwrap() = Some(clone),
        Err(e) => tracing::warn!(error = %e, "video sink: could not duplicate listener handle"),
    }

    tracing::info!(port = shared.port, "video sink: listening");

    while !is_stopped(&shared) {
        set_phase(&shared, SinkPhase::Listening);

        let (stream, _) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                if is_stopped(&shared) {
                    break;
                }
                tracing::warn!(error = %e, "video sink: accept failed, retrying");
                continue;
            }
        };
        tracing::info!("video sink: client connected");

        if !serve_client(&shared, stream) {
            break;
        }
    }

    set_phase(&shared, SinkPhase::Draining);
    {
        let mut state = shared.state.lock().unwrap();
        state.queue.clear();
        state.client = None;
    }
    set_phase(&shared, SinkPhase::Terminated);
    tracing::debug!("video sink: worker thread ended");
}

/// Serve one client end to end: wait for codec info, send the header and cached config, then
/// stream the queue. Returns `false` if the sink was stopped while serving this client (the
/// caller should exit the outer accept loop), `true` to keep listening for the next client.
fn serve_client(shared: &Arc<Shared>, mut stream: TcpStream) -> bool {
    let codec = {
        set_phase(shared, SinkPhase::AwaitCodec);
        let mut state = shared.state.lock().unwrap();
        state.client = stream.try_clone().ok();
        let state = shared
            .cond
            .wait_while(state, |s| !s.codec_sent && !s.stopped)
            .unwrap();
        if state.stopped {
            return false;
        }
        state.codec.expect("codec_sent implies codec is set")
    };

    if !send_codec_header(&mut stream, codec) {
        drop_client(shared);
        return true;
    }

    let cached_config = shared.state.lock().unwrap().config_packet.clone();
    if let Some(config) = cached_config {
        if !send_packet(&mut stream, &config) {
            drop_client(shared);
            return true;
        }
        tracing::info!("video sink: sent cached config packet to new client");
    }

    set_phase(shared, SinkPhase::Serving);
    loop {
        let packet = {
            let state = shared.state.lock().unwrap();
            let mut state = shared
                .cond
                .wait_while(state, |s| s.queue.is_empty() && !s.stopped)
                .unwrap();
            if state.stopped {
                return false;
            }
            state.queue.pop_front().expect("queue non-empty by wait predicate")
        };

        if !send_packet(&mut stream, &packet) {
            tracing::info!("video sink: client disconnected");
            break;
        }
    }

    drop_client(shared);
    true
}

fn drop_client(shared: &Arc<Shared>) {
    shared.state.lock().unwrap().client = None;
}

fn send_codec_header(stream: &mut TcpStream, codec: CodecInfo) -> bool {
    let bytes = encode_codec_header(codec.codec.wire_tag(), codec.width, codec.height);
    match net::send_all(stream, &bytes) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "video sink: failed to send codec header, client disconnected");
            false
        }
    }
}

fn send_packet(stream: &mut TcpStream, packet: &Packet) -> bool {
    let wire = match encode_packet_frame(packet) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::warn!(error = %e, "video sink: failed to encode packet");
            return false;
        }
    };
    match net::send_all(stream, &wire) {
        Ok(()) => true,
        Err(e) => {
            let _: io::Error = e;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sink_starts_in_listening_phase_before_start() {
        let sink = VideoSink::new(0);
        assert_eq!(sink.phase(), SinkPhase::Listening);
    }

    #[test]
    fn push_before_stop_while_no_client_caches_config_only() {
        let sink = VideoSink::new(0);
        let config = Packet::config(&b"sps-pps"[..]);
        sink.push(&config).unwrap();

        let state = sink.inner.state.lock().unwrap();
        assert!(state.queue.is_empty());
        assert!(state.config_packet.is_some());
    }

    #[test]
    fn push_after_close_fails() {
        let sink = VideoSink::new(0);
        sink.close();
        let packet = Packet::frame(&b"x"[..], 1, false);
        assert!(matches!(sink.push(&packet), Err(SinkError::Stopped)));
    }

    #[test]
    fn open_rejects_unsupported_codec() {
        let sink = VideoSink::new(0);
        let ctx = CodecContext::new(999, 1280, 720);
        assert!(matches!(sink.open(ctx), Err(SinkError::UnsupportedCodec(999))));
    }

    #[test]
    fn open_rejects_zero_dimensions() {
        let sink = VideoSink::new(0);
        let ctx = CodecContext::new(UpstreamCodecId::H264 as u32, 0, 720);
        assert!(matches!(sink.open(ctx), Err(SinkError::InvalidDimensions { .. })));
    }

    #[test]
    fn open_success_sets_codec_and_signals() {
        let sink = VideoSink::new(0);
        let ctx = CodecContext::new(UpstreamCodecId::H264 as u32, 1280, 720);
        sink.open(ctx).unwrap();

        let state = sink.inner.state.lock().unwrap();
        assert!(state.codec_sent);
        assert_eq!(state.codec.unwrap().codec, Codec::H264);
    }
}
