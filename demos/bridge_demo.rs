// ABOUTME: Example application wiring a `VideoSink` and `ControlForwarder` together against a
// ABOUTME: synthetic upstream, to exercise both components end to end over real TCP sockets

use argh::FromArgs;
use scrcpy_net_bridge::{
    CodecContext, ControlForwarder, ControllerSocket, PacketSink, Packet, UpstreamCodecId,
    VideoSink,
};
use std::error::Error;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Run a toy video sink and control forwarder pair, feeding the sink synthetic frames and
/// relaying control bytes to a downstream address you provide.
#[derive(FromArgs)]
struct CliArgs {
    /// local port for the video sink to listen on (0 for an OS-assigned port)
    #[argh(option, default = "0")]
    video_port: u16,

    /// local port for the control forwarder to listen on (0 for an OS-assigned port)
    #[argh(option, default = "0")]
    control_port: u16,

    /// host:port of the downstream control socket the forwarder relays to
    #[argh(option)]
    downstream_control: String,

    /// number of synthetic frames to emit before exiting
    #[argh(option, default = "50")]
    frame_count: u32,
}

/// Holds one persistent connection to the downstream control address and hands out cheap
/// `try_clone` duplicates of it, the pattern a real integration would use to reach whatever
/// process owns the actual, already-open control socket.
struct FixedController {
    downstream: TcpStream,
}

impl FixedController {
    fn connect(addr: &str) -> std::io::Result<Self> {
        Ok(FixedController {
            downstream: TcpStream::connect(addr)?,
        })
    }
}

impl ControllerSocket for FixedController {
    fn control_stream(&self) -> std::io::Result<TcpStream> {
        self.downstream.try_clone()
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let args: CliArgs = argh::from_env();

    let sink = VideoSink::new(args.video_port);
    sink.start()?;
    let video_addr = wait_for_bind(|| sink.local_addr());
    tracing::info!(%video_addr, "video sink listening");

    let controller: Arc<dyn ControllerSocket> = Arc::new(FixedController::connect(&args.downstream_control)?);
    let forwarder = ControlForwarder::new(args.control_port);
    forwarder.start(Arc::downgrade(&controller))?;
    let control_addr = wait_for_bind(|| forwarder.local_addr());
    tracing::info!(%control_addr, downstream = %args.downstream_control, "control forwarder listening");

    sink.open(CodecContext::new(UpstreamCodecId::H264 as u32, 1280, 720))?;
    sink.push(&Packet::config(&b"\x00\x00\x00\x01\x67\x42\xc0\x1f"[..]))?;

    for i in 0..args.frame_count {
        let keyframe = i % 30 == 0;
        let payload = vec![0x00, 0x00, 0x00, 0x01, if keyframe { 0x65 } else { 0x41 }, i as u8];
        sink.push(&Packet::frame(payload, u64::from(i) * 33_000, keyframe))?;
        std::thread::sleep(Duration::from_millis(33));
    }

    tracing::info!("synthetic stream finished, shutting down");
    sink.stop();
    sink.join();
    forwarder.stop();
    forwarder.join();
    Ok(())
}

fn wait_for_bind(mut f: impl FnMut() -> Option<std::net::SocketAddr>) -> std::net::SocketAddr {
    for _ in 0..500 {
        if let Some(addr) = f() {
            return addr;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("worker never bound its listener");
}
