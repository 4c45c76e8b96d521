use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Poll `f` until it returns `Some`, or panic after a generous timeout.
///
/// Used to wait for a worker thread to finish binding its listener before a test client tries
/// to connect — these components bind from a background thread, so there is an inherent
/// (small, bounded) race between `start` returning and the socket being ready to accept.
pub fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(v) = f() {
            return v;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for condition");
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub fn read_exact_timeout(stream: &mut std::net::TcpStream, len: usize) -> Vec<u8> {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut buf = vec![0u8; len];
    std::io::Read::read_exact(stream, &mut buf).expect("read_exact within timeout");
    buf
}

#[allow(dead_code)]
pub fn local_loopback(port: u16) -> SocketAddr {
    (std::net::Ipv4Addr::LOCALHOST, port).into()
}

/// Run `join_fn` (expected to block until a worker thread exits) on a helper thread and assert
/// it completes within a generous bound, proving shutdown actually unblocks the worker rather
/// than hanging forever.
pub fn assert_join_is_bounded(join_fn: impl FnOnce() + Send + 'static) {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        join_fn();
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(5))
        .expect("join did not return within the bound");
}
