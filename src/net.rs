// ABOUTME: Loopback TCP helpers shared by the video sink and control forwarder: binding,
// ABOUTME: blocking send-all, and the shutdown-based "interrupt" used to unblock a worker

use socket2::SockRef;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};

/// Listen backlog used by both components: at most one client is ever served at a time, the
/// kernel queues (and eventually rejects) anything beyond that.
pub const LISTEN_BACKLOG: i32 = 1;

/// Bind a `TcpListener` to `127.0.0.1:port` with the fixed backlog of 1.
///
/// Built from `socket2::Socket` rather than `TcpListener::bind` directly so the backlog is
/// explicit rather than left to the platform default, and so the same socket can later be
/// duplicated and shut down from `stop` while a worker thread blocks in `accept` on it.
pub fn bind_loopback(port: u16) -> io::Result<TcpListener> {
    use socket2::{Domain, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    let addr: SocketAddr = (Ipv4Addr::LOCALHOST, port).into();
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

/// Write the entire buffer or fail; never short-writes on success, matching the blocking
/// `send_all` semantics the framing layer above assumes.
pub fn send_all(stream: &mut TcpStream, buf: &[u8]) -> io::Result<()> {
    stream.write_all(buf)
}

/// Shut down both directions of `listener`'s underlying socket so a thread blocked in
/// `accept` on it returns an error immediately. Does not close the caller's own handle;
/// `listener` itself remains valid to drop normally afterward.
pub fn interrupt_listener(listener: &TcpListener) -> io::Result<()> {
    SockRef::from(listener).shutdown(Shutdown::Both)
}

/// Shut down both directions of `stream`'s underlying socket so a thread blocked in `recv`
/// or `send` on it returns an error immediately.
pub fn interrupt_stream(stream: &TcpStream) -> io::Result<()> {
    SockRef::from(stream).shutdown(Shutdown::Both)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn bind_loopback_accepts_a_connection() {
        let listener = bind_loopback(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (_accepted, _peer) = listener.accept().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn interrupt_listener_unblocks_pending_accept() {
        let listener = bind_loopback(0).unwrap();
        let interruptor = listener.try_clone().unwrap();

        let worker = thread::spawn(move || listener.accept());

        thread::sleep(Duration::from_millis(20));
        interrupt_listener(&interruptor).unwrap();

        let result = worker.join().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn interrupt_stream_unblocks_pending_recv() {
        let listener = bind_loopback(0).unwrap();
        let addr = listener.local_addr().unwrap();
        let client_side = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let interruptor = server_side.try_clone().unwrap();

        let worker = thread::spawn(move || {
            let mut buf = [0u8; 8];
            std::io::Read::read(&mut { server_side }, &mut buf)
        });

        thread::sleep(Duration::from_millis(20));
        interrupt_stream(&interruptor).unwrap();

        let result = worker.join().unwrap();
        assert_eq!(result.unwrap(), 0);
        drop(client_side);
    }
}
