//! Socket utilities and tuning

use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Socket buffer sizes for collaboration traffic
pub const RECV_BUFFER_SIZE: usize = 256 * 1024;
pub const SEND_BUFFER_SIZE: usize = 256 * 1024;

/// Create a non-blocking TCP socket for an outbound session
pub fn create_stream_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    // Set buffer sizes
    socket.set_recv_buffer_size(RECV_BUFFER_SIZE)?;
    socket.set_send_buffer_size(SEND_BUFFER_SIZE)?;

    // Edits are small and latency-sensitive
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;

    // TCP keepalive for connection health
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(10));
    socket.set_tcp_keepalive(&keepalive)?;

    Ok(socket)
}
