//! Socket creation, tuning and readiness waiting
//!
//! Platform differences in socket setup are confined to this module.

use modbus_core::{ModbusError, ModbusResult};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;
use tokio::io::{Interest, Ready};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

/// Whether sockets can be created non-blocking in a single call
const NONBLOCK_AT_CREATION: bool = cfg!(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "fuchsia",
    target_os = "illumos",
    target_os = "linux",
    target_os = "netbsd",
    target_os = "openbsd",
));

#[cfg(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "fuchsia",
    target_os = "illumos",
    target_os = "linux",
    target_os = "netbsd",
    target_os = "openbsd",
))]
fn client_socket_type() -> Type {
    Type::STREAM.nonblocking()
}

#[cfg(not(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "fuchsia",
    target_os = "illumos",
    target_os = "linux",
    target_os = "netbsd",
    target_os = "openbsd",
)))]
fn client_socket_type() -> Type {
    Type::STREAM
}

/// Create a stream socket for a client connection to `addr`
///
/// The socket is close-on-exec (socket2 sets it on creation), non-blocking,
/// has Nagle's algorithm disabled and, for IPv4 on Unix, requests the
/// low-delay type of service.
pub fn tune_client_socket(addr: &SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(*addr), client_socket_type(), Some(Protocol::TCP))?;

    if !NONBLOCK_AT_CREATION {
        socket.set_nonblocking(true)?;
    }

    socket.set_nodelay(true)?;

    #[cfg(all(unix, not(any(target_os = "fuchsia", target_os = "solaris", target_os = "illumos", target_os = "redox"))))]
    if addr.is_ipv4() {
        socket.set_tos(modbus_core::constants::IPTOS_LOWDELAY)?;
    }

    Ok(socket)
}

/// Wait until the stream is ready for `interest`, bounded by `timeout`
///
/// Interrupted waits restart with whatever is left of the original deadline.
pub async fn wait_ready(
    stream: &TcpStream,
    interest: Interest,
    timeout: Option<Duration>,
) -> ModbusResult<Ready> {
    // A timeout too large to express as a deadline waits without bound
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

    loop {
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, stream.ready(interest))
                .await
                .map_err(|_| ModbusError::Timeout)?,
            None => stream.ready(interest).await,
        };

        match result {
            Ok(ready) if !ready.is_empty() => return Ok(ready),
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                log::debug!("A non blocked signal was caught");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Connect to `addr` with a tuned socket, waiting at most `timeout` for completion
///
/// A connection that completes with a pending socket error is reported as refused.
pub async fn connect_with_timeout(
    addr: SocketAddr,
    timeout: Option<Duration>,
) -> ModbusResult<TcpStream> {
    let socket = tune_client_socket(&addr)?;

    if let Err(e) = socket.connect(&addr.into()) {
        if !connect_in_progress(&e) {
            return Err(e.into());
        }
    }

    let stream = TcpStream::from_std(std::net::TcpStream::from(socket))?;
    wait_ready(&stream, Interest::WRITABLE, timeout).await?;

    match stream.take_error()? {
        None => Ok(stream),
        Some(e) => {
            log::debug!("Connection to {} failed: {}", addr, e);
            Err(ModbusError::ConnectionRefused)
        }
    }
}

/// Try each candidate in order and return the first established connection
///
/// Fails with the error of the last candidate when none succeeds.
pub async fn connect_first<I>(candidates: I, timeout: Option<Duration>) -> ModbusResult<TcpStream>
where
    I: IntoIterator<Item = SocketAddr>,
{
    let mut last_error = None;

    for addr in candidates {
        match connect_with_timeout(addr, timeout).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!("Candidate {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(ModbusError::ConnectionRefused))
}

/// Bind a passive socket on `addr` with address reuse and start listening
pub fn listen_on(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;

    TcpListener::from_std(std::net::TcpListener::from(socket))
}

/// Shut down both directions of the stream; the caller drops it afterwards
pub fn shutdown(stream: &TcpStream) {
    if let Err(e) = SockRef::from(stream).shutdown(Shutdown::Both) {
        log::debug!("Shutdown failed: {}", e);
    }
}

#[cfg(unix)]
fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS)
}

#[cfg(not(unix))]
fn connect_in_progress(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}
