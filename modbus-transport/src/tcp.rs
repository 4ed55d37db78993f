//! TCP connection: client connect, server listen/accept, message exchange

use crate::backend::Backend;
use crate::framer::{hex_dump, Framer};
use crate::mbap::{self, ServerTransaction, TransactionCounter};
use crate::recovery::{self, LinkRepair};
use crate::settings::{ErrorRecovery, TcpSettings, TraceDirection, TraceHook};
use crate::socket;
use crate::target::TcpTarget;
use async_trait::async_trait;
use modbus_core::constants::{TCP_CHECKSUM_LENGTH, TCP_HEADER_LENGTH, TCP_MAX_ADU_LENGTH};
use modbus_core::{MessageType, ModbusError, ModbusResult, UnitId};
use socket2::SockRef;
use std::fmt;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::{TcpListener, TcpStream};

/// One Modbus TCP connection, client or server side
///
/// Cloning yields an independent connection with the same target, settings and
/// transaction counter but no socket.
pub struct TcpConnection {
    target: TcpTarget,
    transactions: TransactionCounter,
    stream: Option<TcpStream>,
    unit_id: UnitId,
    settings: TcpSettings,
    trace: Option<TraceHook>,
}

impl TcpConnection {
    /// Connection to (or listening on) an IPv4 address and port
    pub fn new_tcp(ip: &str, port: u16) -> ModbusResult<Self> {
        Ok(Self::with_target(TcpTarget::ipv4(ip, port)?))
    }

    /// Connection to (or listening on) a host name and service, any address family
    ///
    /// An empty service means port 502.
    pub fn new_tcp_pi(node: &str, service: &str) -> ModbusResult<Self> {
        Ok(Self::with_target(TcpTarget::named(node, service)?))
    }

    fn with_target(target: TcpTarget) -> Self {
        Self {
            target,
            transactions: TransactionCounter::new(),
            stream: None,
            unit_id: UnitId::default(),
            settings: TcpSettings::default(),
            trace: None,
        }
    }

    pub fn with_settings(mut self, settings: TcpSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn target(&self) -> &TcpTarget {
        &self.target
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    /// Set the unit id; accepts `0..=247` and `0xFF`
    pub fn set_unit_id(&mut self, unit_id: i32) -> ModbusResult<()> {
        self.unit_id = UnitId::new(unit_id)?;
        Ok(())
    }

    /// Transaction id of the last request built
    pub fn last_transaction_id(&self) -> u16 {
        self.transactions.current()
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.settings.response_timeout
    }

    pub fn set_response_timeout(&mut self, timeout: Option<Duration>) {
        self.settings.response_timeout = timeout;
    }

    pub fn byte_timeout(&self) -> Option<Duration> {
        self.settings.byte_timeout
    }

    pub fn set_byte_timeout(&mut self, timeout: Option<Duration>) {
        self.settings.byte_timeout = timeout;
    }

    pub fn error_recovery(&self) -> ErrorRecovery {
        self.settings.error_recovery
    }

    pub fn set_error_recovery(&mut self, error_recovery: ErrorRecovery) {
        self.settings.error_recovery = error_recovery;
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.settings.debug = debug;
    }

    /// Install a hook called with every message sent and every message reassembled
    pub fn set_trace_hook(&mut self, hook: Option<TraceHook>) {
        self.trace = hook;
    }

    /// Use a stream established elsewhere, replacing any current socket
    pub fn attach(&mut self, stream: TcpStream) {
        self.close();
        self.stream = Some(stream);
    }

    /// Open a passive socket for this target
    ///
    /// The IPv4 form binds every interface at its port; the named form binds the
    /// first resolved address that accepts the bind.
    pub async fn listen(&self, backlog: i32) -> ModbusResult<TcpListener> {
        let mut last_error: Option<ModbusError> = None;

        for addr in self.target.listen_addresses().await? {
            match socket::listen_on(addr, backlog) {
                Ok(listener) => {
                    log::info!("Listening on {}", addr);
                    return Ok(listener);
                }
                Err(e) => {
                    log::debug!("Cannot listen on {}: {}", addr, e);
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or(ModbusError::BadDescriptor))
    }

    /// Accept one client on `listener` and make it this connection's socket
    ///
    /// On failure the listener is closed and set to `None`.
    pub async fn accept(&mut self, listener: &mut Option<TcpListener>) -> ModbusResult<()> {
        let server = listener.as_ref().ok_or(ModbusError::BadDescriptor)?;
        let accepted = server.accept().await;
        self.finish_accept(listener, accepted)
    }

    fn finish_accept(
        &mut self,
        listener: &mut Option<TcpListener>,
        accepted: io::Result<(TcpStream, SocketAddr)>,
    ) -> ModbusResult<()> {
        match accepted {
            Ok((stream, peer)) => {
                match self.target {
                    TcpTarget::Ipv4 { .. } => {
                        log::info!("The client connection from {} is accepted", peer.ip())
                    }
                    TcpTarget::Named { .. } => log::info!("The client connection is accepted"),
                }
                self.attach(stream);
                Ok(())
            }
            Err(e) => {
                log::error!("Accept failed: {}", e);
                *listener = None;
                Err(e.into())
            }
        }
    }

    fn stream(&self) -> ModbusResult<&TcpStream> {
        self.stream.as_ref().ok_or(ModbusError::BadDescriptor)
    }

    /// Read what the socket holds; `None` when readiness turned out to be stale
    fn read_ready(&self, buf: &mut [u8]) -> ModbusResult<Option<usize>> {
        match self.stream()?.try_read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn trace(&self, msg: &[u8], direction: TraceDirection) {
        if let Some(hook) = &self.trace {
            hook(msg, direction);
        }
    }
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("target", &self.target)
            .field("transactions", &self.transactions)
            .field("connected", &self.stream.is_some())
            .field("unit_id", &self.unit_id)
            .field("settings", &self.settings)
            .field("trace", &self.trace.is_some())
            .finish()
    }
}

impl Clone for TcpConnection {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            transactions: self.transactions,
            stream: None,
            unit_id: self.unit_id,
            settings: self.settings.clone(),
            trace: self.trace.clone(),
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl Backend for TcpConnection {
    fn header_length(&self) -> usize {
        TCP_HEADER_LENGTH
    }

    fn checksum_length(&self) -> usize {
        TCP_CHECKSUM_LENGTH
    }

    fn max_adu_length(&self) -> usize {
        TCP_MAX_ADU_LENGTH
    }

    fn set_slave(&mut self, slave: i32) -> ModbusResult<()> {
        self.set_unit_id(slave)
    }

    fn build_request_basis(
        &mut self,
        function: u8,
        addr: u16,
        nb: u16,
        req: &mut [u8],
    ) -> ModbusResult<usize> {
        let transaction_id = self.transactions.next();
        mbap::build_request_basis(transaction_id, self.unit_id, function, addr, nb, req)
    }

    fn build_response_basis(&self, sft: &ServerTransaction, rsp: &mut [u8]) -> ModbusResult<usize> {
        mbap::build_response_basis(sft, rsp)
    }

    fn prepare_response_tid(&self, req: &[u8]) -> ModbusResult<u16> {
        mbap::transaction_id(req)
    }

    fn send_msg_pre(&self, msg: &mut [u8]) -> ModbusResult<usize> {
        mbap::set_length(msg)
    }

    async fn send(&mut self, msg: &[u8]) -> ModbusResult<usize> {
        if self.settings.debug {
            log::trace!("{}", hex_dump(msg));
        }

        let stream = self.stream.as_mut().ok_or(ModbusError::BadDescriptor)?;
        stream.write_all(msg).await?;

        self.trace(msg, TraceDirection::Sent);
        Ok(msg.len())
    }

    async fn receive_msg(&mut self, msg: &mut [u8], msg_type: MessageType) -> ModbusResult<usize> {
        if self.settings.debug {
            match msg_type {
                MessageType::Indication => log::debug!("Waiting for an indication..."),
                MessageType::Confirmation => log::debug!("Waiting for a confirmation..."),
            }
        }

        let mut framer = Framer::new(
            msg_type,
            self.header_length(),
            self.checksum_length(),
            self.max_adu_length(),
        );

        // A server waits for its next indication without bound
        let mut timeout = match msg_type {
            MessageType::Indication => None,
            MessageType::Confirmation => self.settings.response_timeout,
        };

        while !framer.is_complete() {
            let window = framer.pending();
            if window.end > msg.len() {
                return Err(ModbusError::InvalidArgument(format!(
                    "Message buffer of {} bytes cannot hold {} bytes",
                    msg.len(),
                    window.end
                )));
            }

            if let Err(e) = self.select(timeout).await {
                return Err(recovery::after_wait_failure(self, e).await);
            }

            let read = match self.read_ready(&mut msg[window.clone()]) {
                Ok(None) => continue,
                Ok(Some(0)) => Err(ModbusError::PeerClosed),
                Ok(Some(n)) => Ok(n),
                Err(e) => Err(e),
            };
            let n = match read {
                Ok(n) => n,
                Err(e) => return Err(recovery::after_read_failure(self, e).await),
            };

            if self.settings.debug {
                log::trace!("{}", hex_dump(&msg[window.start..window.start + n]));
            }

            framer.consume(msg, n)?;

            if !framer.is_complete() && self.settings.byte_timeout.is_some() {
                timeout = self.settings.byte_timeout;
            }
        }

        let length = framer.received();
        self.trace(&msg[..length], TraceDirection::Received);

        self.check_integrity(msg, length)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> ModbusResult<usize> {
        loop {
            self.select(None).await?;
            if let Some(n) = self.read_ready(buf)? {
                return Ok(n);
            }
        }
    }

    fn check_integrity(&self, _msg: &[u8], msg_length: usize) -> ModbusResult<usize> {
        Ok(msg_length)
    }

    fn pre_check_confirmation(&self, req: &[u8], rsp: &[u8]) -> ModbusResult<()> {
        let result = mbap::check_confirmation(req, rsp);
        if let Err(e) = &result {
            if self.settings.debug {
                log::error!("{}", e);
            }
        }
        result
    }

    async fn connect(&mut self) -> ModbusResult<()> {
        self.close();

        let timeout = self.settings.response_timeout;
        let stream = match &self.target {
            TcpTarget::Ipv4 { ip, port } => {
                let addr = SocketAddr::from((*ip, *port));
                log::debug!("Connecting to {}", addr);
                socket::connect_with_timeout(addr, timeout).await?
            }
            TcpTarget::Named { .. } => {
                let candidates = self.target.resolve().await?;
                log::debug!("Connecting to {} ({} candidates)", self.target, candidates.len());
                socket::connect_first(candidates, timeout).await?
            }
        };

        log::info!("Connected to {}", self.target);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            socket::shutdown(&stream);
        }
    }

    async fn flush(&mut self) -> ModbusResult<usize> {
        let socket = SockRef::from(self.stream()?);
        let mut sink = [0u8; TCP_MAX_ADU_LENGTH];
        let mut flushed = 0;

        // The socket is non-blocking, so an empty queue ends the loop with WouldBlock
        loop {
            let n = match (&*socket).read(&mut sink) {
                Ok(n) => n,
                Err(_) => break,
            };
            flushed += n;
            if n != TCP_MAX_ADU_LENGTH {
                break;
            }
        }

        if self.settings.debug && flushed > 0 {
            log::debug!("{} bytes flushed", flushed);
        }
        Ok(flushed)
    }

    async fn select(&mut self, timeout: Option<Duration>) -> ModbusResult<()> {
        socket::wait_ready(self.stream()?, Interest::READABLE, timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl LinkRepair for TcpConnection {
    fn error_recovery(&self) -> ErrorRecovery {
        self.settings.error_recovery
    }

    fn response_timeout(&self) -> Option<Duration> {
        self.settings.response_timeout
    }

    async fn flush_link(&mut self) -> ModbusResult<usize> {
        Backend::flush(self).await
    }

    fn close_link(&mut self) {
        Backend::close(self)
    }

    async fn reconnect_link(&mut self) -> ModbusResult<()> {
        Backend::connect(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbus_core::function::READ_HOLDING_REGISTERS;
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_err, assert_ok};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Server bound to an ephemeral port and a client aimed at it
    async fn server_and_client() -> (TcpConnection, Option<TcpListener>, TcpConnection) {
        init_logger();
        let server = TcpConnection::new_tcp("127.0.0.1", 0).unwrap();
        let listener = server.listen(1).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = TcpConnection::new_tcp("127.0.0.1", port).unwrap();
        (server, Some(listener), client)
    }

    /// Connect the client and accept it on the server side
    async fn linked() -> (TcpConnection, Option<TcpListener>, TcpConnection) {
        let (mut server, mut listener, mut client) = server_and_client().await;
        client.connect().await.unwrap();
        server.accept(&mut listener).await.unwrap();
        (server, listener, client)
    }

    fn request(client: &mut TcpConnection) -> Vec<u8> {
        let mut req = [0u8; TCP_MAX_ADU_LENGTH];
        let len = client
            .build_request_basis(READ_HOLDING_REGISTERS, 0x006B, 2, &mut req)
            .unwrap();
        req[..len].to_vec()
    }

    #[tokio::test]
    async fn test_request_confirmation_exchange() {
        let (mut server, mut listener, mut client) = server_and_client().await;

        let server_task = tokio::spawn(async move {
            server.accept(&mut listener).await.unwrap();

            let mut req = [0u8; TCP_MAX_ADU_LENGTH];
            let n = server.receive(&mut req).await.unwrap();
            let sft = ServerTransaction::from_indication(&req[..n]).unwrap();
            assert_eq!(server.prepare_response_tid(&req[..n]).unwrap(), sft.transaction_id);

            let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
            let len = server.build_response_basis(&sft, &mut rsp).unwrap();
            rsp[len..len + 5].copy_from_slice(&[0x04, 0x02, 0x2B, 0x00, 0x00]);
            server.send_message(&mut rsp[..len + 5]).await.unwrap();

            req[..n].to_vec()
        });

        client.set_unit_id(17).unwrap();
        assert_ok!(client.connect().await);

        let mut req = request(&mut client);
        assert_ok!(client.send_message(&mut req).await);

        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        let n = client.receive_confirmation(&req, &mut rsp).await.unwrap();
        assert_eq!(
            &rsp[..n],
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 17, 0x03, 0x04, 0x02, 0x2B, 0x00, 0x00]
        );

        let indication = server_task.await.unwrap();
        assert_eq!(
            indication,
            vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 17, 0x03, 0x00, 0x6B, 0x00, 0x02]
        );
        assert_eq!(client.last_transaction_id(), 1);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        init_logger();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = TcpConnection::new_tcp("127.0.0.1", port).unwrap();
        let result = client.connect().await;
        assert!(matches!(result, Err(ModbusError::ConnectionRefused)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_by_name() {
        let (_server, _listener, client) = server_and_client().await;
        let port = match client.target() {
            TcpTarget::Ipv4 { port, .. } => *port,
            TcpTarget::Named { .. } => unreachable!(),
        };

        let mut named = TcpConnection::new_tcp_pi("localhost", &port.to_string()).unwrap();
        assert_ok!(named.connect().await);
        assert!(named.is_connected());
    }

    #[tokio::test]
    async fn test_accept_without_listener() {
        init_logger();
        let mut server = TcpConnection::new_tcp("127.0.0.1", 1502).unwrap();
        let mut listener = None;
        assert!(matches!(
            server.accept(&mut listener).await,
            Err(ModbusError::BadDescriptor)
        ));
    }

    #[tokio::test]
    async fn test_successful_accept_keeps_listener() {
        let (server, listener, client) = linked().await;
        assert!(listener.is_some());
        assert!(server.is_connected());
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_failed_accept_drops_listener() {
        let (mut server, mut listener, _client) = server_and_client().await;
        assert!(listener.is_some());

        let failure = io::Error::new(io::ErrorKind::PermissionDenied, "accept denied");
        let result = server.finish_accept(&mut listener, Err(failure));

        assert!(matches!(result, Err(ModbusError::Io(_))));
        assert!(listener.is_none());
        assert!(!server.is_connected());

        // Later accepts report the missing listener
        assert!(matches!(
            server.accept(&mut listener).await,
            Err(ModbusError::BadDescriptor)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut server, _listener, mut client) = linked().await;
        assert!(server.is_connected());

        client.close();
        client.close();
        assert!(!client.is_connected());

        let mut buf = [0u8; TCP_MAX_ADU_LENGTH];
        assert!(matches!(client.flush().await, Err(ModbusError::BadDescriptor)));
        assert!(matches!(client.send(&[0u8; 12]).await, Err(ModbusError::BadDescriptor)));
        assert!(matches!(client.select(None).await, Err(ModbusError::BadDescriptor)));

        // The peer sees the shutdown as end of stream
        assert_eq!(server.recv(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clone_is_independent() {
        let (_server, _listener, mut client) = linked().await;
        client.set_unit_id(5).unwrap();
        request(&mut client);

        let mut copy = client.clone();
        assert!(!copy.is_connected());
        assert_eq!(copy.unit_id(), client.unit_id());
        assert_eq!(copy.target(), client.target());

        assert_eq!(transaction_of(&request(&mut copy)), 2);
        assert_eq!(transaction_of(&request(&mut copy)), 3);
        assert_eq!(transaction_of(&request(&mut client)), 2);

        copy.set_unit_id(9).unwrap();
        assert_eq!(client.unit_id().value(), 5);
    }

    fn transaction_of(req: &[u8]) -> u16 {
        mbap::transaction_id(req).unwrap()
    }

    #[tokio::test]
    async fn test_set_unit_id_validation() {
        let mut client = TcpConnection::new_tcp("127.0.0.1", 502).unwrap();
        assert!(client.unit_id().is_unset());
        assert_ok!(client.set_unit_id(0));
        assert_ok!(client.set_unit_id(247));
        assert_ok!(client.set_slave(0xFF));
        assert_err!(client.set_unit_id(248));
        assert_err!(client.set_slave(-1));
        assert!(client.unit_id().is_unset());
    }

    #[tokio::test]
    async fn test_peer_close_reconnects_with_link_recovery() {
        let (mut server, mut listener, mut client) = linked().await;
        client.set_error_recovery(ErrorRecovery::Link);

        server.close();

        let req = request(&mut client);
        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        let err = client.receive_confirmation(&req, &mut rsp).await.unwrap_err();
        assert!(err.is_link_failure(), "unexpected error: {}", err);

        // The repair opened a new connection to the same listener
        assert!(client.is_connected());
        let accepted = tokio::time::timeout(Duration::from_secs(2), server.accept(&mut listener)).await;
        assert!(matches!(accepted, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_peer_close_without_recovery() {
        let (mut server, _listener, mut client) = linked().await;
        server.close();

        let req = request(&mut client);
        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        let err = client.receive_confirmation(&req, &mut rsp).await.unwrap_err();
        assert!(err.is_link_failure());
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_timeout_flushes_late_bytes_with_link_recovery() {
        let (mut server, _listener, mut client) = linked().await;
        client.set_response_timeout(Some(Duration::from_millis(200)));
        client.set_error_recovery(ErrorRecovery::Link);

        let req = request(&mut client);
        let stale = [0x00, 0x63, 0x00, 0x00, 0x00, 0x03, 0xFF, 0x83, 0x02];
        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];

        let (result, _) = tokio::join!(client.receive_confirmation(&req, &mut rsp), async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            server.send(&stale).await.unwrap();
        });
        assert!(matches!(result, Err(ModbusError::Timeout)));

        // The late reply was discarded, the next confirmation is read cleanly
        let mut answer = req.clone();
        answer[5] = 0x03;
        answer.truncate(9);
        answer[7] = 0x83;
        answer[8] = 0x02;
        server.send(&answer).await.unwrap();

        let n = client.receive_confirmation(&req, &mut rsp).await.unwrap();
        assert_eq!(&rsp[..n], &answer[..]);
    }

    #[tokio::test]
    async fn test_timeout_without_recovery() {
        let (_server, _listener, mut client) = linked().await;
        client.set_response_timeout(Some(Duration::from_millis(50)));

        let req = request(&mut client);
        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        assert!(matches!(
            client.receive_confirmation(&req, &mut rsp).await,
            Err(ModbusError::Timeout)
        ));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_byte_timeout_on_partial_message() {
        let (mut server, _listener, mut client) = linked().await;
        client.set_response_timeout(Some(Duration::from_secs(5)));
        client.set_byte_timeout(Some(Duration::from_millis(50)));

        let req = request(&mut client);
        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        // Nine of the thirteen bytes of a two register reply
        server
            .send(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0xFF, 0x03, 0x04])
            .await
            .unwrap();

        // The stall after the first bytes is bounded by the byte timeout, not the response timeout
        let started = tokio::time::Instant::now();
        let result = client.receive_confirmation(&req, &mut rsp).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(ModbusError::Timeout)));
        assert!(elapsed < Duration::from_secs(1), "timed out after {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_huge_response_timeout_waits_for_reply() {
        let (mut server, _listener, mut client) = linked().await;
        client.set_response_timeout(Some(Duration::MAX));
        client.set_byte_timeout(Some(Duration::MAX));

        let req = request(&mut client);
        let mut answer = req[..9].to_vec();
        answer[5] = 0x03;
        answer[7] = 0x83;
        answer[8] = 0x02;
        server.send(&answer).await.unwrap();

        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        let n = client.receive_confirmation(&req, &mut rsp).await.unwrap();
        assert_eq!(&rsp[..n], &answer[..]);
    }

    #[tokio::test]
    async fn test_flush_discards_pending_bytes() {
        let (mut server, _listener, mut client) = linked().await;

        server.send(&[0xAA; 300]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(client.flush().await.unwrap(), 300);
        assert_eq!(client.flush().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transaction_id_mismatch() {
        let (mut server, _listener, mut client) = linked().await;

        let req = request(&mut client);
        let sft = ServerTransaction { transaction_id: 2, unit_id: 0xFF, function: 0x06 };
        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        let len = server.build_response_basis(&sft, &mut rsp).unwrap();
        rsp[len..len + 4].copy_from_slice(&[0x00, 0x01, 0x00, 0x03]);
        server.send_message(&mut rsp[..len + 4]).await.unwrap();

        let mut confirmation = [0u8; TCP_MAX_ADU_LENGTH];
        let err = client.receive_confirmation(&req, &mut confirmation).await.unwrap_err();
        assert!(matches!(
            err,
            ModbusError::TransactionIdMismatch { expected: 1, received: 2 }
        ));
    }

    #[tokio::test]
    async fn test_oversized_confirmation() {
        let (mut server, _listener, mut client) = linked().await;

        let req = request(&mut client);
        server
            .send(&[0x00, 0x01, 0x00, 0x00, 0x01, 0x02, 0xFF, 0x03, 0xFF])
            .await
            .unwrap();

        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        let err = client.receive_confirmation(&req, &mut rsp).await.unwrap_err();
        assert!(matches!(err, ModbusError::TooMuchData { length: 264, max: 260 }));
    }

    #[tokio::test]
    async fn test_buffer_too_small() {
        let mut client = TcpConnection::new_tcp("127.0.0.1", 502).unwrap();
        let mut msg = [0u8; 5];
        assert!(matches!(
            client.receive_msg(&mut msg, MessageType::Confirmation).await,
            Err(ModbusError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_on_attached_stream() {
        init_logger();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut peer = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        let mut server = TcpConnection::new_tcp("127.0.0.1", addr.port()).unwrap();
        server.attach(stream);

        // Write multiple registers: header, function, address, quantity, byte count, data
        let indication = [
            0x00, 0x07, 0x00, 0x00, 0x00, 0x0B, 0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00,
            0x0A, 0x01, 0x02,
        ];
        peer.write_all(&indication[..10]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        peer.write_all(&indication[10..]).await.unwrap();

        let mut req = [0u8; TCP_MAX_ADU_LENGTH];
        let n = server.receive(&mut req).await.unwrap();
        assert_eq!(&req[..n], &indication[..]);
    }

    #[tokio::test]
    async fn test_trace_hook_sees_both_directions() {
        let (mut server, _listener, mut client) = linked().await;

        let seen: Arc<Mutex<Vec<(Vec<u8>, TraceDirection)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.set_debug(true);
        client.set_trace_hook(Some(Arc::new(move |msg: &[u8], direction: TraceDirection| {
            sink.lock().unwrap().push((msg.to_vec(), direction));
        })));

        let mut req = request(&mut client);
        client.send_message(&mut req).await.unwrap();

        let mut indication = [0u8; TCP_MAX_ADU_LENGTH];
        let n = server.receive(&mut indication).await.unwrap();
        let sft = ServerTransaction::from_indication(&indication[..n]).unwrap();
        let mut rsp = [0u8; TCP_MAX_ADU_LENGTH];
        let len = server.build_response_basis(&sft, &mut rsp).unwrap();
        rsp[len..len + 3].copy_from_slice(&[0x02, 0x00, 0x01]);
        server.send_message(&mut rsp[..len + 3]).await.unwrap();

        let mut confirmation = [0u8; TCP_MAX_ADU_LENGTH];
        let n = client.receive_confirmation(&req, &mut confirmation).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (req.clone(), TraceDirection::Sent));
        assert_eq!(seen[1], (confirmation[..n].to_vec(), TraceDirection::Received));
    }

    #[tokio::test]
    async fn test_settings_apply_to_connection() {
        let settings = TcpSettings::new()
            .with_response_timeout(Some(Duration::from_secs(2)))
            .with_byte_timeout(None)
            .with_error_recovery(ErrorRecovery::Link);
        let client = TcpConnection::new_tcp_pi("plc.local", "")
            .unwrap()
            .with_settings(settings.clone());

        assert_eq!(client.settings(), &settings);
        assert_eq!(client.response_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(client.byte_timeout(), None);
        assert_eq!(client.error_recovery(), ErrorRecovery::Link);
        assert_eq!(client.header_length(), 7);
        assert_eq!(client.checksum_length(), 0);
        assert_eq!(client.max_adu_length(), 260);
    }
}
