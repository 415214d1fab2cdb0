//! Byte transports the protocol stack runs over.
//!
//! The engine only needs the small capability set below; the concrete
//! plumbing (socket setup, timeouts, device discovery) stays out here. Read
//! timeouts surface as zero-byte reads so the engine can turn them into
//! truncation faults with full context.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{RadarError, Result};

/// Delivery semantics of a transport, which select the receive strategy:
/// streams get exact-length (and two-phase) reads, datagrams get single
/// maximal allow-partial reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Ordered byte stream without message boundaries (TCP, serial-over-USB).
    Stream,
    /// Whole datagrams up to a ceiling, best effort (UDP).
    Datagram,
}

pub trait Transport {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;

    /// Write as many bytes as the link accepts, returning the count.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` bytes. A timeout is reported as `Ok(0)`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn kind(&self) -> TransportKind;

    /// True when the link only moves 16-bit words and 8-bit fields must be
    /// padded on both sides.
    fn word_aligned(&self) -> bool {
        false
    }
}

fn absorb_timeout(err: std::io::Error) -> Result<usize> {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => Ok(0),
        _ => Err(RadarError::Io(err)),
    }
}

/// Reliable-stream transport over TCP.
pub struct TcpTransport {
    addr: SocketAddr,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        TcpTransport {
            addr,
            timeout,
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "TCP transport connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(addr = %self.addr, "TCP transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(RadarError::NotOpen)?;
        let n = stream.write(data)?;
        trace!(bytes = n, "TCP write");
        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(RadarError::NotOpen)?;
        match stream.read(buf) {
            Ok(n) => {
                trace!(bytes = n, "TCP read");
                Ok(n)
            }
            Err(e) => absorb_timeout(e),
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }
}

/// Best-effort datagram transport over UDP.
pub struct UdpTransport {
    peer: SocketAddr,
    local_port: u16,
    timeout: Duration,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(peer: SocketAddr, local_port: u16, timeout: Duration) -> Self {
        UdpTransport {
            peer,
            local_port,
            timeout,
            socket: None,
        }
    }
}

impl Transport for UdpTransport {
    fn open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = UdpSocket::bind(("0.0.0.0", self.local_port))?;
        socket.set_read_timeout(Some(self.timeout))?;
        debug!(peer = %self.peer, local_port = self.local_port, "UDP transport bound");
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(peer = %self.peer, "UDP transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let socket = self.socket.as_mut().ok_or(RadarError::NotOpen)?;
        let n = socket.send_to(data, self.peer)?;
        trace!(bytes = n, "UDP write");
        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let socket = self.socket.as_mut().ok_or(RadarError::NotOpen)?;
        match socket.recv_from(buf) {
            Ok((n, _peer)) => {
                trace!(bytes = n, "UDP read");
                Ok(n)
            }
            Err(e) => absorb_timeout(e),
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }
}

/// In-memory transport with scripted responses. Used by the test suite and
/// handy for dry-running command sequences without hardware.
pub struct MockTransport {
    kind: TransportKind,
    word_aligned: bool,
    open: bool,
    reads: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    /// Caps each write call, to exercise the transmit retry loop.
    pub max_write_chunk: usize,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        MockTransport {
            kind,
            word_aligned: false,
            open: false,
            reads: VecDeque::new(),
            written: Vec::new(),
            max_write_chunk: usize::MAX,
        }
    }

    pub fn word_aligned(kind: TransportKind) -> Self {
        let mut t = Self::new(kind);
        t.word_aligned = true;
        t
    }

    /// Queue one chunk the next read calls will drain. For a stream this
    /// models a partial TCP segment; for a datagram, one packet.
    pub fn push_response(&mut self, data: &[u8]) {
        self.reads.push_back(data.to_vec());
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = data.len().min(self.max_write_chunk);
        self.written.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(mut chunk) = self.reads.pop_front() else {
            return Ok(0); // nothing scripted: behaves like a timeout
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() && self.kind == TransportKind::Stream {
            // Stream keeps the remainder for the next call.
            chunk.drain(..n);
            self.reads.push_front(chunk);
        }
        Ok(n)
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn word_aligned(&self) -> bool {
        self.word_aligned
    }
}
