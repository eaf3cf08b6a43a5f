//! A single stream socket plus its activity timestamp. Reads drain in
//! 511-byte chunks until the socket would block or reports a zero-length
//! read (peer closed). Line splitting and request-state concerns live one
//! layer up, in `HttpConnection` — `Connection` only knows about bytes.

use std::io::{self, Read, Write};

use mio::net::TcpStream;

use crate::address::Address;
use crate::clock::Clock;

/// Bytes read off the wire in one non-blocking drain, per `read_once`.
pub struct ReadOutcome {
    pub data: Vec<u8>,
    pub closed: bool,
}

pub struct Connection {
    pub stream: TcpStream,
    pub remote: Address,
    pub remote_port: u16,
    last_read_ms: u64,
}

impl Connection {
    pub fn new(stream: TcpStream, remote: Address, remote_port: u16, clock: &dyn Clock) -> Self {
        Self {
            stream,
            remote,
            remote_port,
            last_read_ms: clock.now_ms(),
        }
    }

    /// Drains the socket in 511-byte chunks until it would block or the
    /// peer closes. A `WouldBlock` ends the drain without signalling
    /// closure; a zero-length read does.
    pub fn read_once(&mut self, clock: &dyn Clock) -> io::Result<ReadOutcome> {
        let mut data = Vec::new();
        let mut buf = [0u8; 511];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(ReadOutcome { data, closed: true }),
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if !data.is_empty() {
            self.last_read_ms = clock.now_ms();
        }
        Ok(ReadOutcome { data, closed: false })
    }

    /// Writes the whole buffer, looping on partial writes. A write error
    /// aborts the send silently rather than retrying.
    pub fn send(&mut self, bytes: &[u8]) {
        let mut sent = 0;
        while sent < bytes.len() {
            match self.stream.write(&bytes[sent..]) {
                Ok(0) => break,
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }

    pub fn ms_since_last_read(&self, clock: &dyn Clock) -> u64 {
        clock.now_ms().saturating_sub(self.last_read_ms)
    }
}
