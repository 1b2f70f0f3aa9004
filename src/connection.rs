//! Per-probe connection state machine.
//!
//! Each live probe owns one non-blocking socket and walks it through a
//! short conversation: finish the connect, push out the fixed ping
//! payload, read the length prefix of the reply, then read the body. The
//! pump translates readiness events into `on_writable`/`on_readable`
//! calls; everything here is synchronous and never blocks.

use std::io::{self, Read, Write};
use std::net::Ipv4Addr;

use bytes::{Bytes, BytesMut};
use mio::net::TcpStream;

use coding;
use packet;
use MAX_RESPONSE_SIZE;

/// Progress reported after servicing one readiness event.
#[derive(Debug)]
pub enum Progress {
    /// More readiness events are needed.
    Pending,
    /// The full response body has arrived.
    Finished(Bytes),
}

/// Why a probe had to be abandoned.
#[derive(Debug, Fail)]
pub enum ConnectionError {
    #[fail(display = "{}", _0)]
    Io(#[cause] io::Error),
    #[fail(display = "malformed length prefix")]
    BadLengthPrefix,
    #[fail(display = "response length {} out of range", _0)]
    LengthOutOfRange(u32),
    #[fail(display = "peer closed the connection early")]
    EarlyClose,
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> ConnectionError {
        ConnectionError::Io(e)
    }
}

impl From<coding::Malformed> for ConnectionError {
    fn from(_: coding::Malformed) -> ConnectionError {
        ConnectionError::BadLengthPrefix
    }
}

/// Phase of the conversation.
enum State {
    /// Non-blocking connect issued; waiting for writability.
    Connecting,
    /// Draining the ping payload into the socket.
    Sending,
    /// Accumulating the reply's length prefix.
    ReadingLen,
    /// Reading the reply body.
    ReadingBody,
}

pub struct Connection {
    pub stream: TcpStream,
    pub peer: Ipv4Addr,
    state: State,
    /// Bytes of `packet::STATUS_PING` already written.
    sent: usize,
    /// Length prefix bytes received so far.
    prefix: [u8; coding::MAX_VARINT_LEN],
    prefix_len: usize,
    /// Reply body, allocated only once the length prefix is known and in
    /// range, and never resized after that.
    body: Option<BytesMut>,
    filled: usize,
    expected: usize,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: Ipv4Addr) -> Connection {
        Connection {
            stream,
            peer,
            state: State::Connecting,
            sent: 0,
            prefix: [0; coding::MAX_VARINT_LEN],
            prefix_len: 0,
            body: None,
            filled: 0,
            expected: 0,
        }
    }

    /// Service a writable event: the first one completes the connect, and
    /// the payload is pushed until the socket stops taking it.
    pub fn on_writable(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            State::Connecting => self.state = State::Sending,
            State::Sending => {}
            // Writability after the payload is out is uninteresting.
            _ => return Ok(()),
        }
        while self.sent < packet::STATUS_PING.len() {
            match self.stream.write(&packet::STATUS_PING[self.sent..]) {
                Ok(0) => return Err(ConnectionError::EarlyClose),
                Ok(n) => self.sent += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        self.state = State::ReadingLen;
        Ok(())
    }

    /// Service a readable event. Reads until the reply is complete or the
    /// socket has nothing further to give; with an edge-triggered poll the
    /// draining is not optional.
    pub fn on_readable(&mut self) -> Result<Progress, ConnectionError> {
        loop {
            match self.state {
                // Nothing to read before the request is out.
                State::Connecting | State::Sending => return Ok(Progress::Pending),
                State::ReadingLen => {
                    let n = match self.stream.read(&mut self.prefix[self.prefix_len..]) {
                        Ok(0) => return Err(ConnectionError::EarlyClose),
                        Ok(n) => n,
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(Progress::Pending);
                        }
                        Err(e) => return Err(e.into()),
                    };
                    self.prefix_len += n;
                    let (length, consumed) = match coding::decode(&self.prefix[..self.prefix_len])?
                    {
                        Some(decoded) => decoded,
                        None => continue,
                    };
                    if length == 0 || length as usize > MAX_RESPONSE_SIZE {
                        return Err(ConnectionError::LengthOutOfRange(length));
                    }
                    self.expected = length as usize;
                    let mut body = BytesMut::new();
                    body.resize(self.expected, 0);
                    // Whatever we read past the prefix's terminal byte is
                    // the start of the body. Only bytes actually read count,
                    // and never more of them than the body has room for.
                    let spill = (self.prefix_len - consumed).min(self.expected);
                    body[..spill].copy_from_slice(&self.prefix[consumed..consumed + spill]);
                    self.filled = spill;
                    self.body = Some(body);
                    self.state = State::ReadingBody;
                }
                State::ReadingBody => {
                    if self.filled == self.expected {
                        let body = self.body.take().unwrap();
                        return Ok(Progress::Finished(body.freeze()));
                    }
                    let body = self.body.as_mut().unwrap();
                    let n = match self.stream.read(&mut body[self.filled..]) {
                        Ok(0) => return Err(ConnectionError::EarlyClose),
                        Ok(n) => n,
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(Progress::Pending);
                        }
                        Err(e) => return Err(e.into()),
                    };
                    self.filled += n;
                }
            }
        }
    }
}
