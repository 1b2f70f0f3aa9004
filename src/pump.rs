//! The connection pump: owns every live probe and drives them all from a
//! single readiness loop.
//!
//! The pump keeps the connection table topped up from the address
//! enumerator, waits on the poller with no timeout of its own (pacing
//! comes from the kernel's TCP timeouts aging out the silent majority of
//! targets), services each readiness batch, and retires connections as
//! they finish or fail. It exits once the enumerator is exhausted and the
//! last probe has retired.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use libc;
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use slog::Logger;
use socket2::{Domain, Protocol, Socket, Type};

use connection::{Connection, Progress};
use packet;
use store::StatusSink;

/// Upper bound on events serviced per poll wakeup.
const MAX_EVENTS: usize = 64;

/// Parameters governing the sweep.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of connections to keep in flight.
    pub target_connections: usize,
    /// Destination port the status service listens on.
    pub scan_port: u16,
    /// Source port shared by every outbound socket, bound with address
    /// reuse. The kernel tells connections apart by their remote address,
    /// so one shared port sidesteps ephemeral-port exhaustion, which would
    /// otherwise cap the sweep at around 28k connects. Zero falls back to
    /// an ephemeral port per socket.
    pub local_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_connections: 4000,
            scan_port: 25565,
            local_port: 12345,
        }
    }
}

/// Counters accumulated over the sweep.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Probes successfully initiated.
    pub probed: u64,
    /// Status documents persisted.
    pub responses: u64,
    /// Initiation failures other than unreachable destinations.
    pub connect_failures: u64,
    /// Destinations with no route; routine when sweeping space the
    /// exclusion list does not cover.
    pub unreachable: u64,
}

pub struct Pump<I, S> {
    log: Logger,
    poll: Poll,
    targets: I,
    exhausted: bool,
    connections: Slab<Connection>,
    sink: S,
    stats: Stats,
    config: Config,
}

impl<I, S> Pump<I, S>
where
    I: Iterator<Item = Ipv4Addr>,
    S: StatusSink,
{
    pub fn new(log: Logger, config: Config, targets: I, sink: S) -> io::Result<Pump<I, S>> {
        Ok(Pump {
            log,
            poll: Poll::new()?,
            targets,
            exhausted: false,
            connections: Slab::with_capacity(config.target_connections),
            sink,
            stats: Stats::default(),
            config,
        })
    }

    /// Number of probes currently in flight.
    pub fn in_flight(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Drive the sweep until the address space is exhausted and every
    /// outstanding probe has retired.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(MAX_EVENTS);
        loop {
            self.fill();
            // `fill` only stops short of the target once the enumerator is
            // exhausted, so an empty table here means the sweep is over.
            if self.connections.is_empty() {
                break;
            }
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }
            for event in events.iter() {
                self.dispatch(event);
            }
        }
        info!(self.log, "sweep complete";
              "probed" => self.stats.probed,
              "responses" => self.stats.responses,
              "connect_failures" => self.stats.connect_failures,
              "unreachable" => self.stats.unreachable);
        Ok(())
    }

    /// Top the connection table back up to the configured concurrency.
    fn fill(&mut self) {
        while self.connections.len() < self.config.target_connections && !self.exhausted {
            let addr = match self.targets.next() {
                Some(addr) => addr,
                None => {
                    self.exhausted = true;
                    info!(self.log, "address space exhausted, draining";
                          "in_flight" => self.connections.len());
                    break;
                }
            };
            if let Err(e) = self.initiate(addr) {
                if e.raw_os_error() == Some(libc::ENETUNREACH) {
                    self.stats.unreachable += 1;
                } else {
                    self.stats.connect_failures += 1;
                    warn!(self.log, "failed to open probe"; "peer" => %addr, "error" => %e);
                }
            }
        }
    }

    /// Open a non-blocking socket toward `peer` and register it with the
    /// poller for both directions.
    fn initiate(&mut self, peer: Ipv4Addr) -> io::Result<()> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.local_port);
        socket.bind(&SocketAddr::from(local).into())?;
        let remote = SocketAddrV4::new(peer, self.config.scan_port);
        match socket.connect(&SocketAddr::from(remote).into()) {
            Ok(()) => {}
            Err(ref e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(e) => return Err(e),
        }
        let stream = TcpStream::from_std(socket.into());

        let key = self.connections.insert(Connection::new(stream, peer));
        if let Err(e) = self.poll.registry().register(
            &mut self.connections[key].stream,
            Token(key),
            Interest::READABLE | Interest::WRITABLE,
        ) {
            // The socket closes when the record drops.
            self.connections.remove(key);
            return Err(e);
        }
        self.stats.probed += 1;
        Ok(())
    }

    /// Route one readiness event to the owning connection. Write-side
    /// progress is serviced before read-side, so an event carrying both
    /// can finish the payload and start on the reply; a hangup flag is
    /// only acted on last, once any delivered data has been drained.
    fn dispatch(&mut self, event: &Event) {
        let key = event.token().0;
        // A connection retired earlier in this batch may still have
        // events queued against its old slot.
        if !self.connections.contains(key) {
            return;
        }
        if event.is_error() {
            // The errno behind the error flag lives on the socket.
            let cause = match self.connections[key].stream.take_error() {
                Ok(Some(e)) => e.to_string(),
                _ => "socket error".to_string(),
            };
            debug!(self.log, "probe failed"; "peer" => %self.connections[key].peer,
                   "error" => %cause);
            self.retire(key, None);
            return;
        }
        if event.is_writable() {
            if let Err(e) = self.connections[key].on_writable() {
                debug!(self.log, "probe failed"; "peer" => %self.connections[key].peer,
                       "error" => %e);
                self.retire(key, None);
                return;
            }
        }
        // The read side is tried after any write-side progress, not just on
        // an explicit readable flag: an edge-triggered poller will not
        // repeat a readable edge that arrived while the request was still
        // being sent.
        if event.is_readable() || event.is_writable() {
            match self.connections[key].on_readable() {
                Ok(Progress::Pending) => {}
                Ok(Progress::Finished(body)) => {
                    self.retire(key, Some(body));
                    return;
                }
                Err(e) => {
                    debug!(self.log, "probe failed"; "peer" => %self.connections[key].peer,
                           "error" => %e);
                    self.retire(key, None);
                    return;
                }
            }
        }
        if event.is_read_closed() {
            debug!(self.log, "probe failed"; "peer" => %self.connections[key].peer,
                   "error" => "peer hung up");
            self.retire(key, None);
        }
    }

    /// Tear down a probe, persisting its status document when one arrived.
    fn retire(&mut self, key: usize, response: Option<Bytes>) {
        let mut conn = self.connections.remove(key);
        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            debug!(self.log, "failed to deregister socket"; "error" => %e);
        }
        let body = match response {
            Some(body) => body,
            None => return,
        };
        let status = match packet::extract_status(&body) {
            Some(status) => status,
            None => {
                // A reply with no `{` carries no document; drop it quietly.
                trace!(self.log, "response without status document"; "peer" => %conn.peer);
                return;
            }
        };
        let status = String::from_utf8_lossy(status);
        debug!(self.log, "server responded"; "peer" => %conn.peer, "bytes" => status.len());
        match self.sink.record(conn.peer, unix_time(), &status) {
            Ok(()) => self.stats.responses += 1,
            Err(e) => {
                error!(self.log, "failed to persist status"; "peer" => %conn.peer,
                       "error" => %e);
            }
        }
    }
}

/// Seconds since the Unix epoch.
fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
