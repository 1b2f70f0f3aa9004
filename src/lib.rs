//! Internet-wide sweep for Minecraft server status endpoints.
//!
//! The sweep enumerates the whole IPv4 space in a permuted order, keeps a
//! fixed number of non-blocking TCP probes in flight against port 25565,
//! and records every JSON status document that comes back. The interesting
//! machinery is in two places: `addrgen`, a full-period walk over the
//! 32-bit space minus a bogon exclusion list, and `pump`, the readiness
//! loop that owns every live socket. Nearly all targets never answer and
//! are aged out by the kernel's own connect timeout, which is what paces
//! the scan.

extern crate bytes;
#[macro_use]
extern crate failure;
extern crate libc;
extern crate mio;
extern crate rusqlite;
extern crate slab;
#[macro_use]
extern crate slog;
extern crate socket2;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;
#[cfg(test)]
extern crate hex_literal;
#[cfg(test)]
extern crate tempfile;

pub mod addrgen;
pub mod coding;
pub mod connection;
pub mod exclude;
pub mod packet;
pub mod pump;
pub mod store;

/// Longest reply body we are willing to buffer, in bytes. Anything larger
/// is assumed to be garbage or hostile and retires the connection.
pub const MAX_RESPONSE_SIZE: usize = 65536;
