//! Address blocks that must never be probed.
//!
//! The sweep is pointed at the entire IPv4 space, so the only thing
//! keeping it off reserved, multicast, and private ranges is this list.
//! It is loaded once at startup and queried for every candidate address.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::iter::FromIterator;
use std::net::Ipv4Addr;
use std::path::Path;

/// One CIDR block, stored with host bits already cleared so that a
/// sloppy entry like `10.5.3.0/8` matches the same addresses as
/// `10.0.0.0/8`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Subnet {
    prefix: u32,
    mask: u32,
}

impl Subnet {
    /// Build from a network address and prefix length, clearing any host
    /// bits. Returns `None` for prefix lengths over 32.
    pub fn new(network: Ipv4Addr, prefix_len: u32) -> Option<Subnet> {
        if prefix_len > 32 {
            return None;
        }
        let mask = if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len)
        };
        Some(Subnet {
            prefix: u32::from(network) & mask,
            mask,
        })
    }

    fn matches(&self, addr: u32) -> bool {
        addr & self.mask == self.prefix
    }
}

#[derive(Debug, Fail)]
pub enum LoadError {
    #[fail(display = "failed to read exclusion list: {}", _0)]
    Io(#[cause] io::Error),
}

impl From<io::Error> for LoadError {
    fn from(e: io::Error) -> LoadError {
        LoadError::Io(e)
    }
}

/// The set of address blocks withheld from the sweep.
///
/// Membership is a linear scan; bogon coverage is a few dozen entries and
/// anything fancier would be tuning the wrong thing.
#[derive(Debug, Default)]
pub struct ExclusionSet {
    subnets: Vec<Subnet>,
}

impl ExclusionSet {
    /// Load from a text file with one `A.B.C.D/P` entry per line. Lines
    /// that do not parse are skipped; a missing or unreadable file is an
    /// error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ExclusionSet, LoadError> {
        let file = File::open(path)?;
        let mut subnets = Vec::new();
        for line in BufReader::new(file).lines() {
            if let Some(subnet) = parse_subnet(&line?) {
                subnets.push(subnet);
            }
        }
        Ok(ExclusionSet { subnets })
    }

    /// Whether `addr` (host byte order) falls inside any excluded block.
    pub fn contains(&self, addr: u32) -> bool {
        self.subnets.iter().any(|subnet| subnet.matches(addr))
    }

    pub fn len(&self) -> usize {
        self.subnets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }
}

impl FromIterator<Subnet> for ExclusionSet {
    fn from_iter<T: IntoIterator<Item = Subnet>>(iter: T) -> ExclusionSet {
        ExclusionSet {
            subnets: iter.into_iter().collect(),
        }
    }
}

fn parse_subnet(line: &str) -> Option<Subnet> {
    let line = line.trim();
    let mut parts = line.splitn(2, '/');
    let network = parts.next()?.parse::<Ipv4Addr>().ok()?;
    let prefix_len = parts.next()?.parse::<u32>().ok()?;
    Subnet::new(network, prefix_len)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile;

    use super::*;

    fn addr(s: &str) -> u32 {
        s.parse::<Ipv4Addr>().unwrap().into()
    }

    #[test]
    fn host_bits_cleared_on_ingest() {
        assert_eq!(parse_subnet("10.5.3.0/8"), parse_subnet("10.0.0.0/8"));
    }

    #[test]
    fn full_and_single_prefixes() {
        let everything: ExclusionSet = parse_subnet("1.2.3.4/0").into_iter().collect();
        assert!(everything.contains(addr("0.0.0.0")));
        assert!(everything.contains(addr("8.8.8.8")));
        assert!(everything.contains(addr("255.255.255.255")));

        let single: ExclusionSet = parse_subnet("192.0.2.7/32").into_iter().collect();
        assert!(single.contains(addr("192.0.2.7")));
        assert!(!single.contains(addr("192.0.2.6")));
        assert!(!single.contains(addr("192.0.2.8")));
    }

    #[test]
    fn matching_is_masked() {
        let set: ExclusionSet = parse_subnet("172.16.0.0/12").into_iter().collect();
        assert!(set.contains(addr("172.16.0.1")));
        assert!(set.contains(addr("172.31.255.255")));
        assert!(!set.contains(addr("172.32.0.0")));
        assert!(!set.contains(addr("172.15.255.255")));
    }

    #[test]
    fn junk_lines_rejected() {
        assert_eq!(parse_subnet(""), None);
        assert_eq!(parse_subnet("# comment"), None);
        assert_eq!(parse_subnet("10.0.0.0"), None);
        assert_eq!(parse_subnet("10.0.0.0/33"), None);
        assert_eq!(parse_subnet("256.0.0.0/8"), None);
        assert_eq!(parse_subnet("10.0.0/8"), None);
        assert_eq!(parse_subnet("10.0.0.0/8/24"), None);
    }

    #[test]
    fn load_skips_junk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0.0.0/8").unwrap();
        writeln!(file, "this is not a subnet").unwrap();
        writeln!(file, "224.0.0.0/4").unwrap();
        writeln!(file).unwrap();
        file.flush().unwrap();

        let set = ExclusionSet::load(file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(addr("0.1.2.3")));
        assert!(set.contains(addr("239.255.255.250")));
        assert!(!set.contains(addr("1.1.1.1")));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert_matches!(
            ExclusionSet::load("/nonexistent/exclude.txt"),
            Err(LoadError::Io(_))
        );
    }
}
