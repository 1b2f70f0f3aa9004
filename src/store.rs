//! Persistence for collected status documents.

use std::net::Ipv4Addr;
use std::path::Path;

use failure::Error;
use rusqlite;

/// Destination for collected status documents.
///
/// The pump calls `record` once per responder, in whatever order probes
/// happen to complete; implementations must not rely on any ordering.
/// Failures are logged by the caller and do not stop the sweep.
pub trait StatusSink {
    fn record(&mut self, peer: Ipv4Addr, unix_time: u64, status: &str) -> Result<(), Error>;
}

impl<'a, S: StatusSink> StatusSink for &'a mut S {
    fn record(&mut self, peer: Ipv4Addr, unix_time: u64, status: &str) -> Result<(), Error> {
        (**self).record(peer, unix_time, status)
    }
}

/// Appends one row per responder to a local SQLite database.
pub struct SqliteStore {
    db: rusqlite::Connection,
}

impl SqliteStore {
    /// Open the database at `path`, creating it and the `servers` table as
    /// needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SqliteStore, Error> {
        SqliteStore::init(rusqlite::Connection::open(path)?)
    }

    /// A store backed by an in-memory database.
    pub fn open_in_memory() -> Result<SqliteStore, Error> {
        SqliteStore::init(rusqlite::Connection::open_in_memory()?)
    }

    fn init(db: rusqlite::Connection) -> Result<SqliteStore, Error> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS servers (
                 address TEXT NOT NULL,
                 timestamp INTEGER NOT NULL,
                 response TEXT NOT NULL
             )",
            [],
        )?;
        Ok(SqliteStore { db })
    }

    /// Number of rows recorded.
    pub fn len(&self) -> Result<u64, Error> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM servers", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl StatusSink for SqliteStore {
    fn record(&mut self, peer: Ipv4Addr, unix_time: u64, status: &str) -> Result<(), Error> {
        self.db.execute(
            "INSERT INTO servers (address, timestamp, response) VALUES (?1, ?2, ?3)",
            (peer.to_string(), unix_time as i64, status),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.len().unwrap(), 0);

        store
            .record(Ipv4Addr::new(198, 51, 100, 7), 1_700_000_000, "{\"a\":1}")
            .unwrap();
        store
            .record(Ipv4Addr::new(203, 0, 113, 9), 1_700_000_001, "{}")
            .unwrap();
        assert_eq!(store.len().unwrap(), 2);

        let (address, timestamp, response): (String, i64, String) = store
            .db
            .query_row(
                "SELECT address, timestamp, response FROM servers ORDER BY timestamp LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(address, "198.51.100.7");
        assert_eq!(timestamp, 1_700_000_000);
        assert_eq!(response, "{\"a\":1}");
    }

    #[test]
    fn records_through_mut_reference() {
        fn record_one<S: StatusSink>(mut sink: S) {
            sink.record(Ipv4Addr::new(192, 0, 2, 1), 0, "{}").unwrap();
        }

        let mut store = SqliteStore::open_in_memory().unwrap();
        record_one(&mut store);
        assert_eq!(store.len().unwrap(), 1);
    }
}
