//! Redis-backed key-value store.

use super::{KvError, KvStore, ScanPage};
use parking_lot::Mutex;
use redis::{Client, Connection, RedisError, RedisResult};
use std::time::Duration;
use tracing::{debug, warn};

/// Default time allowed for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`KvStore`] over a single Redis connection.
///
/// The connection is opened on first use and reopened after an I/O failure.
/// Commands are serialized on that connection.
pub struct RedisKvStore {
    client: Client,
    connection: Mutex<Option<Connection>>,
    connect_timeout: Duration,
}

impl RedisKvStore {
    /// Parse `url` (for example `redis://127.0.0.1:6379/0`). No connection
    /// is made until the first command.
    pub fn connect(url: &str) -> Result<Self, KvError> {
        let client = Client::open(url).map_err(|e| KvError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn run<T>(
        &self,
        key: &str,
        command: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> Result<T, KvError> {
        let mut slot = self.connection.lock();
        let mut connection = match slot.take() {
            Some(connection) => connection,
            None => {
                debug!(timeout_ms = self.connect_timeout.as_millis() as u64, "opening redis connection");
                self.client
                    .get_connection_with_timeout(self.connect_timeout)
                    .map_err(|e| map_error(key, e))?
            }
        };

        match command(&mut connection) {
            Ok(value) => {
                *slot = Some(connection);
                Ok(value)
            }
            Err(e) => {
                if is_connection_failure(&e) {
                    warn!(error = %e, "dropping redis connection");
                } else {
                    *slot = Some(connection);
                }
                Err(map_error(key, e))
            }
        }
    }
}

fn is_connection_failure(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

fn map_error(key: &str, e: RedisError) -> KvError {
    if e.code() == Some("WRONGTYPE") {
        KvError::WrongType(key.to_string())
    } else {
        KvError::Unavailable(e.to_string())
    }
}

impl KvStore for RedisKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.run(key, |con| redis::cmd("GET").arg(key).query(con))
    }

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.run(&keys[0], |con| redis::cmd("MGET").arg(keys).query(con))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), KvError> {
        self.run(key, |con| {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                // PX rejects zero; sub-millisecond TTLs round up.
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                cmd.arg("PX").arg(millis);
            }
            cmd.query(con)
        })
    }

    fn del(&self, keys: &[String]) -> Result<usize, KvError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(&keys[0], |con| redis::cmd("DEL").arg(keys).query(con))
    }

    fn exists(&self, key: &str) -> Result<bool, KvError> {
        self.run(key, |con| redis::cmd("EXISTS").arg(key).query(con))
    }

    fn sadd(&self, key: &str, members: &[String]) -> Result<usize, KvError> {
        if members.is_empty() {
            return Ok(0);
        }
        self.run(key, |con| redis::cmd("SADD").arg(key).arg(members).query(con))
    }

    fn srem(&self, key: &str, members: &[String]) -> Result<usize, KvError> {
        if members.is_empty() {
            return Ok(0);
        }
        self.run(key, |con| redis::cmd("SREM").arg(key).arg(members).query(con))
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        self.run(key, |con| redis::cmd("SMEMBERS").arg(key).query(con))
    }

    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, KvError> {
        let (cursor, keys): (u64, Vec<String>) = self.run(pattern, |con| {
            redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query(con)
        })?;
        Ok(ScanPage { cursor, keys })
    }
}
