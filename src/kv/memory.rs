//! In-process key-value store.

use super::{KvError, KvStore, ScanPage};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
enum Value {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory store with the value, set and scan semantics of a networked
/// key-value server.
///
/// Keys are kept ordered so scans are stable while the keyspace is not
/// mutated. A cursor is an offset into that order; concurrent inserts or
/// deletes can shift it, which may cause a key to be skipped or repeated.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Entry>>,
    /// Number of upcoming commands that fail with `Unavailable`.
    fail_next: AtomicUsize,
}

impl MemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commands fail as if the connection dropped.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Remove every key.
    pub fn flush(&self) {
        self.entries.write().clear();
    }

    /// Number of live keys of any type.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), KvError> {
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(KvError::Unavailable("connection reset".to_string())),
            Err(_) => Ok(()),
        }
    }

    /// Drop `key` if it has expired so write paths see a clean slot.
    fn purge_expired(entries: &mut BTreeMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Bytes(bytes) => Ok(Some(bytes.clone())),
                Value::Set(_) => Err(KvError::WrongType(key.to_string())),
            },
            _ => Ok(None),
        }
    }

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let entries = self.entries.read();
        // Non-value keys read as missing, matching MGET.
        Ok(keys
            .iter()
            .map(|key| match entries.get(key) {
                Some(entry) if entry.is_live(now) => match &entry.value {
                    Value::Bytes(bytes) => Some(bytes.clone()),
                    Value::Set(_) => None,
                },
                _ => None,
            })
            .collect())
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), KvError> {
        self.check_available()?;
        // A deadline past the clock's range never arrives.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    fn del(&self, keys: &[String]) -> Result<usize, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.write();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn exists(&self, key: &str) -> Result<bool, KvError> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self.entries.read().get(key).is_some_and(|e| e.is_live(now)))
    }

    fn sadd(&self, key: &str, members: &[String]) -> Result<usize, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.write();
        Self::purge_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(set) => Ok(members.iter().filter(|m| set.insert((*m).clone())).count()),
            Value::Bytes(_) => Err(KvError::WrongType(key.to_string())),
        }
    }

    fn srem(&self, key: &str, members: &[String]) -> Result<usize, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.write();
        Self::purge_expired(&mut entries, key, now);

        let Some(entry) = entries.get_mut(key) else {
            return Ok(0);
        };
        let (removed, now_empty) = match &mut entry.value {
            Value::Set(set) => {
                let removed = members.iter().filter(|m| set.remove(m.as_str())).count();
                (removed, set.is_empty())
            }
            Value::Bytes(_) => return Err(KvError::WrongType(key.to_string())),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                Value::Bytes(_) => Err(KvError::WrongType(key.to_string())),
            },
            _ => Ok(Vec::new()),
        }
    }

    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let count = count.max(1);
        let entries = self.entries.read();

        let mut live = entries
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k)
            .skip(cursor as usize);

        let mut keys = Vec::new();
        let mut visited = 0;
        for key in live.by_ref().take(count) {
            visited += 1;
            if glob_match(pattern, key) {
                keys.push(key.clone());
            }
        }

        let next = if live.next().is_some() {
            cursor + visited as u64
        } else {
            0
        };
        Ok(ScanPage { cursor: next, keys })
    }
}

/// Glob match supporting `*`, `?` and backslash escapes.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                backtrack = Some((pi, ti));
                pi += 1;
                continue;
            }
            Some('?') => {
                pi += 1;
                ti += 1;
                continue;
            }
            Some('\\') if pi + 1 < p.len() && p[pi + 1] == t[ti] => {
                pi += 2;
                ti += 1;
                continue;
            }
            Some(&c) if c != '\\' && c == t[ti] => {
                pi += 1;
                ti += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, matched)) => {
                pi = star + 1;
                ti = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
