//! In-process store with the same command semantics as the REST backend.
//!
//! The whole keyspace sits behind one mutex, so a pipeline or transaction
//! executes atomically. Expired keys are purged lazily at the start of every
//! call.

use async_trait::async_trait;
use chrono::Utc;
use engine_core::Result;
use glob::{MatchOptions, Pattern};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::time::{Duration, Instant};

use crate::command::{Command, Reply, StreamId};
use crate::store::KvStore;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
const INVALID_STREAM_ID: &str = "ERR Invalid stream ID specified as stream command argument";
const SCAN_CURSOR_PREFIX: &str = "@";

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
    Stream(Vec<(StreamId, Vec<(String, String)>)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: BTreeMap<String, Entry>,
    last_stream_id: StreamId,
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys matching a glob pattern, sorted.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let Some(pattern) = key_pattern(pattern) else {
            return Vec::new();
        };
        let mut keyspace = self.inner.lock();
        keyspace.purge_expired(Instant::now());
        keyspace
            .entries
            .keys()
            .filter(|k| matches_key(&pattern, k))
            .cloned()
            .collect()
    }

    /// String value of a key.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut keyspace = self.inner.lock();
        keyspace.purge_expired(Instant::now());
        match keyspace.entries.get(key).map(|e| &e.value) {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Members of a set key.
    pub fn members(&self, key: &str) -> BTreeSet<String> {
        let mut keyspace = self.inner.lock();
        keyspace.purge_expired(Instant::now());
        match keyspace.entries.get(key).map(|e| &e.value) {
            Some(Value::Set(members)) => members.clone(),
            _ => BTreeSet::new(),
        }
    }

    /// Remaining TTL in whole seconds, `None` when the key has no expiry.
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let keyspace = self.inner.lock();
        keyspace
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()).as_secs())
    }

    /// Number of entries in a stream key.
    pub fn stream_len(&self, key: &str) -> usize {
        let keyspace = self.inner.lock();
        match keyspace.entries.get(key).map(|e| &e.value) {
            Some(Value::Stream(entries)) => entries.len(),
            _ => 0,
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        let now = Instant::now();
        let mut keyspace = self.inner.lock();
        keyspace.purge_expired(now);
        Ok(commands
            .into_iter()
            .map(|command| keyspace.apply(command, now))
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

impl Keyspace {
    fn purge_expired(&mut self, now: Instant) {
        self.entries
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
    }

    fn apply(&mut self, command: Command, now: Instant) -> Reply {
        match command {
            Command::Ping => Reply::Str("PONG".to_string()),
            Command::Get { key } => match self.entries.get(&key).map(|e| &e.value) {
                None => Reply::Nil,
                Some(Value::Str(s)) => Reply::Str(s.clone()),
                Some(_) => Reply::Error(WRONG_TYPE.to_string()),
            },
            Command::Set { key, value } => {
                self.entries.insert(key, Entry::new(Value::Str(value)));
                Reply::Str("OK".to_string())
            }
            Command::SetNxEx {
                key,
                value,
                ttl_secs,
            } => {
                if self.entries.contains_key(&key) {
                    return Reply::Nil;
                }
                let mut entry = Entry::new(Value::Str(value));
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs));
                self.entries.insert(key, entry);
                Reply::Str("OK".to_string())
            }
            Command::Incr { key } => self.incr(key),
            Command::Expire { key, ttl_secs } => {
                if ttl_secs == 0 {
                    return Reply::Int(i64::from(self.entries.remove(&key).is_some()));
                }
                match self.entries.get_mut(&key) {
                    None => Reply::Int(0),
                    Some(entry) => {
                        entry.expires_at = Some(now + Duration::from_secs(ttl_secs));
                        Reply::Int(1)
                    }
                }
            }
            Command::Ttl { key } => match self.entries.get(&key) {
                None => Reply::Int(-2),
                Some(Entry {
                    expires_at: None, ..
                }) => Reply::Int(-1),
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => Reply::Int(at.saturating_duration_since(now).as_secs() as i64),
            },
            Command::MGet { keys } => Reply::Array(
                keys.iter()
                    .map(|k| match self.entries.get(k).map(|e| &e.value) {
                        Some(Value::Str(s)) => Reply::Str(s.clone()),
                        _ => Reply::Nil,
                    })
                    .collect(),
            ),
            Command::Del { keys } => {
                let removed = keys
                    .iter()
                    .filter(|k| self.entries.remove(k.as_str()).is_some())
                    .count();
                Reply::Int(removed as i64)
            }
            Command::SAdd { key, members } => {
                let entry = self
                    .entries
                    .entry(key)
                    .or_insert_with(|| Entry::new(Value::Set(BTreeSet::new())));
                match &mut entry.value {
                    Value::Set(set) => {
                        let added = members.into_iter().filter(|m| set.insert(m.clone())).count();
                        Reply::Int(added as i64)
                    }
                    _ => Reply::Error(WRONG_TYPE.to_string()),
                }
            }
            Command::SCard { key } => match self.entries.get(&key).map(|e| &e.value) {
                None => Reply::Int(0),
                Some(Value::Set(set)) => Reply::Int(set.len() as i64),
                Some(_) => Reply::Error(WRONG_TYPE.to_string()),
            },
            Command::SMembers { key } => match self.entries.get(&key).map(|e| &e.value) {
                None => Reply::Array(Vec::new()),
                Some(Value::Set(set)) => {
                    Reply::Array(set.iter().cloned().map(Reply::Str).collect())
                }
                Some(_) => Reply::Error(WRONG_TYPE.to_string()),
            },
            Command::SUnion { keys } => match self.union(&keys) {
                Ok(set) => Reply::Array(set.into_iter().map(Reply::Str).collect()),
                Err(reply) => reply,
            },
            Command::SUnionStore { destination, keys } => match self.union(&keys) {
                Ok(set) => {
                    let count = set.len() as i64;
                    if set.is_empty() {
                        self.entries.remove(&destination);
                    } else {
                        self.entries.insert(destination, Entry::new(Value::Set(set)));
                    }
                    Reply::Int(count)
                }
                Err(reply) => reply,
            },
            Command::XAdd { key, fields } => self.xadd(key, fields),
            Command::XRange {
                key,
                start,
                end,
                count,
            } => self.xrange(&key, &start, &end, count),
            Command::Scan {
                cursor,
                pattern,
                count,
            } => self.scan(&cursor, &pattern, count),
        }
    }

    fn incr(&mut self, key: String) -> Reply {
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Str("0".to_string())));
        match &mut entry.value {
            Value::Str(s) => match s.parse::<i64>().ok().and_then(|n| n.checked_add(1)) {
                Some(next) => {
                    *s = next.to_string();
                    Reply::Int(next)
                }
                None => Reply::Error(NOT_INTEGER.to_string()),
            },
            _ => Reply::Error(WRONG_TYPE.to_string()),
        }
    }

    fn union(&self, keys: &[String]) -> std::result::Result<BTreeSet<String>, Reply> {
        let mut union = BTreeSet::new();
        for key in keys {
            match self.entries.get(key).map(|e| &e.value) {
                None => {}
                Some(Value::Set(set)) => union.extend(set.iter().cloned()),
                Some(_) => return Err(Reply::Error(WRONG_TYPE.to_string())),
            }
        }
        Ok(union)
    }

    fn xadd(&mut self, key: String, fields: Vec<(String, String)>) -> Reply {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let id = if now_ms > self.last_stream_id.ms {
            StreamId { ms: now_ms, seq: 0 }
        } else {
            StreamId {
                ms: self.last_stream_id.ms,
                seq: self.last_stream_id.seq + 1,
            }
        };

        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Stream(Vec::new())));
        match &mut entry.value {
            Value::Stream(entries) => {
                entries.push((id, fields));
                self.last_stream_id = id;
                Reply::Str(id.to_string())
            }
            _ => Reply::Error(WRONG_TYPE.to_string()),
        }
    }

    fn xrange(&self, key: &str, start: &str, end: &str, count: usize) -> Reply {
        let (Some(lower), Some(upper)) = (parse_range_bound(start), parse_range_bound(end)) else {
            return Reply::Error(INVALID_STREAM_ID.to_string());
        };

        let entries = match self.entries.get(key).map(|e| &e.value) {
            None => return Reply::Array(Vec::new()),
            Some(Value::Stream(entries)) => entries,
            Some(_) => return Reply::Error(WRONG_TYPE.to_string()),
        };

        let limit = if count == 0 { usize::MAX } else { count };
        Reply::Array(
            entries
                .iter()
                .filter(|(id, _)| lower.admits_from_below(id) && upper.admits_from_above(id))
                .take(limit)
                .map(|(id, fields)| {
                    let flat = fields
                        .iter()
                        .flat_map(|(f, v)| [Reply::Str(f.clone()), Reply::Str(v.clone())])
                        .collect();
                    Reply::Array(vec![Reply::Str(id.to_string()), Reply::Array(flat)])
                })
                .collect(),
        )
    }

    /// The cursor carries the last key examined, so keys that live through
    /// the whole scan are returned even when others come and go between
    /// calls. `count` keys are examined per call regardless of how many
    /// match.
    fn scan(&self, cursor: &str, pattern: &str, count: usize) -> Reply {
        let lower = match cursor {
            "0" => Bound::Unbounded,
            _ => match cursor.strip_prefix(SCAN_CURSOR_PREFIX) {
                Some(last) => Bound::Excluded(last.to_string()),
                None => return Reply::Error("ERR invalid cursor".to_string()),
            },
        };
        let Some(pattern) = key_pattern(pattern) else {
            return Reply::Error("ERR invalid pattern".to_string());
        };
        let count = count.max(1);

        let examined: Vec<&String> = self
            .entries
            .range::<String, _>((lower, Bound::Unbounded))
            .map(|(k, _)| k)
            .take(count)
            .collect();
        let matches: Vec<Reply> = examined
            .iter()
            .filter(|k| matches_key(&pattern, k))
            .map(|k| Reply::Str((*k).clone()))
            .collect();

        let next_cursor = match examined.last() {
            Some(last) if examined.len() == count => {
                let more = self
                    .entries
                    .range::<String, _>((Bound::Excluded((*last).clone()), Bound::Unbounded))
                    .next()
                    .is_some();
                if more {
                    format!("{}{}", SCAN_CURSOR_PREFIX, last)
                } else {
                    "0".to_string()
                }
            }
            _ => "0".to_string(),
        };
        Reply::Array(vec![Reply::Str(next_cursor), Reply::Array(matches)])
    }
}

/// XRANGE bound: `-`, `+`, `<id>` or exclusive `(<id>`.
#[derive(Debug, Clone, Copy)]
enum RangeBound {
    Min,
    Max,
    Inclusive(StreamId),
    Exclusive(StreamId),
}

impl RangeBound {
    fn admits_from_below(&self, id: &StreamId) -> bool {
        match self {
            Self::Min => true,
            Self::Max => false,
            Self::Inclusive(bound) => id >= bound,
            Self::Exclusive(bound) => id > bound,
        }
    }

    fn admits_from_above(&self, id: &StreamId) -> bool {
        match self {
            Self::Min => false,
            Self::Max => true,
            Self::Inclusive(bound) => id <= bound,
            Self::Exclusive(bound) => id < bound,
        }
    }
}

fn parse_range_bound(value: &str) -> Option<RangeBound> {
    match value {
        "-" => Some(RangeBound::Min),
        "+" => Some(RangeBound::Max),
        _ => match value.strip_prefix('(') {
            Some(id) => StreamId::parse(id).map(RangeBound::Exclusive),
            None => StreamId::parse(value).map(RangeBound::Inclusive),
        },
    }
}

/// Compiles a key pattern. Backslash escapes become bracket classes, the
/// rest is already glob syntax.
pub fn key_pattern(pattern: &str) -> Option<Pattern> {
    let mut translated = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ ('*' | '?' | '[' | ']')) => {
                    translated.push('[');
                    translated.push(escaped);
                    translated.push(']');
                }
                Some(escaped) => translated.push(escaped),
                None => translated.push_str("[\\]"),
            },
            c => translated.push(c),
        }
    }
    Pattern::new(&translated).ok()
}

fn matches_key(pattern: &Pattern, key: &str) -> bool {
    pattern.matches_with(key, MatchOptions::new())
}
