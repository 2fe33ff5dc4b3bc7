//! Store command surface and replies.

use engine_core::{Error, Result};
use serde_json::Value;
use std::fmt;

/// Commands understood by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Get { key: String },
    Set { key: String, value: String },
    /// `SET key value NX EX ttl`
    SetNxEx { key: String, value: String, ttl_secs: u64 },
    Incr { key: String },
    Expire { key: String, ttl_secs: u64 },
    Ttl { key: String },
    MGet { keys: Vec<String> },
    Del { keys: Vec<String> },
    SAdd { key: String, members: Vec<String> },
    SCard { key: String },
    SMembers { key: String },
    SUnion { keys: Vec<String> },
    SUnionStore { destination: String, keys: Vec<String> },
    /// `XADD key * field value ...`
    XAdd { key: String, fields: Vec<(String, String)> },
    XRange { key: String, start: String, end: String, count: usize },
    Scan { cursor: String, pattern: String, count: usize },
}

impl Command {
    pub fn get(key: impl Into<String>) -> Self {
        Self::Get { key: key.into() }
    }

    pub fn set(key: impl Into<String>, value: impl ToString) -> Self {
        Self::Set {
            key: key.into(),
            value: value.to_string(),
        }
    }

    pub fn set_nx_ex(key: impl Into<String>, value: impl Into<String>, ttl_secs: u64) -> Self {
        Self::SetNxEx {
            key: key.into(),
            value: value.into(),
            ttl_secs,
        }
    }

    pub fn incr(key: impl Into<String>) -> Self {
        Self::Incr { key: key.into() }
    }

    pub fn expire(key: impl Into<String>, ttl_secs: u64) -> Self {
        Self::Expire {
            key: key.into(),
            ttl_secs,
        }
    }

    pub fn sadd(key: impl Into<String>, members: Vec<String>) -> Self {
        Self::SAdd {
            key: key.into(),
            members,
        }
    }

    pub fn scard(key: impl Into<String>) -> Self {
        Self::SCard { key: key.into() }
    }

    pub fn del(keys: Vec<String>) -> Self {
        Self::Del { keys }
    }

    /// Command name, for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Get { .. } => "GET",
            Self::Set { .. } | Self::SetNxEx { .. } => "SET",
            Self::Incr { .. } => "INCR",
            Self::Expire { .. } => "EXPIRE",
            Self::Ttl { .. } => "TTL",
            Self::MGet { .. } => "MGET",
            Self::Del { .. } => "DEL",
            Self::SAdd { .. } => "SADD",
            Self::SCard { .. } => "SCARD",
            Self::SMembers { .. } => "SMEMBERS",
            Self::SUnion { .. } => "SUNION",
            Self::SUnionStore { .. } => "SUNIONSTORE",
            Self::XAdd { .. } => "XADD",
            Self::XRange { .. } => "XRANGE",
            Self::Scan { .. } => "SCAN",
        }
    }

    /// Wire form: command name followed by its arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        match self {
            Self::Ping => {}
            Self::Get { key }
            | Self::Incr { key }
            | Self::Ttl { key }
            | Self::SCard { key }
            | Self::SMembers { key } => args.push(key.clone()),
            Self::Set { key, value } => args.extend([key.clone(), value.clone()]),
            Self::SetNxEx {
                key,
                value,
                ttl_secs,
            } => args.extend([
                key.clone(),
                value.clone(),
                "NX".to_string(),
                "EX".to_string(),
                ttl_secs.to_string(),
            ]),
            Self::Expire { key, ttl_secs } => args.extend([key.clone(), ttl_secs.to_string()]),
            Self::MGet { keys } | Self::Del { keys } | Self::SUnion { keys } => {
                args.extend(keys.iter().cloned())
            }
            Self::SAdd { key, members } => {
                args.push(key.clone());
                args.extend(members.iter().cloned());
            }
            Self::SUnionStore { destination, keys } => {
                args.push(destination.clone());
                args.extend(keys.iter().cloned());
            }
            Self::XAdd { key, fields } => {
                args.push(key.clone());
                args.push("*".to_string());
                for (field, value) in fields {
                    args.push(field.clone());
                    args.push(value.clone());
                }
            }
            Self::XRange {
                key,
                start,
                end,
                count,
            } => args.extend([
                key.clone(),
                start.clone(),
                end.clone(),
                "COUNT".to_string(),
                count.to_string(),
            ]),
            Self::Scan {
                cursor,
                pattern,
                count,
            } => args.extend([
                cursor.clone(),
                "MATCH".to_string(),
                pattern.clone(),
                "COUNT".to_string(),
                count.to_string(),
            ]),
        }
        args
    }
}

/// One command's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Int(i64),
    Str(String),
    Array(Vec<Reply>),
    /// Per-command error; the rest of the pipeline still ran.
    Error(String),
}

impl Reply {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Nil,
            Value::Bool(b) => Self::Int(i64::from(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Str(n.to_string()),
            },
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(_) => Self::Str(value.to_string()),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Integer value; numeric strings count.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Reply>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Turn an error reply into a storage error.
    pub fn into_result(self, command: &str) -> Result<Reply> {
        match self {
            Self::Error(message) => Err(Error::storage(format!("{} failed: {}", command, message))),
            other => Ok(other),
        }
    }
}

/// Stream entry id, `<ms>-<seq>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub fn parse(value: &str) -> Option<Self> {
        let (ms, seq) = match value.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (value, "0"),
        };
        Some(Self {
            ms: ms.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }

    /// Exclusive XRANGE start after this id.
    pub fn exclusive(&self) -> String {
        format!("({}", self)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}
