//! Unique-set cardinalities. Multi-set totals always go through a union.

use engine_core::{Error, Result};

use crate::command::{Command, Reply};
use crate::store::{check_replies, KvStore};

/// Cardinality of the union of `keys`. Missing keys count as empty sets.
pub async fn union_cardinality(store: &dyn KvStore, keys: &[String]) -> Result<u64> {
    Ok(union_cardinalities(store, vec![keys.to_vec()]).await?[0])
}

/// One union cardinality per group, in a single round trip.
pub async fn union_cardinalities(store: &dyn KvStore, groups: Vec<Vec<String>>) -> Result<Vec<u64>> {
    let commands: Vec<Command> = groups
        .iter()
        .filter(|keys| !keys.is_empty())
        .map(|keys| Command::SUnion { keys: keys.clone() })
        .collect();
    let replies = if commands.is_empty() {
        Vec::new()
    } else {
        store.pipeline(commands).await?
    };
    check_replies(&replies, "SUNION failed")?;

    let mut replies = replies.into_iter();
    groups
        .iter()
        .map(|keys| {
            if keys.is_empty() {
                return Ok(0);
            }
            replies
                .next()
                .and_then(Reply::into_array)
                .map(|members| members.len() as u64)
                .ok_or_else(|| Error::storage("malformed SUNION reply"))
        })
        .collect()
}

pub async fn set_cardinality(store: &dyn KvStore, key: &str) -> Result<u64> {
    let reply = store.execute(Command::scard(key)).await?;
    Ok(reply.as_int().unwrap_or(0).max(0) as u64)
}
