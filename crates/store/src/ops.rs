//! Multi-round-trip key operations: scan, bulk reads, chunked writes, locks.

use engine_core::limits::{MGET_CHUNK, SCAN_COUNT};
use engine_core::{Error, Result};
use tracing::debug;

use crate::command::{Command, Reply};
use crate::store::{check_replies, KvStore};

/// Upper bound on SCAN round trips for one pattern.
const MAX_SCAN_ROUNDS: usize = 100_000;

/// All keys matching `pattern`, following the cursor until it returns `0`.
/// Duplicates reported by the backend are removed.
pub async fn scan_keys(store: &dyn KvStore, pattern: &str) -> Result<Vec<String>> {
    let mut cursor = "0".to_string();
    let mut keys = Vec::new();

    for _ in 0..MAX_SCAN_ROUNDS {
        let reply = store
            .execute(Command::Scan {
                cursor: cursor.clone(),
                pattern: pattern.to_string(),
                count: SCAN_COUNT,
            })
            .await?;

        let (next, page) = parse_scan_reply(reply)?;
        keys.extend(page);
        if next == "0" {
            keys.sort();
            keys.dedup();
            debug!(pattern, keys = keys.len(), "Scan complete");
            return Ok(keys);
        }
        cursor = next;
    }

    Err(Error::storage(format!(
        "SCAN for '{}' did not finish after {} rounds",
        pattern, MAX_SCAN_ROUNDS
    )))
}

fn parse_scan_reply(reply: Reply) -> Result<(String, Vec<String>)> {
    let malformed = || Error::storage("malformed SCAN reply");
    let mut parts = reply.into_array().ok_or_else(malformed)?;
    if parts.len() != 2 {
        return Err(malformed());
    }
    let page = parts
        .pop()
        .and_then(Reply::into_array)
        .ok_or_else(malformed)?
        .into_iter()
        .filter_map(Reply::into_string)
        .collect();
    let next = parts.pop().and_then(Reply::into_string).ok_or_else(malformed)?;
    Ok((next, page))
}

/// Integer values of `keys`, in order. Missing or non-numeric values read as 0.
pub async fn mget_counts(store: &dyn KvStore, keys: &[String]) -> Result<Vec<u64>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let commands: Vec<Command> = keys
        .chunks(MGET_CHUNK)
        .map(|chunk| Command::MGet {
            keys: chunk.to_vec(),
        })
        .collect();
    let replies = store.pipeline(commands).await?;
    check_replies(&replies, "MGET failed")?;

    let mut counts = Vec::with_capacity(keys.len());
    for reply in replies {
        let values = reply
            .into_array()
            .ok_or_else(|| Error::storage("malformed MGET reply"))?;
        counts.extend(
            values
                .iter()
                .map(|v| v.as_int().map_or(0, |n| n.max(0) as u64)),
        );
    }

    if counts.len() != keys.len() {
        return Err(Error::storage(format!(
            "MGET returned {} values for {} keys",
            counts.len(),
            keys.len()
        )));
    }
    Ok(counts)
}

/// Delete `keys` in chunks. Returns how many existed.
pub async fn delete_keys(store: &dyn KvStore, keys: &[String], chunk: usize) -> Result<u64> {
    let mut deleted = 0u64;
    for batch in keys.chunks(chunk.max(1)) {
        let reply = store.execute(Command::del(batch.to_vec())).await?;
        deleted += reply.as_int().unwrap_or(0).max(0) as u64;
    }
    Ok(deleted)
}

/// Send `commands` as pipelines of at most `chunk` commands. Any error reply
/// aborts the remaining chunks. Returns the number of commands sent.
pub async fn run_chunked(store: &dyn KvStore, commands: Vec<Command>, chunk: usize) -> Result<usize> {
    let chunk = chunk.max(1);
    let mut sent = 0usize;
    let mut commands = commands.into_iter().peekable();

    while commands.peek().is_some() {
        let batch: Vec<Command> = commands.by_ref().take(chunk).collect();
        let size = batch.len();
        let replies = store.pipeline(batch).await?;
        check_replies(&replies, "write batch failed")?;
        sent += size;
    }
    Ok(sent)
}

/// Take a short-lived lock. `false` when someone else holds it.
pub async fn acquire_lock(store: &dyn KvStore, key: &str, ttl_secs: u64) -> Result<bool> {
    let reply = store
        .execute(Command::set_nx_ex(key, "1", ttl_secs))
        .await?;
    Ok(!reply.is_nil())
}

pub async fn release_lock(store: &dyn KvStore, key: &str) -> Result<()> {
    store.execute(Command::del(vec![key.to_string()])).await?;
    Ok(())
}
