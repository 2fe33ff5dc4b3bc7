//! Append-only raw event log, one stream per day.

use engine_core::keys::raw_log_key;
use engine_core::{Error, RawEventRecord, Result};

use crate::command::{Command, Reply, StreamId};
use crate::store::KvStore;

/// A record with its log position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogEntry {
    pub id: StreamId,
    pub record: RawEventRecord,
}

/// XADD plus EXPIRE for one record, meant to ride inside the ingestion batch.
pub fn append_commands(day: &str, record: &RawEventRecord, ttl_secs: u64) -> [Command; 2] {
    let key = raw_log_key(day);
    [
        Command::XAdd {
            key: key.clone(),
            fields: record.to_fields(),
        },
        Command::expire(key, ttl_secs),
    ]
}

/// One page of entries strictly after `after` (or from the start).
pub async fn read_page(
    store: &dyn KvStore,
    day: &str,
    after: Option<&StreamId>,
    count: usize,
) -> Result<Vec<RawLogEntry>> {
    let start = after.map_or_else(|| "-".to_string(), StreamId::exclusive);
    let reply = store
        .execute(Command::XRange {
            key: raw_log_key(day),
            start,
            end: "+".to_string(),
            count,
        })
        .await?;

    reply
        .into_array()
        .ok_or_else(|| Error::storage("malformed XRANGE reply"))?
        .into_iter()
        .map(parse_entry)
        .collect()
}

/// Every record of `day`, in log order.
pub async fn read_day(store: &dyn KvStore, day: &str, page_size: usize) -> Result<Vec<RawEventRecord>> {
    let page_size = page_size.max(1);
    let mut records = Vec::new();
    let mut cursor: Option<StreamId> = None;

    loop {
        let page = read_page(store, day, cursor.as_ref(), page_size).await?;
        let fetched = page.len();

        for entry in page {
            if cursor.is_some_and(|c| entry.id <= c) {
                return Err(Error::storage(format!(
                    "raw log for {} returned out-of-order id {}",
                    day, entry.id
                )));
            }
            cursor = Some(entry.id);
            records.push(entry.record);
        }

        if fetched < page_size {
            return Ok(records);
        }
    }
}

fn parse_entry(reply: Reply) -> Result<RawLogEntry> {
    let malformed = || Error::storage("malformed raw log entry");
    let mut parts = reply.into_array().ok_or_else(malformed)?.into_iter();
    let id = parts
        .next()
        .and_then(Reply::into_string)
        .and_then(|s| StreamId::parse(&s))
        .ok_or_else(malformed)?;
    let flat = parts.next().and_then(Reply::into_array).ok_or_else(malformed)?;

    let mut values = flat.into_iter().map(|r| r.into_string().unwrap_or_default());
    let mut fields = Vec::new();
    while let (Some(name), Some(value)) = (values.next(), values.next()) {
        fields.push((name, value));
    }

    Ok(RawLogEntry {
        id,
        record: RawEventRecord::from_fields(fields),
    })
}
