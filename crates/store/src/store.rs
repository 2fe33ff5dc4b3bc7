//! The store contract shared by every backend.

use async_trait::async_trait;
use engine_core::{Error, Result};
use std::sync::Arc;

use crate::command::{Command, Reply};

/// Shared handle to a store backend.
pub type SharedStore = Arc<dyn KvStore>;

/// A pipelined key-value and log store.
///
/// `pipeline` returns one reply per command, in order. A per-command failure
/// is a [`Reply::Error`]; transport failures are `Err`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>>;

    /// Execute the commands as one atomic unit.
    async fn transaction(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.pipeline(commands).await
    }

    /// Backend name for health output and logs.
    fn backend(&self) -> &'static str;

    /// Run a single command, mapping an error reply to `Err`.
    async fn execute(&self, command: Command) -> Result<Reply> {
        let name = command.name();
        let mut replies = self.pipeline(vec![command]).await?;
        replies
            .pop()
            .ok_or_else(|| Error::storage(format!("{} returned no reply", name)))?
            .into_result(name)
    }
}

/// First error reply in a batch, as a storage error.
pub fn check_replies(replies: &[Reply], context: &str) -> Result<()> {
    match replies.iter().find_map(|r| match r {
        Reply::Error(message) => Some(message),
        _ => None,
    }) {
        Some(message) => Err(Error::storage(format!("{}: {}", context, message))),
        None => Ok(()),
    }
}
