//! Store health checks.

use tracing::{debug, error};

use crate::command::Command;
use crate::store::KvStore;

/// Check store connectivity with a PING.
pub async fn check_connection(store: &dyn KvStore) -> bool {
    match store.execute(Command::Ping).await {
        Ok(_) => {
            debug!(backend = store.backend(), "Store connection healthy");
            true
        }
        Err(e) => {
            error!(backend = store.backend(), "Store health check failed: {}", e);
            false
        }
    }
}
