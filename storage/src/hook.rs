//! Notification hook invoked after each successful upsert.
//!
//! Downstream consumers (indexers, trainers) implement [`PersistHook`]; the store calls it on a
//! detached task so the hook can neither delay nor roll back the write.

use crate::models::StoredMessage;
use async_trait::async_trait;

#[async_trait]
pub trait PersistHook: Send + Sync {
    async fn on_persisted(&self, message: &StoredMessage) -> anyhow::Result<()>;
}
