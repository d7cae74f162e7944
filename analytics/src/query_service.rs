use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use storage::{
    ChatStatistics, DailyCount, MessageStore, Metric, StatisticSnapshot, StoreError, UserActivity,
};
use tracing::{debug, instrument};

/// Trailing window used by [`QueryService::top_users`].
pub const TOP_USERS_WINDOW_DAYS: u32 = 7;

/// Activity of one chat over a trailing window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTimeline {
    pub chat_id: i64,
    pub days: u32,
    /// Highest message count first.
    pub per_user: Vec<UserActivity>,
    /// Oldest day first; days without messages are absent.
    pub per_day: Vec<DailyCount>,
}

#[derive(Clone)]
pub struct QueryService {
    store: MessageStore,
}

impl QueryService {
    pub fn new(store: MessageStore) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn activity_timeline(
        &self,
        chat_id: i64,
        days: u32,
    ) -> Result<ActivityTimeline, StoreError> {
        let per_user = self.store.user_activity(chat_id, days).await?;
        let per_day = self.store.daily_activity(chat_id, days).await?;
        Ok(ActivityTimeline {
            chat_id,
            days,
            per_user,
            per_day,
        })
    }

    /// Most active senders of the last [`TOP_USERS_WINDOW_DAYS`] days.
    pub async fn top_users(
        &self,
        chat_id: i64,
        limit: usize,
    ) -> Result<Vec<UserActivity>, StoreError> {
        let mut activity = self
            .store
            .user_activity(chat_id, TOP_USERS_WINDOW_DAYS)
            .await?;
        activity.truncate(limit);
        Ok(activity)
    }

    pub async fn chat_statistics(&self, chat_id: i64) -> Result<ChatStatistics, StoreError> {
        self.store.chat_statistics(chat_id).await
    }

    /// Cached metric value, recomputed when missing or older than `max_age`.
    /// `None` for a chat the store has never seen.
    pub async fn cached_metric(
        &self,
        chat_id: i64,
        metric: Metric,
        max_age: Duration,
    ) -> Result<Option<StatisticSnapshot>, StoreError> {
        if let Some(snapshot) = self.store.statistic_snapshot(chat_id, metric).await? {
            if Utc::now() - snapshot.calculated_at <= max_age {
                return Ok(Some(snapshot));
            }
            debug!(chat_id, metric = metric.name(), "Cached metric is stale");
        }

        let refreshed = self.store.refresh_statistics(chat_id).await?;
        Ok(refreshed
            .into_iter()
            .find(|s| s.metric_name == metric.name()))
    }
}
