//! Message store: idempotent upsert by natural key, search and aggregate queries.
//!
//! Uses SqlitePoolManager and the models (StoredMessage, GroupRecord, UserRecord, aggregates).
//! Every write is a short transaction of `INSERT .. ON CONFLICT .. DO UPDATE` statements keyed on
//! the table's unique natural key, so concurrent producers never create duplicate rows.

use crate::error::StoreError;
use crate::hook::PersistHook;
use crate::models::{
    ChatStatistics, DailyCount, GroupRecord, Metric, SearchFilters, StatisticSnapshot,
    StoredMessage, UserActivity, UserRecord,
};
use crate::sqlite_pool::SqlitePoolManager;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;
use tglog_core::{CanonicalMessage, MediaKind};
use tracing::{debug, info, instrument, warn};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone)]
pub struct MessageStore {
    pool_manager: SqlitePoolManager,
    hook: Option<Arc<dyn PersistHook>>,
}

impl MessageStore {
    /// Opens the store with the default pool size.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        Self::open(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Opens (creating if missing) the database and ensures the schema exists.
    pub async fn open(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool_manager = SqlitePoolManager::new(database_url, max_connections).await?;
        let store = Self {
            pool_manager,
            hook: None,
        };
        store.init().await?;
        Ok(store)
    }

    /// Registers a notification hook run after every committed upsert.
    pub fn with_hook(mut self, hook: Arc<dyn PersistHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Drains and closes the pool. Clones of this store share the pool and are closed too.
    pub async fn close(&self) {
        info!("Closing message store");
        self.pool_manager.close().await;
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        self.pool_manager.pool()
    }

    async fn init(&self) -> Result<(), StoreError> {
        info!("Creating database tables if not exist");

        let pool = self.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS "groups" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL UNIQUE,
                title TEXT,
                username TEXT,
                is_channel INTEGER NOT NULL DEFAULT 0,
                is_group INTEGER NOT NULL DEFAULT 0,
                members_count INTEGER,
                added_at TEXT NOT NULL,
                last_scanned_at TEXT
            );
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                is_bot INTEGER NOT NULL DEFAULT 0,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                group_ref INTEGER REFERENCES "groups"(id),
                sender_ref INTEGER REFERENCES users(id),
                chat_title TEXT,
                sender_id INTEGER,
                sender_username TEXT,
                sender_first_name TEXT,
                sender_last_name TEXT,
                text TEXT,
                text_folded TEXT,
                is_edited INTEGER NOT NULL DEFAULT 0,
                media_type TEXT,
                media_ref TEXT,
                reply_to_message_id INTEGER,
                message_timestamp TEXT,
                received_at TEXT NOT NULL,
                UNIQUE (chat_id, message_id)
            );
            CREATE TABLE IF NOT EXISTS statistics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_ref INTEGER NOT NULL REFERENCES "groups"(id),
                metric_name TEXT NOT NULL,
                metric_value INTEGER NOT NULL,
                calculated_at TEXT NOT NULL,
                UNIQUE (group_ref, metric_name)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_id, message_timestamp);
            CREATE INDEX IF NOT EXISTS idx_messages_sender_ts ON messages(sender_id, message_timestamp);
            CREATE INDEX IF NOT EXISTS idx_messages_sender_ref ON messages(sender_ref);
            CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(message_timestamp);
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
            "#,
        )
        .execute(pool)
        .await?;

        self.fold_legacy_text().await?;

        info!("Database tables created successfully");
        Ok(())
    }

    /// Adds `text_folded` to databases created without it and fills it for existing rows.
    async fn fold_legacy_text(&self) -> Result<(), StoreError> {
        let pool = self.pool();
        let (has_column,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pragma_table_info('messages') WHERE name = 'text_folded'",
        )
        .fetch_one(pool)
        .await?;
        if has_column == 0 {
            info!("step: adding text_folded column to messages");
            sqlx::query("ALTER TABLE messages ADD COLUMN text_folded TEXT")
                .execute(pool)
                .await?;
        }

        let pending: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, text FROM messages WHERE text IS NOT NULL AND text_folded IS NULL",
        )
        .fetch_all(pool)
        .await?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await?;
        for (id, text) in &pending {
            sqlx::query("UPDATE messages SET text_folded = ? WHERE id = ?")
                .bind(text.to_lowercase())
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!(rows = pending.len(), "step: folded text of existing messages");
        Ok(())
    }

    /// Inserts the message or updates its mutable fields in place, keyed by `(chat_id, message_id)`.
    ///
    /// Also creates or refreshes the owning group and the sender. `received_at` is set on first
    /// insert only. The whole write commits atomically; the hook (if any) runs afterwards on a
    /// detached task.
    pub async fn upsert(&self, record: &CanonicalMessage) -> Result<StoredMessage, StoreError> {
        let now = Utc::now();
        let seen_at = record.message_timestamp.unwrap_or(now);
        let chat = &record.chat;

        let mut tx = self.pool().begin().await?;

        let group_ref: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO "groups" (chat_id, title, username, is_channel, is_group, members_count, added_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                title = COALESCE(excluded.title, "groups".title),
                username = COALESCE(excluded.username, "groups".username),
                is_channel = MAX(excluded.is_channel, "groups".is_channel),
                is_group = MAX(excluded.is_group, "groups".is_group),
                members_count = COALESCE(excluded.members_count, "groups".members_count)
            RETURNING id
            "#,
        )
        .bind(chat.chat_id)
        .bind(&chat.title)
        .bind(&chat.username)
        .bind(chat.is_channel)
        .bind(chat.is_group)
        .bind(chat.members_count)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let sender_ref: Option<i64> = match &record.sender {
            Some(sender) => Some(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO users (user_id, username, first_name, last_name, is_bot, first_seen_at, last_seen_at, message_count)
                    VALUES (?, ?, ?, ?, ?, ?, ?, 0)
                    ON CONFLICT(user_id) DO UPDATE SET
                        username = COALESCE(excluded.username, users.username),
                        first_name = COALESCE(excluded.first_name, users.first_name),
                        last_name = COALESCE(excluded.last_name, users.last_name),
                        is_bot = excluded.is_bot,
                        first_seen_at = MIN(users.first_seen_at, excluded.first_seen_at),
                        last_seen_at = MAX(users.last_seen_at, excluded.last_seen_at)
                    RETURNING id
                    "#,
                )
                .bind(sender.user_id)
                .bind(&sender.username)
                .bind(&sender.first_name)
                .bind(&sender.last_name)
                .bind(sender.is_bot)
                .bind(seen_at)
                .bind(seen_at)
                .fetch_one(&mut *tx)
                .await?,
            ),
            None => None,
        };

        let media_type = match record.media_kind {
            MediaKind::None => None,
            kind => Some(kind.as_str()),
        };
        let sender = record.sender.as_ref();

        let stored: StoredMessage = sqlx::query_as(
            r#"
            INSERT INTO messages (
                message_id, chat_id, group_ref, sender_ref, chat_title,
                sender_id, sender_username, sender_first_name, sender_last_name,
                text, text_folded, is_edited, media_type, media_ref, reply_to_message_id,
                message_timestamp, received_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chat_id, message_id) DO UPDATE SET
                group_ref = excluded.group_ref,
                sender_ref = COALESCE(excluded.sender_ref, messages.sender_ref),
                chat_title = COALESCE(excluded.chat_title, messages.chat_title),
                sender_id = COALESCE(excluded.sender_id, messages.sender_id),
                sender_username = COALESCE(excluded.sender_username, messages.sender_username),
                sender_first_name = COALESCE(excluded.sender_first_name, messages.sender_first_name),
                sender_last_name = COALESCE(excluded.sender_last_name, messages.sender_last_name),
                text = excluded.text,
                text_folded = excluded.text_folded,
                is_edited = excluded.is_edited,
                media_type = excluded.media_type,
                media_ref = excluded.media_ref,
                reply_to_message_id = excluded.reply_to_message_id,
                message_timestamp = COALESCE(excluded.message_timestamp, messages.message_timestamp)
            RETURNING *
            "#,
        )
        .bind(record.message_id)
        .bind(chat.chat_id)
        .bind(group_ref)
        .bind(sender_ref)
        .bind(&chat.title)
        .bind(sender.map(|s| s.user_id))
        .bind(sender.and_then(|s| s.username.clone()))
        .bind(sender.and_then(|s| s.first_name.clone()))
        .bind(sender.and_then(|s| s.last_name.clone()))
        .bind(&record.text)
        .bind(record.text.as_deref().map(str::to_lowercase))
        .bind(record.is_edited)
        .bind(media_type)
        .bind(&record.media_ref)
        .bind(record.reply_to_message_id)
        .bind(record.message_timestamp)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // Recount instead of incrementing so re-delivered messages are not counted twice.
        if let Some(sender_ref) = sender_ref {
            sqlx::query(
                "UPDATE users SET message_count = (SELECT COUNT(*) FROM messages WHERE sender_ref = ?) WHERE id = ?",
            )
            .bind(sender_ref)
            .bind(sender_ref)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            chat_id = stored.chat_id,
            message_id = stored.message_id,
            row_id = stored.id,
            is_edited = stored.is_edited,
            "Upserted message"
        );

        if let Some(hook) = &self.hook {
            let hook = Arc::clone(hook);
            let message = stored.clone();
            tokio::spawn(async move {
                if let Err(e) = hook.on_persisted(&message).await {
                    warn!(
                        error = %e,
                        chat_id = message.chat_id,
                        message_id = message.message_id,
                        "Persist hook failed"
                    );
                }
            });
        }

        Ok(stored)
    }

    /// Filtered search, newest first. Filters combine with AND; no filters returns the most
    /// recent messages across all chats.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        filters: &SearchFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM messages WHERE 1=1");

        if let Some(chat_id) = filters.chat_id {
            qb.push(" AND chat_id = ").push_bind(chat_id);
        }
        if let Some(text) = filters.text_query.as_deref().filter(|t| !t.is_empty()) {
            // SQLite lower() folds ASCII only; match against the Unicode-folded copy instead.
            qb.push(" AND instr(text_folded, ")
                .push_bind(text.to_lowercase())
                .push(") > 0");
        }
        if let Some(sender_id) = filters.sender_id {
            qb.push(" AND sender_id = ").push_bind(sender_id);
        }
        if let Some(from) = filters.date_from {
            qb.push(" AND message_timestamp >= ").push_bind(from);
        }
        if let Some(to) = filters.date_to {
            qb.push(" AND message_timestamp < ").push_bind(to);
        }

        qb.push(" ORDER BY message_timestamp DESC, id DESC LIMIT ")
            .push_bind(limit.max(0))
            .push(" OFFSET ")
            .push_bind(offset.max(0));

        let messages = qb
            .build_query_as::<StoredMessage>()
            .fetch_all(self.pool())
            .await?;

        info!("Found {} messages", messages.len());
        Ok(messages)
    }

    /// Per-sender message counts within the trailing `window_days`, highest count first.
    pub async fn user_activity(
        &self,
        chat_id: i64,
        window_days: u32,
    ) -> Result<Vec<UserActivity>, StoreError> {
        let since = Utc::now() - Duration::days(i64::from(window_days));

        let activity = sqlx::query_as::<_, UserActivity>(
            r#"
            SELECT sender_id,
                   MAX(sender_username) AS sender_username,
                   COUNT(*) AS message_count,
                   MAX(message_timestamp) AS last_message_at
            FROM messages
            WHERE chat_id = ? AND message_timestamp >= ?
            GROUP BY sender_id
            ORDER BY message_count DESC, last_message_at DESC
            "#,
        )
        .bind(chat_id)
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        info!(
            chat_id,
            window_days,
            senders = activity.len(),
            "Computed user activity"
        );
        Ok(activity)
    }

    /// Totals for one chat; zeros and `None` when the chat has no messages.
    pub async fn chat_statistics(&self, chat_id: i64) -> Result<ChatStatistics, StoreError> {
        let (total_messages, distinct_senders, first_message_at, last_message_at): (
            i64,
            i64,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT sender_id), MIN(message_timestamp), MAX(message_timestamp)
            FROM messages
            WHERE chat_id = ?
            "#,
        )
        .bind(chat_id)
        .fetch_one(self.pool())
        .await?;

        Ok(ChatStatistics {
            total_messages,
            distinct_senders,
            first_message_at,
            last_message_at,
        })
    }

    /// Message counts per UTC day within the trailing `window_days`, oldest day first.
    pub async fn daily_activity(
        &self,
        chat_id: i64,
        window_days: u32,
    ) -> Result<Vec<DailyCount>, StoreError> {
        let since = Utc::now() - Duration::days(i64::from(window_days));

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT substr(message_timestamp, 1, 10) AS day, COUNT(*)
            FROM messages
            WHERE chat_id = ? AND message_timestamp >= ?
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(chat_id)
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(day, message_count)| {
                NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map(|day| DailyCount { day, message_count })
                    .map_err(|e| StoreError::Decode(format!("bad day bucket {day:?}: {e}")))
            })
            .collect()
    }

    pub async fn get_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<StoredMessage>, StoreError> {
        let message = sqlx::query_as::<_, StoredMessage>(
            "SELECT * FROM messages WHERE chat_id = ? AND message_id = ?",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(message)
    }

    pub async fn count_messages(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    pub async fn get_group(&self, chat_id: i64) -> Result<Option<GroupRecord>, StoreError> {
        let group = sqlx::query_as::<_, GroupRecord>(r#"SELECT * FROM "groups" WHERE chat_id = ?"#)
            .bind(chat_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(group)
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, StoreError> {
        let groups = sqlx::query_as::<_, GroupRecord>(
            r#"SELECT * FROM "groups" ORDER BY title IS NULL, title, chat_id"#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(groups)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    /// Records a completed backfill of `chat_id`, creating the group row if no message created it.
    pub async fn mark_scanned(&self, chat_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO "groups" (chat_id, added_at, last_scanned_at)
            VALUES (?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET last_scanned_at = excluded.last_scanned_at
            "#,
        )
        .bind(chat_id)
        .bind(at)
        .bind(at)
        .execute(self.pool())
        .await?;

        info!(chat_id, last_scanned_at = %at, "Updated scan watermark");
        Ok(())
    }

    /// Backfill watermark of `chat_id`, if a scan ever completed.
    pub async fn last_scanned_at(&self, chat_id: i64) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as(r#"SELECT last_scanned_at FROM "groups" WHERE chat_id = ?"#)
                .bind(chat_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.and_then(|(at,)| at))
    }

    /// Recomputes every cached metric of `chat_id`. Empty for a chat the store has never seen.
    pub async fn refresh_statistics(
        &self,
        chat_id: i64,
    ) -> Result<Vec<StatisticSnapshot>, StoreError> {
        let Some(group) = self.get_group(chat_id).await? else {
            return Ok(Vec::new());
        };
        let stats = self.chat_statistics(chat_id).await?;
        let now = Utc::now();

        let mut snapshots = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let value = match metric {
                Metric::TotalMessages => stats.total_messages,
                Metric::DistinctSenders => stats.distinct_senders,
            };
            let snapshot = sqlx::query_as::<_, StatisticSnapshot>(
                r#"
                INSERT INTO statistics (group_ref, metric_name, metric_value, calculated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(group_ref, metric_name) DO UPDATE SET
                    metric_value = excluded.metric_value,
                    calculated_at = excluded.calculated_at
                RETURNING group_ref, metric_name, metric_value, calculated_at
                "#,
            )
            .bind(group.id)
            .bind(metric.name())
            .bind(value)
            .bind(now)
            .fetch_one(self.pool())
            .await?;
            snapshots.push(snapshot);
        }

        info!(chat_id, metrics = snapshots.len(), "Refreshed statistics");
        Ok(snapshots)
    }

    pub async fn statistic_snapshot(
        &self,
        chat_id: i64,
        metric: Metric,
    ) -> Result<Option<StatisticSnapshot>, StoreError> {
        let snapshot = sqlx::query_as::<_, StatisticSnapshot>(
            r#"
            SELECT s.group_ref, s.metric_name, s.metric_value, s.calculated_at
            FROM statistics s
            JOIN "groups" g ON g.id = s.group_ref
            WHERE g.chat_id = ? AND s.metric_name = ?
            "#,
        )
        .bind(chat_id)
        .bind(metric.name())
        .fetch_optional(self.pool())
        .await?;
        Ok(snapshot)
    }
}
