//! Integration tests for [`storage::MessageStore`].
//!
//! Covers idempotent upsert, edit reconciliation, concurrent writers, search conjunction and
//! pagination, aggregates, the scan watermark, the statistics cache and the persistence hook,
//! each on an isolated SQLite file.

mod common;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use common::{fresh_store, message, sender};
use std::sync::Arc;
use storage::{Metric, PersistHook, SearchFilters, StoredMessage};
use tglog_core::MediaKind;
use tokio::sync::mpsc;

/// **Test: Upserting the same record twice keeps one row.**
///
/// **Setup:** Empty store.
/// **Action:** `upsert(record)` twice.
/// **Expected:** One row, equal content, same row id and received_at both times.
#[tokio::test]
async fn test_upsert_is_idempotent() {
    let (_dir, store) = fresh_store().await;
    let record = message(1, 42, Some(sender(10, "alice")), Some("hello"), Utc::now());

    let first = store.upsert(&record).await.expect("first upsert");
    let second = store.upsert(&record).await.expect("second upsert");

    assert_eq!(store.count_messages().await.unwrap(), 1);
    assert_eq!(first.id, second.id);
    assert_eq!(first.received_at, second.received_at);
    assert_eq!(second.text.as_deref(), Some("hello"));
    assert_eq!(second.sender_id, Some(10));
    assert_eq!(second.chat_title.as_deref(), Some("Chat 1"));

    let user = store.get_user(10).await.unwrap().unwrap();
    assert_eq!(user.message_count, 1);
}

/// **Test: An edit re-delivered under the same key updates in place.**
///
/// **Setup:** Upsert `(chat=1, msg=42, text="a")`.
/// **Action:** Upsert `(chat=1, msg=42, text="b", edited=true)`.
/// **Expected:** One row with text "b", is_edited, and the first upsert's received_at.
#[tokio::test]
async fn test_edit_last_write_wins_keeps_received_at() {
    let (_dir, store) = fresh_store().await;
    let at = Utc::now();
    let original = message(1, 42, Some(sender(10, "alice")), Some("a"), at);

    let first = store.upsert(&original).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let mut edited = original.clone();
    edited.text = Some("b".to_string());
    edited.is_edited = true;
    let second = store.upsert(&edited).await.unwrap();

    assert_eq!(store.count_messages().await.unwrap(), 1);
    let row = store.get_message(1, 42).await.unwrap().unwrap();
    assert_eq!(row.text.as_deref(), Some("b"));
    assert!(row.is_edited);
    assert_eq!(row.received_at, first.received_at);
    assert_eq!(second.received_at, first.received_at);
}

/// **Test: Mutable media fields are overwritten, denormalized names survive a sender-less update.**
#[tokio::test]
async fn test_upsert_overwrites_media_and_reply() {
    let (_dir, store) = fresh_store().await;
    let mut record = message(3, 7, Some(sender(11, "bob")), None, Utc::now());
    record.media_kind = MediaKind::Photo;
    record.media_ref = Some("file-1".to_string());
    store.upsert(&record).await.unwrap();

    record.media_kind = MediaKind::None;
    record.media_ref = None;
    record.reply_to_message_id = Some(6);
    record.sender = None;
    let row = store.upsert(&record).await.unwrap();

    assert_eq!(row.media_kind(), MediaKind::None);
    assert_eq!(row.media_ref, None);
    assert_eq!(row.reply_to_message_id, Some(6));
    assert_eq!(row.sender_id, Some(11));
    assert_eq!(row.sender_username.as_deref(), Some("bob"));
}

/// **Test: Concurrent writers on disjoint keys of one chat lose nothing.**
///
/// **Setup:** 40 "live" keys and 40 "backfill" keys in chat 9, plus 10 keys written by both.
/// **Action:** Upsert all of them from spawned tasks concurrently.
/// **Expected:** Exactly 90 rows.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_converge() {
    let (_dir, store) = fresh_store().await;
    let now = Utc::now();

    let mut tasks = Vec::new();
    for producer in 0..2i64 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..40i64 {
                let id = producer * 1000 + i;
                let record = message(9, id, Some(sender(100 + i % 5, "u")), Some("x"), now);
                store.upsert(&record).await.expect("upsert");
            }
            for shared in 0..10i64 {
                let record = message(9, 5000 + shared, Some(sender(7, "s")), Some("y"), now);
                store.upsert(&record).await.expect("upsert shared");
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.count_messages().await.unwrap(), 90);
    assert_eq!(store.get_user(7).await.unwrap().unwrap().message_count, 10);
}

/// **Test: Search filters combine with AND.**
///
/// **Setup:** `{chat=1,"hello world"}`, `{chat=1,"goodbye"}`, `{chat=2,"hello"}`.
/// **Action:** `search(chat=1, text="hello")`.
/// **Expected:** Only the first message.
#[tokio::test]
async fn test_search_conjunction() {
    let (_dir, store) = fresh_store().await;
    let now = Utc::now();
    store
        .upsert(&message(1, 1, None, Some("hello world"), now))
        .await
        .unwrap();
    store
        .upsert(&message(1, 2, None, Some("goodbye"), now))
        .await
        .unwrap();
    store
        .upsert(&message(2, 3, None, Some("hello"), now))
        .await
        .unwrap();

    let found = store
        .search(&SearchFilters::chat(1).with_text("HELLO"), 100, 0)
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!((found[0].chat_id, found[0].message_id), (1, 1));
}

/// **Test: Empty filters return the most recent messages across chats, paginated.**
#[tokio::test]
async fn test_search_global_order_and_pagination() {
    let (_dir, store) = fresh_store().await;
    let base = Utc::now() - Duration::hours(10);
    for i in 0..6i64 {
        let chat = if i % 2 == 0 { 1 } else { 2 };
        store
            .upsert(&message(chat, i, None, Some("m"), base + Duration::minutes(i)))
            .await
            .unwrap();
    }

    let page1 = store.search(&SearchFilters::default(), 4, 0).await.unwrap();
    let page2 = store.search(&SearchFilters::default(), 4, 4).await.unwrap();

    let ids: Vec<i64> = page1.iter().map(|m| m.message_id).collect();
    assert_eq!(ids, vec![5, 4, 3, 2]);
    let ids: Vec<i64> = page2.iter().map(|m| m.message_id).collect();
    assert_eq!(ids, vec![1, 0]);
}

/// **Test: Sender and date range filters.**
#[tokio::test]
async fn test_search_sender_and_dates() {
    let (_dir, store) = fresh_store().await;
    let base = Utc::now() - Duration::days(3);
    let alice = sender(1, "alice");
    let bob = sender(2, "bob");
    store
        .upsert(&message(5, 1, Some(alice.clone()), Some("a1"), base))
        .await
        .unwrap();
    store
        .upsert(&message(5, 2, Some(alice), Some("a2"), base + Duration::days(2)))
        .await
        .unwrap();
    store
        .upsert(&message(5, 3, Some(bob), Some("b1"), base + Duration::days(2)))
        .await
        .unwrap();

    let filters = SearchFilters::chat(5)
        .with_sender(1)
        .between(Some(base + Duration::days(1)), Some(Utc::now()));
    let found = store.search(&filters, 10, 0).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text.as_deref(), Some("a2"));

    let none = store
        .search(&SearchFilters::chat(404), 10, 0)
        .await
        .expect("unknown chat is not an error");
    assert!(none.is_empty());
}

/// **Test: Text search folds case beyond ASCII.**
///
/// **Setup:** Chat 1 holds "Привет мир" and "Hello"; an edit later changes "Hello" to "ПРИВЕТ снова".
/// **Action:** `search(chat=1, text_query="привет")` before and after the edit.
/// **Expected:** One match before the edit, both messages after it.
#[tokio::test]
async fn test_search_text_is_case_insensitive_for_cyrillic() {
    let (_dir, store) = fresh_store().await;
    let at = Utc::now();
    store
        .upsert(&message(1, 1, None, Some("Привет мир"), at))
        .await
        .unwrap();
    let mut hello = message(1, 2, None, Some("Hello"), at);
    store.upsert(&hello).await.unwrap();

    let filters = SearchFilters::chat(1).with_text("привет");
    let found = store.search(&filters, 10, 0).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text.as_deref(), Some("Привет мир"));

    hello.text = Some("ПРИВЕТ снова".to_string());
    hello.is_edited = true;
    store.upsert(&hello).await.unwrap();

    let found = store.search(&filters, 10, 0).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(store
        .search(&SearchFilters::chat(1).with_text("hello"), 10, 0)
        .await
        .unwrap()
        .is_empty());
}

/// **Test: The upper date bound is exclusive and keeps sub-second timestamps.**
///
/// **Setup:** Messages at 23:59:59.500 on Jan 1 and at 00:00:00 on Jan 2.
/// **Action:** Search with `date_to` = start of Jan 2.
/// **Expected:** Only the late Jan 1 message.
#[tokio::test]
async fn test_search_date_to_is_exclusive() {
    let (_dir, store) = fresh_store().await;
    let next_day = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let late = next_day - Duration::milliseconds(500);
    store
        .upsert(&message(3, 1, None, Some("late"), late))
        .await
        .unwrap();
    store
        .upsert(&message(3, 2, None, Some("midnight"), next_day))
        .await
        .unwrap();

    let filters = SearchFilters::chat(3).between(None, Some(next_day));
    let found = store.search(&filters, 10, 0).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text.as_deref(), Some("late"));
}

/// **Test: User activity orders senders by message count.**
///
/// **Setup:** User A with 3 messages, B with 1, plus one A message outside the window.
/// **Action:** `user_activity(chat, 7)`.
/// **Expected:** `[{A,3},{B,1}]`.
#[tokio::test]
async fn test_user_activity_ordering() {
    let (_dir, store) = fresh_store().await;
    let now = Utc::now();
    let a = sender(1, "a");
    let b = sender(2, "b");
    for i in 0..3 {
        store
            .upsert(&message(4, i, Some(a.clone()), Some("x"), now - Duration::hours(i)))
            .await
            .unwrap();
    }
    store
        .upsert(&message(4, 10, Some(b), Some("y"), now))
        .await
        .unwrap();
    store
        .upsert(&message(4, 11, Some(a), Some("old"), now - Duration::days(30)))
        .await
        .unwrap();

    let activity = store.user_activity(4, 7).await.unwrap();

    assert_eq!(activity.len(), 2);
    assert_eq!(activity[0].sender_id, Some(1));
    assert_eq!(activity[0].message_count, 3);
    assert_eq!(activity[0].sender_username.as_deref(), Some("a"));
    assert_eq!(activity[1].sender_id, Some(2));
    assert_eq!(activity[1].message_count, 1);
}

/// **Test: Chat statistics, including a chat without messages.**
#[tokio::test]
async fn test_chat_statistics() {
    let (_dir, store) = fresh_store().await;
    let first = Utc::now() - Duration::days(2);
    let last = Utc::now();
    store
        .upsert(&message(8, 1, Some(sender(1, "a")), Some("x"), first))
        .await
        .unwrap();
    store
        .upsert(&message(8, 2, Some(sender(2, "b")), Some("y"), last))
        .await
        .unwrap();
    store
        .upsert(&message(8, 3, Some(sender(1, "a")), Some("z"), first + Duration::days(1)))
        .await
        .unwrap();

    let stats = store.chat_statistics(8).await.unwrap();
    assert_eq!(stats.total_messages, 3);
    assert_eq!(stats.distinct_senders, 2);
    assert_eq!(stats.first_message_at, Some(first));
    assert_eq!(stats.last_message_at, Some(last));

    let empty = store.chat_statistics(999).await.unwrap();
    assert_eq!(empty.total_messages, 0);
    assert_eq!(empty.distinct_senders, 0);
    assert!(empty.first_message_at.is_none());
    assert!(empty.last_message_at.is_none());
}

/// **Test: Daily buckets count messages per UTC day.**
#[tokio::test]
async fn test_daily_activity() {
    let (_dir, store) = fresh_store().await;
    let today = Utc::now();
    let yesterday = today - Duration::days(1);
    store.upsert(&message(6, 1, None, None, yesterday)).await.unwrap();
    store.upsert(&message(6, 2, None, None, today)).await.unwrap();
    store.upsert(&message(6, 3, None, None, today)).await.unwrap();

    let days = store.daily_activity(6, 3).await.unwrap();

    assert_eq!(days.len(), 2);
    assert_eq!(days[0].day, yesterday.date_naive());
    assert_eq!(days[0].message_count, 1);
    assert_eq!(days[1].day, today.date_naive());
    assert_eq!(days[1].message_count, 2);
}

/// **Test: Groups and users are created lazily and refreshed.**
#[tokio::test]
async fn test_group_and_user_records() {
    let (_dir, store) = fresh_store().await;
    let early = Utc::now() - Duration::days(5);
    let late = Utc::now();
    store
        .upsert(&message(3, 2, Some(sender(50, "carol")), Some("late"), late))
        .await
        .unwrap();
    let mut older = message(3, 1, Some(sender(50, "carol")), Some("early"), early);
    older.chat.title = None;
    store.upsert(&older).await.unwrap();

    let group = store.get_group(3).await.unwrap().unwrap();
    assert_eq!(group.title.as_deref(), Some("Chat 3"));
    assert!(group.is_group);
    assert!(group.last_scanned_at.is_none());

    let user = store.get_user(50).await.unwrap().unwrap();
    assert_eq!(user.message_count, 2);
    assert_eq!(user.first_seen_at, early);
    assert_eq!(user.last_seen_at, late);

    assert_eq!(store.list_groups().await.unwrap().len(), 1);
    assert!(store.get_user(51).await.unwrap().is_none());
}

/// **Test: Scan watermark round trip, also for a chat without messages.**
#[tokio::test]
async fn test_scan_watermark() {
    let (_dir, store) = fresh_store().await;
    assert!(store.last_scanned_at(77).await.unwrap().is_none());

    let at = Utc::now();
    store.mark_scanned(77, at).await.unwrap();

    assert_eq!(store.last_scanned_at(77).await.unwrap(), Some(at));
}

/// **Test: Statistics snapshots are recomputed on refresh.**
#[tokio::test]
async fn test_statistics_cache_refresh() {
    let (_dir, store) = fresh_store().await;
    assert!(store.refresh_statistics(12).await.unwrap().is_empty());

    store
        .upsert(&message(12, 1, Some(sender(1, "a")), Some("x"), Utc::now()))
        .await
        .unwrap();
    store.refresh_statistics(12).await.unwrap();
    let total = store
        .statistic_snapshot(12, Metric::TotalMessages)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(total.metric_value, 1);

    store
        .upsert(&message(12, 2, Some(sender(2, "b")), Some("y"), Utc::now()))
        .await
        .unwrap();
    let stale = store
        .statistic_snapshot(12, Metric::TotalMessages)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stale.metric_value, 1);

    let refreshed = store.refresh_statistics(12).await.unwrap();
    assert_eq!(refreshed.len(), 2);
    let senders = store
        .statistic_snapshot(12, Metric::DistinctSenders)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(senders.metric_value, 2);
}

struct ChannelHook {
    tx: mpsc::UnboundedSender<(i64, i64)>,
}

#[async_trait]
impl PersistHook for ChannelHook {
    async fn on_persisted(&self, message: &StoredMessage) -> anyhow::Result<()> {
        let _ = self.tx.send((message.chat_id, message.message_id));
        Ok(())
    }
}

struct FailingHook;

#[async_trait]
impl PersistHook for FailingHook {
    async fn on_persisted(&self, _message: &StoredMessage) -> anyhow::Result<()> {
        anyhow::bail!("downstream consumer is down")
    }
}

/// **Test: The hook observes each committed upsert.**
#[tokio::test]
async fn test_persist_hook_notified() {
    let (_dir, store) = fresh_store().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let store = store.with_hook(Arc::new(ChannelHook { tx }));

    store
        .upsert(&message(1, 5, None, Some("x"), Utc::now()))
        .await
        .unwrap();

    let seen = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("hook not called")
        .unwrap();
    assert_eq!(seen, (1, 5));
}

/// **Test: A failing hook does not fail or roll back the upsert.**
#[tokio::test]
async fn test_failing_hook_does_not_affect_upsert() {
    let (_dir, store) = fresh_store().await;
    let store = store.with_hook(Arc::new(FailingHook));

    store
        .upsert(&message(1, 6, None, Some("x"), Utc::now()))
        .await
        .expect("upsert must succeed despite hook failure");
    tokio::task::yield_now().await;

    assert!(store.get_message(1, 6).await.unwrap().is_some());
}

/// **Test: A closed store reports StoreUnavailable, not "not found".**
#[tokio::test]
async fn test_closed_store_is_unavailable() {
    let (_dir, store) = fresh_store().await;
    store.close().await;

    let err = store
        .upsert(&message(1, 1, None, None, Utc::now()))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}
