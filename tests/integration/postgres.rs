//! Postgres store and LISTEN/NOTIFY transport
//!
//! Ignored by default; requires `DATABASE_URL` pointing at a disposable
//! database.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use xfpulse::backend::messaging::{PgRecordStore, RecordStore};
use xfpulse::backend::RealtimeError;
use xfpulse::backend::realtime::{
    NotifyTransport, PgPublisher, PgTransport, Publisher, TransportConnection,
};
use xfpulse::shared::{ConversationIdentity, DraftRecord, NotificationPayload, Watermark};

use crate::assert_ok;
use crate::common::{cleanup_test_data, create_test_pool};

#[tokio::test]
#[ignore]
#[serial]
async fn test_pg_store_orders_and_filters() {
    let pool = create_test_pool().await;
    assert_ok!(cleanup_test_data(&pool).await);
    let store = PgRecordStore::new(pool);
    let conversation = ConversationIdentity::direct("pg-c1");

    let first = assert_ok!(store.append(DraftRecord::new(conversation.clone(), "a", "one")).await);
    let second = assert_ok!(store.append(DraftRecord::new(conversation.clone(), "b", "two")).await);
    assert_ok!(store.append(DraftRecord::new(ConversationIdentity::group("pg-c1"), "c", "other")).await);

    let all = assert_ok!(store.records_after(&conversation, Watermark::BEGINNING).await);
    assert_eq!(all, vec![first.clone(), second.clone()]);

    let newer = assert_ok!(store.records_after(&conversation, Watermark::at(first.created_at)).await);
    assert_eq!(newer, vec![second.clone()]);

    let latest = assert_ok!(store.latest(&conversation, 1).await);
    assert_eq!(latest, vec![second]);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_pg_publish_reaches_listener() {
    let pool = create_test_pool().await;
    let transport = PgTransport::new(pool.clone());
    let mut listener = assert_ok!(transport.connect().await);
    assert_ok!(listener.listen("private_pg_2dc1").await);

    let publisher = Publisher::new(Arc::new(PgPublisher::new(pool)));
    let conversation = ConversationIdentity::direct("pg-c1");
    let record_id = uuid::Uuid::new_v4();
    assert!(publisher.publish(&conversation, record_id).await);

    let notification = assert_ok!(
        assert_ok!(tokio::time::timeout(Duration::from_secs(5), listener.recv()).await)
    );
    let payload = assert_ok!(NotificationPayload::decode(&notification.payload));
    assert_eq!(payload.record_id, record_id);
    assert_ok!(listener.ping().await);
    listener.close().await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_pg_trigger_publishes_inside_insert() {
    let pool = create_test_pool().await;
    assert_ok!(cleanup_test_data(&pool).await);
    let store = PgRecordStore::new(pool.clone());
    assert_ok!(store.install_notify_trigger().await);

    let transport = PgTransport::new(pool);
    let mut listener = assert_ok!(transport.connect().await);
    assert_ok!(listener.listen("group_pgteam").await);

    let record = assert_ok!(
        store
            .append(DraftRecord::new(ConversationIdentity::group("pgteam"), "a", "hi"))
            .await
    );
    let notification = assert_ok!(
        assert_ok!(tokio::time::timeout(Duration::from_secs(5), listener.recv()).await)
    );
    let payload = assert_ok!(NotificationPayload::decode(&notification.payload));
    assert_eq!(payload.record_id, record.id);
    assert_eq!(payload.conversation(), ConversationIdentity::group("pgteam"));

    assert_ok!(store.remove_notify_trigger().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
#[serial]
async fn test_pg_poll_sees_every_concurrent_append() {
    let pool = create_test_pool().await;
    assert_ok!(cleanup_test_data(&pool).await);
    let store = Arc::new(PgRecordStore::new(pool));
    let conversation = ConversationIdentity::group("pg-race");

    let writers: Vec<_> = (0..6)
        .map(|writer| {
            let store = Arc::clone(&store);
            let conversation = conversation.clone();
            tokio::spawn(async move {
                let mut ids = Vec::new();
                for i in 0..20 {
                    let draft = DraftRecord::new(conversation.clone(), format!("w{}", writer), i.to_string());
                    ids.push(store.append(draft).await?.id);
                }
                Ok::<_, RealtimeError>(ids)
            })
        })
        .collect();

    let mut watermark = Watermark::BEGINNING;
    let mut seen = Vec::new();
    loop {
        let done = writers.iter().all(|w| w.is_finished());
        let batch = assert_ok!(store.records_after(&conversation, watermark).await);
        if let Some(last) = batch.last() {
            watermark.advance_to(last.created_at);
        }
        seen.extend(batch.into_iter().map(|r| r.id));
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let mut written = HashSet::new();
    for writer in writers {
        written.extend(assert_ok!(assert_ok!(writer.await)));
    }
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len(), "a record was polled twice");
    assert_eq!(unique, written);
}
