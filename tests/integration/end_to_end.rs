//! Write -> push/poll -> consumer, over the in-memory stack

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use xfpulse::backend::messaging::RecordStore;
use xfpulse::backend::realtime::{
    ConsumerEvent, ConsumerState, NotifyTransport, ReconciliationPoller, TransportConnection,
    ViewHandle,
};
use xfpulse::shared::{
    ChatRecord, ConversationIdentity, ConversationTimeline, NotificationPayload, PublishMode,
    Watermark,
};

use crate::common::{Harness, EVENTUALLY_TIMEOUT};
use crate::assert_ok;

async fn next_event(events: &mut mpsc::UnboundedReceiver<ConsumerEvent>) -> ConsumerEvent {
    tokio::time::timeout(EVENTUALLY_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a consumer event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_write_publish_and_poll_scenario() {
    let harness = Harness::new();
    let conversation = ConversationIdentity::direct("c1");

    let mut observer = assert_ok!(harness.transport.connect().await);
    assert_ok!(observer.listen("private_c1").await);

    let m0 = harness.send(&conversation, "m0").await;
    let t0 = Watermark::at(m0.created_at);
    let _ = assert_ok!(observer.recv().await);

    let batches = Arc::new(Mutex::new(Vec::<Vec<ChatRecord>>::new()));
    let sink = Arc::clone(&batches);
    let mut poller = ReconciliationPoller::new(
        ViewHandle::new(1),
        conversation.clone(),
        harness.store.clone(),
        t0,
        move |_, batch| {
            sink.lock().unwrap().push(batch);
            Ok(())
        },
    );

    let m1 = harness.send(&conversation, "m1").await;
    assert!(m1.created_at > m0.created_at);

    let pushed = assert_ok!(observer.recv().await);
    assert_eq!(pushed.channel, "private_c1");
    let payload = assert_ok!(NotificationPayload::decode(&pushed.payload));
    assert_eq!(payload.record_id, m1.id);
    assert_eq!(payload.conversation(), conversation);

    let first = assert_ok!(poller.tick().await);
    assert_eq!(first, vec![m1.clone()]);
    assert_eq!(poller.watermark(), Watermark::at(m1.created_at));

    let second = assert_ok!(poller.tick().await);
    assert!(second.is_empty());
    assert_eq!(poller.watermark(), Watermark::at(m1.created_at));
    assert_eq!(batches.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_push_path_signals_refresh() {
    let mut harness = Harness::new();
    harness.config.poll_interval = Duration::from_secs(3600);
    let (session, mut events) = harness.session().await;
    let conversation = ConversationIdentity::group("team");
    let _ = assert_ok!(session.open_view(&conversation).await);

    crate::common::eventually("listener on group_team", || {
        harness.transport.listener_count("group_team") == 1
    })
    .await;
    let record = harness.send(&conversation, "hello").await;

    match next_event(&mut events).await {
        ConsumerEvent::Refresh {
            conversation: refreshed,
            record_id,
        } => {
            assert_eq!(refreshed, conversation);
            assert_eq!(record_id, record.id);
        }
        other => panic!("expected a refresh, got {:?}", other),
    }
    session.shutdown().await;
}

#[tokio::test]
async fn test_poll_path_heals_a_dead_push_path() {
    let harness = Harness::new();
    let (session, mut events) = harness.session().await;
    let conversation = ConversationIdentity::channel("news");
    let (view, initial) = assert_ok!(session.open_view(&conversation).await);
    assert!(initial.is_empty());

    harness.transport.refuse_connects(usize::MAX);
    harness.transport.disconnect_all();
    let record = harness.send(&conversation, "missed by push").await;

    loop {
        match next_event(&mut events).await {
            ConsumerEvent::PollBatch { view: polled, records } => {
                assert_eq!(polled, view);
                assert_eq!(records, vec![record.clone()]);
                break;
            }
            ConsumerEvent::Refresh { .. } => panic!("push path should be down"),
        }
    }
    assert_eq!(session.watermark(view).await, Some(Watermark::at(record.created_at)));
    session.shutdown().await;
}

#[tokio::test]
async fn test_record_seen_by_both_paths_is_merged_once() {
    let harness = Harness::new();
    let (session, mut events) = harness.session().await;
    let conversation = ConversationIdentity::direct("c1");
    let (view, initial) = assert_ok!(session.open_view(&conversation).await);

    let mut state = ConsumerState::new(harness.store.clone());
    state.insert_view(view, ConversationTimeline::with_records(conversation.clone(), initial));

    crate::common::eventually("listener on private_c1", || {
        harness.transport.listener_count("private_c1") == 1
    })
    .await;
    let record = harness.send(&conversation, "once").await;

    let (mut saw_refresh, mut saw_poll) = (false, false);
    while !(saw_refresh && saw_poll) {
        let event = next_event(&mut events).await;
        match &event {
            ConsumerEvent::Refresh { .. } => saw_refresh = true,
            ConsumerEvent::PollBatch { .. } => saw_poll = true,
        }
        assert_ok!(state.apply(event).await);
    }

    assert_eq!(state.records(view), vec![record]);
    session.shutdown().await;
}

#[tokio::test]
async fn test_trigger_and_application_publish_are_both_tolerated() {
    let harness = Harness::with_mode(PublishMode::Trigger);
    let writer = xfpulse::backend::messaging::MessageWriter::new(
        harness.store.clone(),
        xfpulse::backend::realtime::Publisher::new(Arc::new(harness.transport.clone())),
        PublishMode::Application,
    );
    let mut observer = assert_ok!(harness.transport.connect().await);
    assert_ok!(observer.listen("group_g").await);

    let conversation = ConversationIdentity::group("g");
    let record = assert_ok!(writer.send(&conversation, "bob", "twice").await);

    let mut state = ConsumerState::new(harness.store.clone());
    let view = ViewHandle::new(9);
    state.insert_view(view, ConversationTimeline::new(conversation.clone()));

    for _ in 0..2 {
        let notification = assert_ok!(observer.recv().await);
        let payload = assert_ok!(NotificationPayload::decode(&notification.payload));
        assert_eq!(payload.record_id, record.id);
        assert_ok!(
            state
                .apply(ConsumerEvent::Refresh {
                    conversation: payload.conversation(),
                    record_id: payload.record_id,
                })
                .await
        );
    }

    assert_eq!(state.records(view), vec![record]);
    assert_eq!(
        assert_ok!(harness.store.records_after(&conversation, Watermark::BEGINNING).await).len(),
        1
    );
}
