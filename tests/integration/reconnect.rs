//! Subscriber reconnect and resubscription

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use uuid::Uuid;
use xfpulse::backend::realtime::{
    ChannelSubscriber, ConsumerEvent, MemoryTransport, SubscriberConfig, SubscriberState,
};
use xfpulse::shared::{ConversationIdentity, NotificationPayload};

use crate::assert_ok;
use crate::common::{eventually, Harness};

fn fast() -> SubscriberConfig {
    SubscriberConfig {
        reconnect_delay: Duration::from_millis(10),
        max_reconnect_delay: Duration::from_millis(40),
        receive_timeout: Duration::from_millis(10),
        liveness_interval: Duration::from_millis(100),
    }
}

fn counting_subscriber(transport: &MemoryTransport) -> (ChannelSubscriber<MemoryTransport>, Arc<AtomicUsize>) {
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let subscriber = ChannelSubscriber::new(Arc::new(transport.clone()), fast(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (subscriber, delivered)
}

/// Listen calls per channel made on connections opened after the log was
/// cleared
fn replayed(transport: &MemoryTransport) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for event in transport.listen_log() {
        assert!(event.listen, "unexpected unlisten of {}", event.channel);
        *counts.entry(event.channel).or_insert(0) += 1;
    }
    counts
}

async fn wait_for_state(subscriber: &ChannelSubscriber<MemoryTransport>, state: SubscriberState) {
    let mut rx = subscriber.watch_state();
    let reached = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .map(|r| r.is_ok());
    assert!(matches!(reached, Ok(true)), "timed out waiting for {:?}", state);
}

fn payload(identity: &ConversationIdentity) -> String {
    assert_ok!(NotificationPayload::new(identity, Uuid::new_v4()).encode())
}

#[tokio::test]
async fn test_disconnect_replays_exactly_the_subscription_set() {
    let transport = MemoryTransport::new();
    let (subscriber, delivered) = counting_subscriber(&transport);
    assert_ok!(subscriber.start().await);

    let channels = ["private_a", "private_b", "private_c"];
    for channel in channels {
        assert_ok!(subscriber.subscribe(channel));
    }
    eventually("initial listens", || {
        channels.iter().all(|c| transport.listener_count(c) == 1)
    })
    .await;

    transport.clear_listen_log();
    transport.refuse_connects(3);
    transport.disconnect_all();

    wait_for_state(&subscriber, SubscriberState::Reconnecting).await;
    wait_for_state(&subscriber, SubscriberState::Listening).await;

    let expected: BTreeMap<String, usize> = channels.iter().map(|c| (c.to_string(), 1)).collect();
    assert_eq!(replayed(&transport), expected);
    assert_eq!(transport.connection_count(), 1);

    assert_eq!(transport.inject("private_b", &payload(&ConversationIdentity::direct("b"))), 1);
    eventually("delivery after reconnect", || delivered.load(Ordering::SeqCst) == 1).await;
    subscriber.close().await;
}

#[tokio::test]
async fn test_changes_during_outage_are_applied_on_reconnect() {
    let transport = MemoryTransport::new();
    let (subscriber, _) = counting_subscriber(&transport);
    assert_ok!(subscriber.start().await);
    assert_ok!(subscriber.subscribe("group_keep"));
    assert_ok!(subscriber.subscribe("group_drop"));
    eventually("initial listens", || transport.listener_count("group_drop") == 1).await;

    transport.refuse_connects(usize::MAX);
    transport.disconnect_all();
    wait_for_state(&subscriber, SubscriberState::Reconnecting).await;

    assert_ok!(subscriber.subscribe("group_new"));
    subscriber.unsubscribe("group_drop");
    transport.clear_listen_log();
    transport.refuse_connects(0);

    wait_for_state(&subscriber, SubscriberState::Listening).await;

    let expected: BTreeMap<String, usize> = [("group_keep".to_string(), 1), ("group_new".to_string(), 1)]
        .into_iter()
        .collect();
    assert_eq!(replayed(&transport), expected);
    subscriber.close().await;
}

#[tokio::test]
async fn test_backoff_keeps_retrying_until_transport_returns() {
    let transport = MemoryTransport::new();
    let (subscriber, _) = counting_subscriber(&transport);
    assert_ok!(subscriber.start().await);

    transport.refuse_connects(usize::MAX);
    transport.disconnect_all();
    wait_for_state(&subscriber, SubscriberState::Reconnecting).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(subscriber.state(), SubscriberState::Reconnecting);
    assert_eq!(transport.connect_count(), 1);

    transport.refuse_connects(0);
    wait_for_state(&subscriber, SubscriberState::Listening).await;
    assert_eq!(transport.connect_count(), 2);
    subscriber.close().await;
}

#[tokio::test]
async fn test_session_views_survive_a_reconnect() {
    let harness = Harness::new();
    let (session, mut events) = harness.session().await;
    let conversation = ConversationIdentity::group("ops");
    let _ = assert_ok!(session.open_view(&conversation).await);
    eventually("listener on group_ops", || harness.transport.listener_count("group_ops") == 1).await;

    harness.transport.disconnect_all();
    eventually("relisten on group_ops", || harness.transport.listener_count("group_ops") == 1).await;

    let record = harness.send(&conversation, "after reconnect").await;
    let refreshed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(ConsumerEvent::Refresh { record_id, .. }) if record_id == record.id => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await;
    assert!(matches!(refreshed, Ok(true)), "no refresh after reconnect");
    session.shutdown().await;
}
