//! No delivery after close/stop

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use xfpulse::backend::realtime::{
    ChannelSubscriber, ConsumerEvent, MemoryTransport, SubscriberConfig, SubscriberState,
};
use xfpulse::shared::{ConversationIdentity, NotificationPayload};

use crate::common::{eventually, never, Harness};
use crate::{assert_err, assert_ok};

#[tokio::test]
async fn test_no_callback_after_close_under_load() {
    let transport = MemoryTransport::new();
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let subscriber = ChannelSubscriber::new(
        Arc::new(transport.clone()),
        SubscriberConfig {
            receive_timeout: Duration::from_millis(5),
            ..SubscriberConfig::default()
        },
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );
    assert_ok!(subscriber.start().await);
    assert_ok!(subscriber.subscribe("channel_firehose"));
    eventually("listener", || transport.listener_count("channel_firehose") == 1).await;

    let payload = assert_ok!(NotificationPayload::new(&ConversationIdentity::channel("firehose"), Uuid::new_v4()).encode());
    let stop = Arc::new(AtomicBool::new(false));
    let flood = {
        let transport = transport.clone();
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            while !stop.load(Ordering::SeqCst) {
                transport.inject("channel_firehose", &payload);
                tokio::task::yield_now().await;
            }
        })
    };

    eventually("some deliveries", || delivered.load(Ordering::SeqCst) > 0).await;
    subscriber.close().await;
    let at_close = delivered.load(Ordering::SeqCst);

    never("a callback after close", Duration::from_millis(100), || {
        delivered.load(Ordering::SeqCst) != at_close
    })
    .await;
    stop.store(true, Ordering::SeqCst);
    assert_ok!(flood.await);

    assert_eq!(subscriber.state(), SubscriberState::Stopped);
    assert!(subscriber.channels().is_empty());
    assert_eq!(transport.connection_count(), 0);
}

#[tokio::test]
async fn test_close_during_reconnect_returns() {
    let transport = MemoryTransport::new();
    let subscriber = ChannelSubscriber::new(Arc::new(transport.clone()), SubscriberConfig::default(), |_| Ok(()));
    assert_ok!(subscriber.start().await);

    transport.refuse_connects(usize::MAX);
    transport.disconnect_all();
    eventually("reconnecting", || subscriber.state() == SubscriberState::Reconnecting).await;

    // Default backoff sleeps for seconds; close must not wait for it.
    assert_ok!(tokio::time::timeout(Duration::from_secs(1), subscriber.close()).await);
    assert_eq!(subscriber.state(), SubscriberState::Stopped);
    assert_err!(subscriber.subscribe("private_x"), xfpulse::backend::RealtimeError::NotStarted);
}

#[tokio::test]
async fn test_closed_view_receives_no_poll_batches() {
    let harness = Harness::new();
    let (session, mut events) = harness.session().await;
    let conversation = ConversationIdentity::direct("c1");
    let (view, _) = assert_ok!(session.open_view(&conversation).await);

    assert!(session.close_view(view).await);
    harness.transport.refuse_connects(usize::MAX);
    harness.transport.disconnect_all();
    harness.send(&conversation, "nobody is looking").await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    while let Ok(event) = events.try_recv() {
        if let ConsumerEvent::PollBatch { view: polled, .. } = event {
            assert_ne!(polled, view, "batch delivered to a closed view");
        }
    }
    session.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let harness = Harness::new();
    let (session, _events) = harness.session().await;
    for id in ["a", "b", "c"] {
        let _ = assert_ok!(session.open_view(&ConversationIdentity::group(id)).await);
    }
    assert_eq!(session.open_views().await.len(), 3);

    session.shutdown().await;

    assert!(session.open_views().await.is_empty());
    assert_eq!(session.subscriber_state(), SubscriberState::Stopped);
    assert_eq!(harness.transport.connection_count(), 0);
}
