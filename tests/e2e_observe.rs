//! Subscriptions: ordering, cancellation, idempotent unobserve.

mod helpers;

use std::time::Duration;

use based_client::{CallId, Client, ClientError, LoopbackTransport};
use helpers::{config, mock_client};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize, PartialEq)]
struct Counter {
    count: u64,
}

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn updates_arrive_in_delivery_order() {
    let client = mock_client();
    let mut counter = client.observe::<Counter>("counter", &json!({})).unwrap();
    let id = counter.id();

    for c in 1..=3 {
        client
            .transport()
            .push(id, &json!({ "count": c }).to_string(), 100 + c, "");
    }

    for c in 1..=3 {
        let update = counter.next_update().await.unwrap().unwrap();
        assert_eq!(update, Counter { count: c });
        assert_eq!(counter.checksum(), Some(100 + c));
    }
}

#[tokio::test]
async fn cancel_stops_delivery_and_unobserves_once() {
    let client = mock_client();
    let mut counter = client.observe::<Counter>("counter", &json!({})).unwrap();
    let id = counter.id();

    client.transport().push(id, r#"{"count":1}"#, 1, "");
    assert_eq!(
        counter.next_update().await.unwrap().unwrap(),
        Counter { count: 1 }
    );

    counter.cancel();
    assert_eq!(client.transport().unobserved(), vec![id]);
    assert_eq!(client.active_subscriptions(), 0);

    // Transport keeps delivering after unobserve; nothing reaches the consumer.
    client.transport().push(id, r#"{"count":2}"#, 2, "");
    assert!(counter.next_update().await.is_none());

    counter.cancel();
    drop(counter);
    assert_eq!(client.transport().unobserved(), vec![id], "exactly once");
}

#[tokio::test]
async fn buffered_updates_are_discarded_on_cancel() {
    let client = mock_client();
    let mut counter = client.observe::<Counter>("counter", &json!({})).unwrap();
    let id = counter.id();

    client.transport().push(id, r#"{"count":1}"#, 1, "");
    client.transport().push(id, r#"{"count":2}"#, 2, "");
    counter.cancel();

    assert!(counter.next_update().await.is_none());
}

#[tokio::test]
async fn unobserve_twice_is_a_no_op() {
    let client = mock_client();
    let counter = client.observe::<Value>("counter", &json!({})).unwrap();
    let id = counter.id();

    assert!(client.unobserve(id));
    assert!(!client.unobserve(id));
    assert!(!client.unobserve(CallId::new(12345)));
    drop(counter);

    assert_eq!(client.transport().unobserved(), vec![id]);
}

#[tokio::test]
async fn dropping_subscription_unobserves() {
    let client = mock_client();
    let counter = client.observe::<Value>("counter", &json!({"room": 1})).unwrap();
    let id = counter.id();
    let (_, name, payload) = client.transport().observations()[0].clone();
    assert_eq!(name, "counter");
    assert_eq!(payload, r#"{"room":1}"#);

    drop(counter);

    assert_eq!(client.transport().unobserved(), vec![id]);
    assert_eq!(client.active_subscriptions(), 0);
}

#[tokio::test]
async fn unchanged_checksum_is_skipped() {
    let client = mock_client();
    let mut counter = client.observe::<Counter>("counter", &json!({})).unwrap();
    let id = counter.id();

    client.transport().push(id, r#"{"count":1}"#, 7, "");
    client.transport().push(id, r#"{"count":1}"#, 7, "");
    client.transport().push(id, r#"{"count":2}"#, 8, "");

    assert_eq!(counter.next().await.unwrap().unwrap(), Counter { count: 1 });
    assert_eq!(counter.next().await.unwrap().unwrap(), Counter { count: 2 });
    assert_eq!(counter.checksum(), Some(8));
}

#[tokio::test]
async fn remote_error_ends_the_stream() {
    let client = mock_client();
    let mut counter = client.observe::<Counter>("obsCrasher", &json!({})).unwrap();
    let id = counter.id();

    client.transport().push(id, r#"{"count":1}"#, 1, "");
    client
        .transport()
        .push(id, "", 0, r#"{"code":500,"message":"observable crashed"}"#);

    assert!(counter.next_update().await.unwrap().is_ok());
    assert!(matches!(
        counter.next_update().await.unwrap(),
        Err(ClientError::Remote { message, .. }) if message == "observable crashed"
    ));
    assert!(counter.next_update().await.is_none());
    assert_eq!(client.transport().unobserved(), vec![id]);
}

#[tokio::test]
async fn decode_error_does_not_end_the_stream() {
    let client = mock_client();
    let mut counter = client.observe::<Counter>("counter", &json!({})).unwrap();
    let id = counter.id();

    client.transport().push(id, r#"{"unexpected":true}"#, 1, "");
    client.transport().push(id, r#"{"count":2}"#, 2, "");

    assert!(matches!(
        counter.next_update().await.unwrap(),
        Err(ClientError::Decode(_))
    ));
    assert_eq!(
        counter.next_update().await.unwrap().unwrap(),
        Counter { count: 2 }
    );
    assert!(client.transport().unobserved().is_empty());
}

#[tokio::test]
async fn subscriptions_are_independent() {
    let client = mock_client();
    let mut a = client.observe::<Counter>("a", &json!({})).unwrap();
    let mut b = client.observe::<Counter>("b", &json!({})).unwrap();

    client.transport().push(b.id(), r#"{"count":20}"#, 1, "");
    client.transport().push(a.id(), r#"{"count":10}"#, 1, "");
    a.cancel();
    client.transport().push(b.id(), r#"{"count":21}"#, 2, "");

    assert!(a.next_update().await.is_none());
    assert_eq!(b.next_update().await.unwrap().unwrap(), Counter { count: 20 });
    assert_eq!(b.next_update().await.unwrap().unwrap(), Counter { count: 21 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loopback_counter_cancelled_after_third_update() {
    let transport = LoopbackTransport::new(Duration::from_millis(10));
    transport.register_observable("counter", |_, tick| Ok(json!({ "count": tick }).to_string()));
    let client = Client::with_transport(config(), transport);

    let mut counter = client.observe::<Counter>("counter", &json!({})).unwrap();
    let first = tokio::time::timeout(WAIT, counter.next_update())
        .await
        .expect("an update within the wait")
        .unwrap()
        .unwrap();
    let mut seen = vec![first];

    while seen.len() < 3 {
        let update = tokio::time::timeout(WAIT, counter.next_update())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        seen.push(update);
    }
    counter.cancel();

    // Give the ticker time to attempt further deliveries.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(counter.next_update().await.is_none());
    assert_eq!(
        seen,
        vec![Counter { count: 1 }, Counter { count: 2 }, Counter { count: 3 }]
    );
    assert_eq!(client.transport().unobserve_calls(), 1);
    assert_eq!(client.transport().active_observers(), 0);
}
