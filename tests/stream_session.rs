// End-to-end sessions against a local websocket server standing in for the provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use qstream_rs::config::StreamConfig;
use qstream_rs::stream::types::Action;
use qstream_rs::stream::{QuoteStreamClient, StreamError};
use qstream_rs::subscription::{StreamState, Subscription, SubscriptionRegistry};

const TOKEN: &str = "test-token";
const HANDSHAKE_REPLY: &str = r#"{"messageType":"I","response":{"code":200,"message":"Success"},"data":{"subscriptionId":"abc123"}}"#;

struct MockServer {
    url: String,
    /// Text frames the client sent.
    inbound: mpsc::UnboundedReceiver<String>,
    /// Frames to push to the client.
    outbound: mpsc::UnboundedSender<Message>,
}

impl MockServer {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut out_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = accept_async(tcp).await.unwrap();
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(text);
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    out = out_rx.recv() => match out {
                        Some(msg) => {
                            let closing = matches!(msg, Message::Close(_));
                            if write.send(msg).await.is_err() || closing {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Self { url: format!("ws://{}/iex", addr), inbound, outbound }
    }

    fn push(&self, text: &str) {
        self.outbound.send(Message::Text(text.to_string())).unwrap();
    }

    async fn next_frame(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server connection ended")
    }
}

fn registry_for(server: &MockServer) -> SubscriptionRegistry {
    let mut config = StreamConfig::new(&server.url, TOKEN);
    config.ready_timeout_ms = 5_000;
    SubscriptionRegistry::new(config)
}

async fn ready_session() -> (MockServer, SubscriptionRegistry) {
    let mut server = MockServer::spawn().await;
    let registry = registry_for(&server);
    registry.start();
    server.next_frame().await;
    server.push(HANDSHAKE_REPLY);
    wait_for(|| registry.state() == StreamState::Ready).await;
    (server, registry)
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_handshake_then_add_symbol_frames() {
    let mut server = MockServer::spawn().await;
    let registry = registry_for(&server);
    assert_eq!(registry.state(), StreamState::Unstarted);

    registry.start();
    assert_eq!(
        server.next_frame().await,
        r#"{"eventName":"subscribe","authorization":"test-token","eventData":{"thresholdLevel":5,"tickers":["spy"]}}"#
    );
    assert_eq!(registry.state(), StreamState::Connecting);
    assert_eq!(registry.subscription_id(), None);

    server.push(r#"{"data":{"subscriptionId":"abc123"}}"#);
    registry.add_symbol("gme").await.unwrap();

    assert_eq!(registry.state(), StreamState::Ready);
    assert_eq!(registry.subscription_id().as_deref(), Some("abc123"));
    assert_eq!(
        server.next_frame().await,
        r#"{"eventName":"subscribe","authorization":"test-token","eventData":{"subscriptionId":"abc123","thresholdLevel":5,"tickers":["gme"]}}"#
    );
    assert_eq!(registry.tracked_symbols(), vec!["gme".to_string(), "spy".to_string()]);
}

#[tokio::test]
async fn test_concurrent_adds_wait_for_ready() {
    let mut server = MockServer::spawn().await;
    let registry = registry_for(&server);

    let server_side = async {
        let handshake: Value = serde_json::from_str(&server.next_frame().await).unwrap();
        assert!(handshake["eventData"].get("subscriptionId").is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.state(), StreamState::Connecting);
        server.outbound.send(Message::Text(HANDSHAKE_REPLY.to_string())).unwrap();
    };

    let (a, b, c, ()) = tokio::join!(
        registry.add_symbol("aapl"),
        registry.add_symbol("nvda"),
        registry.add_symbol("pltr"),
        server_side,
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let mut subscribed = HashSet::new();
    for _ in 0..3 {
        let frame: Value = serde_json::from_str(&server.next_frame().await).unwrap();
        assert_eq!(frame["eventName"], "subscribe");
        assert_eq!(frame["eventData"]["subscriptionId"], "abc123");
        subscribed.insert(frame["eventData"]["tickers"][0].as_str().unwrap().to_string());
    }
    let expected: HashSet<String> = ["aapl", "nvda", "pltr"].iter().map(|s| s.to_string()).collect();
    assert_eq!(subscribed, expected);
}

#[tokio::test]
async fn test_snapshot_follows_updates_and_skips_garbage() {
    let (mut server, registry) = ready_session().await;
    registry.add_symbol("AAPL").await.unwrap();
    server.next_frame().await;
    assert_eq!(registry.snapshot("aapl"), None);

    server.push("not json {");
    server.push(r#"{"messageType":"A","data":["Q"]}"#);
    server.push(r#"{"messageType":"H","response":{"code":200,"message":"HeartBeat"}}"#);
    server.push(r#"{"messageType":"A","service":"iex","data":["Q","2024-01-02T09:30:00-05:00",1,"AAPL",100,101.0,101.25,101.5,200]}"#);

    wait_for(|| registry.snapshot("aapl").is_some()).await;
    let snap = registry.snapshot("AAPL").unwrap();
    assert_eq!(snap.last_price, Some(101.5));
    assert_eq!(snap.last_size, Some(200));
    assert_eq!(snap.bid_price, Some(101.0));
    assert_eq!(snap.timestamp.as_deref(), Some("2024-01-02T09:30:00-05:00"));

    server.push(r#"{"messageType":"A","data":["T","2024-01-02T09:30:01-05:00",2,"aapl",null,null,null,null,null,101.6,50]}"#);
    wait_for(|| registry.snapshot("aapl").and_then(|s| s.last_price) == Some(101.6)).await;
    let snap = registry.snapshot("aapl").unwrap();
    assert_eq!(snap.last_size, Some(50));
    assert_eq!(snap.bid_price, Some(101.0));
    assert_eq!(registry.state(), StreamState::Ready);
}

#[tokio::test]
async fn test_untracked_updates_are_dropped() {
    let (server, registry) = ready_session().await;
    server.push(r#"{"messageType":"A","data":["T","ts",0,"tsla",null,null,null,null,null,250.0,1]}"#);
    server.push(r#"{"messageType":"A","data":["T","ts",0,"spy",null,null,null,null,null,470.0,1]}"#);

    wait_for(|| registry.snapshot("spy").is_some()).await;
    assert_eq!(registry.snapshot("tsla"), None);
}

#[tokio::test]
async fn test_remove_symbol() {
    let (mut server, registry) = ready_session().await;
    registry.add_symbol("gme").await.unwrap();
    server.next_frame().await;

    assert!(registry.remove_symbol("gme").await.unwrap());
    assert_eq!(
        server.next_frame().await,
        r#"{"eventName":"unsubscribe","authorization":"test-token","eventData":{"subscriptionId":"abc123","tickers":["gme"]}}"#
    );
    assert_eq!(registry.tracked_symbols(), vec!["spy".to_string()]);

    assert!(!registry.remove_symbol("gme").await.unwrap());
    assert!(!registry.remove_symbol("never-added").await.unwrap());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.inbound.try_recv().is_err());
    assert_eq!(registry.tracked_symbols(), vec!["spy".to_string()]);
}

#[tokio::test]
async fn test_subscription_id_assigned_once() {
    let (mut server, registry) = ready_session().await;
    server.push(r#"{"data":{"subscriptionId":"zzz999"}}"#);
    registry.add_symbol("c").await.unwrap();

    let frame: Value = serde_json::from_str(&server.next_frame().await).unwrap();
    assert_eq!(frame["eventData"]["subscriptionId"], "abc123");
    assert_eq!(registry.subscription_id().as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_bad_handshake_reply_is_skipped() {
    let mut server = MockServer::spawn().await;
    let registry = registry_for(&server);
    registry.start();
    server.next_frame().await;

    server.push(r#"{"messageType":"H"}"#);
    server.push("{{{");
    server.push(r#"{"data":{"subscriptionId":61}}"#);
    wait_for(|| registry.state() == StreamState::Ready).await;
    assert_eq!(registry.subscription_id().as_deref(), Some("61"));
}

#[tokio::test]
async fn test_server_close_releases_waiters() {
    let mut server = MockServer::spawn().await;
    let registry = registry_for(&server);

    let server_side = async {
        server.next_frame().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.outbound.send(Message::Close(None)).unwrap();
    };
    let (result, ()) = tokio::join!(registry.add_symbol("gme"), server_side);

    assert!(matches!(result, Err(StreamError::Closed)));
    assert_eq!(registry.state(), StreamState::Closed);
    assert!(registry.tracked_symbols().is_empty());
}

#[tokio::test]
async fn test_client_close() {
    let (mut server, registry) = ready_session().await;
    registry.close().await;
    assert_eq!(registry.state(), StreamState::Closed);

    let ended = tokio::time::timeout(Duration::from_secs(5), server.inbound.recv()).await.unwrap();
    assert_eq!(ended, None);

    assert!(matches!(registry.add_symbol("gme").await, Err(StreamError::Closed)));
}

#[tokio::test]
async fn test_numeric_subscription_id_echoed_as_number() {
    let mut server = MockServer::spawn().await;
    let registry = registry_for(&server);
    registry.start();
    server.next_frame().await;

    server.push(r#"{"messageType":"I","response":{"code":200,"message":"Success"},"data":{"subscriptionId":61}}"#);
    registry.add_symbol("gme").await.unwrap();
    assert_eq!(
        server.next_frame().await,
        r#"{"eventName":"subscribe","authorization":"test-token","eventData":{"subscriptionId":61,"thresholdLevel":5,"tickers":["gme"]}}"#
    );

    assert!(registry.remove_symbol("gme").await.unwrap());
    assert_eq!(
        server.next_frame().await,
        r#"{"eventName":"unsubscribe","authorization":"test-token","eventData":{"subscriptionId":61,"tickers":["gme"]}}"#
    );
}

#[tokio::test]
async fn test_send_control_before_handshake_is_refused() {
    let mut server = MockServer::spawn().await;
    let mut config = StreamConfig::new(&server.url, TOKEN);
    config.ready_timeout_ms = 5_000;
    let subscription = Arc::new(Subscription::new());
    let client = QuoteStreamClient::new(config, Arc::clone(&subscription));

    let result = client.send_control(Action::Subscribe, vec!["gme".into()], Some(5)).await;
    assert!(matches!(result, Err(StreamError::NotReady)));

    client.start();
    let handshake: Value = serde_json::from_str(&server.next_frame().await).unwrap();
    assert!(handshake["eventData"].get("subscriptionId").is_none());
    assert_eq!(subscription.state(), StreamState::Connecting);

    let result = client.send_control(Action::Subscribe, vec!["gme".into()], Some(5)).await;
    assert!(matches!(result, Err(StreamError::NotReady)));
    let result = client.send_control(Action::Unsubscribe, vec!["spy".into()], None).await;
    assert!(matches!(result, Err(StreamError::NotReady)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.inbound.try_recv().is_err());

    server.push(HANDSHAKE_REPLY);
    wait_for(|| subscription.state() == StreamState::Ready).await;
    client.send_control(Action::Subscribe, vec!["gme".into()], Some(5)).await.unwrap();
    let frame: Value = serde_json::from_str(&server.next_frame().await).unwrap();
    assert_eq!(frame["eventData"]["subscriptionId"], "abc123");
    client.close().await;
}

#[tokio::test]
async fn test_concurrent_remove_and_add_keep_tracking_consistent() {
    let (mut server, registry) = ready_session().await;
    registry.add_symbol("gme").await.unwrap();
    server.next_frame().await;

    let (removed, added) = tokio::join!(registry.remove_symbol("gme"), registry.add_symbol("gme"));
    removed.unwrap();
    added.unwrap();

    let mut last_action = String::new();
    for _ in 0..2 {
        let frame: Value = serde_json::from_str(&server.next_frame().await).unwrap();
        assert_eq!(frame["eventData"]["tickers"][0], "gme");
        last_action = frame["eventName"].as_str().unwrap().to_string();
    }
    // Whatever the interleaving, the server and the registry agree.
    assert_eq!(last_action, "subscribe");
    assert!(registry.tracked_symbols().contains(&"gme".to_string()));

    server.push(r#"{"messageType":"A","data":["T","ts",0,"gme",null,null,null,null,null,21.5,3]}"#);
    wait_for(|| registry.snapshot("gme").is_some()).await;
    assert_eq!(registry.snapshot("gme").unwrap().last_price, Some(21.5));
}

#[tokio::test]
async fn test_concurrent_duplicate_adds_stay_tracked() {
    let (mut server, registry) = ready_session().await;

    let (first, second) = tokio::join!(registry.add_symbol("gme"), registry.add_symbol("GME"));
    first.unwrap();
    second.unwrap();

    for _ in 0..2 {
        let frame: Value = serde_json::from_str(&server.next_frame().await).unwrap();
        assert_eq!(frame["eventName"], "subscribe");
        assert_eq!(frame["eventData"]["tickers"][0], "gme");
    }
    assert_eq!(registry.tracked_symbols(), vec!["gme".to_string(), "spy".to_string()]);

    assert!(registry.remove_symbol("gme").await.unwrap());
    assert_eq!(registry.tracked_symbols(), vec!["spy".to_string()]);
}
