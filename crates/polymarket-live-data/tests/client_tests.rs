/*
[INPUT]:  In-memory server scenarios driven through the public client API
[OUTPUT]: Verification of delivery, replay, heartbeat and reconnect behavior
[POS]:    Integration test layer - client lifecycle
[UPDATE]: When changing session, supervisor or subscription semantics
*/

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{identities, mock_pair, recording_handler, test_config, Recorded};
use polymarket_live_data::ws::{Action, ControlMessage, Frame};
use polymarket_live_data::{
    CallbackHandler,
    ClientError,
    Envelope,
    LiveDataClient,
    Payload,
    ReconnectPolicy,
    SessionState,
    Subscription,
    SubscriptionError,
    SubscriptionIdentity,
    SubscriptionKey,
    TerminationCause,
    TradeSide,
    UnmatchedUnsubscribe,
};
use rstest::rstest;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

fn trade_payload() -> serde_json::Value {
    json!({
        "asset": "7132",
        "conditionId": "0xcondition",
        "eventSlug": "fed-decision",
        "outcome": "Yes",
        "outcomeIndex": 0,
        "price": "0.61",
        "proxyWallet": "0xwallet",
        "side": "SELL",
        "size": "150",
        "slug": "fed-cuts-rates",
        "timestamp": 1_700_000_123,
        "title": "Fed cuts rates?",
        "transactionHash": "0xtx"
    })
}

#[tokio::test(start_paused = true)]
async fn test_trade_envelope_reaches_on_message() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));

    assert_ok!(client.subscribe(vec![Subscription::new("activity", "trades")]));
    assert_ok!(client.connect());

    let mut conn = server.accept().await;
    let replay = conn.next_control().await;
    assert_eq!(replay.action, Action::Subscribe);
    assert_eq!(
        identities(&replay.subscriptions),
        identities(&[Subscription::new("activity", "trades")])
    );
    log.expect_connected().await;
    assert_eq!(client.state(), SessionState::Open);

    let sent = Envelope::new("activity", "trades", trade_payload()).with_timestamp(1_700_000_123_456);
    conn.push_envelope(&sent);

    let received = log.expect_message().await;
    assert_eq!(received, sent);
    match received.typed_payload() {
        Payload::Trade(trade) => {
            assert_eq!(trade.side, TradeSide::Sell);
            assert_eq!(trade.price, Decimal::new(61, 2));
            assert_eq!(trade.size, Decimal::from(150));
        }
        other => panic!("expected trade payload, got {other:?}"),
    }

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_envelopes_are_delivered_in_arrival_order() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));
    assert_ok!(client.connect());

    let conn = server.accept().await;
    log.expect_connected().await;

    // Garbage in between must be dropped without ending the session.
    for seq in 0..20 {
        conn.push_envelope(&Envelope::new("crypto_prices", "update", json!({ "seq": seq })));
        if seq % 5 == 0 {
            conn.push_text("{not json");
            conn.push_text(r#"{"status":"ok"}"#);
        }
    }

    for seq in 0..20 {
        let envelope = log.expect_message().await;
        assert_eq!(envelope.payload, json!({ "seq": seq }));
    }
    assert_eq!(client.state(), SessionState::Open);

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replays_current_registry() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));

    let trades = Subscription::new("activity", "trades");
    let comments = Subscription::all("comments");
    let prices = Subscription::new("crypto_prices", "update").with_filters(r#"{"symbol":"btcusdt"}"#);

    assert_ok!(client.subscribe(vec![trades.clone()]));
    assert_ok!(client.connect());

    let mut first = server.accept().await;
    assert_eq!(identities(&first.next_control().await.subscriptions), identities(&[trades.clone()]));
    log.expect_connected().await;

    // While open, only the new entry goes out.
    assert_ok!(client.subscribe(vec![comments.clone(), trades.clone()]));
    let live = first.next_control().await;
    assert_eq!(live.action, Action::Subscribe);
    assert_eq!(identities(&live.subscriptions), identities(&[comments.clone()]));

    first.reset();
    let termination = log.expect_closed().await;
    assert!(termination.was_open);
    assert!(matches!(termination.cause, TerminationCause::Transport(_)));
    assert_eq!(client.state(), SessionState::Closed);

    // Changes made while disconnected only touch the registry.
    assert_ok!(client.subscribe(vec![prices.clone()]));
    assert_ok!(client.unsubscribe(vec![SubscriptionKey::new("activity", "trades")]));

    let mut second = server.accept().await;
    let replay = second.next_control().await;
    assert_eq!(replay.action, Action::Subscribe);
    assert_eq!(identities(&replay.subscriptions), identities(&client.subscriptions()));
    assert_eq!(identities(&replay.subscriptions), identities(&[comments, prices]));
    log.expect_connected().await;

    client.disconnect().await;
    let last = log.expect_closed().await;
    assert_eq!(last.cause, TerminationCause::ExplicitClose);
    assert_ne!(last.session_id, termination.session_id);
}

#[tokio::test(start_paused = true)]
async fn test_on_connect_runs_for_every_session() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));
    assert_ok!(client.connect());

    for _ in 0..3 {
        let conn = server.accept().await;
        log.expect_connected().await;
        conn.close();
        let termination = log.expect_closed().await;
        assert_eq!(termination.cause, TerminationCause::ClosedByServer);
    }

    let _conn = server.accept().await;
    log.expect_connected().await;
    assert_eq!(server.attempts(), 4);

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_on_connect_callback_may_subscribe() {
    let (connector, mut server) = mock_pair();
    let handler = CallbackHandler::new().when_connected(|client| {
        let _ = client.subscribe(vec![Subscription::new("activity", "trades")]);
    });
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));
    assert_ok!(client.connect());

    let mut first = server.accept().await;
    let frame = first.next_control().await;
    assert_eq!(frame.action, Action::Subscribe);
    assert_eq!(
        identities(&frame.subscriptions),
        identities(&[Subscription::new("activity", "trades")])
    );

    first.reset();
    let mut second = server.accept().await;
    let replay = second.next_control().await;
    assert_eq!(
        identities(&replay.subscriptions),
        identities(&[Subscription::new("activity", "trades")])
    );

    // The repeated subscribe from the callback is already registered.
    assert_ok!(client.send(json!({"marker": 0})));
    assert_eq!(second.next_text().await, json!({"marker": 0}));

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_pong_times_out_session() {
    let (connector, mut server) = mock_pair();
    server.set_auto_pong(false);
    let (handler, mut log) = recording_handler();
    let config = test_config()
        .with_auto_reconnect(false)
        .with_ping_interval(Duration::from_secs(5))
        .with_pong_timeout(Duration::from_secs(2));
    let client = assert_ok!(LiveDataClient::with_connector(config, handler, connector));
    assert_ok!(client.connect());

    let mut conn = server.accept().await;
    log.expect_connected().await;
    assert!(matches!(conn.next_frame().await, Frame::Ping(_)));

    let termination = client.closed().await.expect("client was connected");
    assert_eq!(termination.cause, TerminationCause::HeartbeatTimeout { timeout_ms: 2_000 });
    assert!(termination.was_open);
    assert_eq!(log.expect_closed().await, termination);
    assert_eq!(client.state(), SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_answered_pings_keep_session_open() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));
    assert_ok!(client.connect());

    let mut conn = server.accept().await;
    log.expect_connected().await;
    for _ in 0..5 {
        assert!(matches!(conn.next_frame().await, Frame::Ping(_)));
    }
    assert_eq!(client.state(), SessionState::Open);
    assert!(log.try_next().is_none());

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_suppresses_reconnect() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));
    assert_ok!(client.connect());

    let mut conn = server.accept().await;
    log.expect_connected().await;

    client.disconnect().await;
    assert_eq!(client.state(), SessionState::Closed);
    assert!(matches!(conn.next_frame().await, Frame::Close | Frame::Ping(_)));

    let termination = log.expect_closed().await;
    assert_eq!(termination.cause, TerminationCause::ExplicitClose);
    let final_termination = client.closed().await.expect("client was connected");
    assert_eq!(final_termination.cause, TerminationCause::ExplicitClose);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(server.try_accept().is_none());
    assert_eq!(server.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_close_is_forced_after_close_timeout() {
    let (connector, mut server) = mock_pair();
    server.set_confirm_close(false);
    let (handler, mut log) = recording_handler();
    let close_timeout = Duration::from_secs(3);
    let config = test_config().with_close_timeout(close_timeout);
    let client = assert_ok!(LiveDataClient::with_connector(config, handler, connector));
    assert_ok!(client.connect());

    let mut conn = server.accept().await;
    log.expect_connected().await;

    let started = Instant::now();
    client.disconnect().await;
    let elapsed = started.elapsed();
    assert!(elapsed >= close_timeout, "disconnect returned after {elapsed:?}");
    assert!(elapsed < close_timeout + Duration::from_secs(1), "disconnect returned after {elapsed:?}");

    assert_eq!(client.state(), SessionState::Closed);
    loop {
        match conn.next_frame().await {
            Frame::Close => break,
            Frame::Ping(_) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
    let termination = client.closed().await.expect("client was connected");
    assert_eq!(termination.cause, TerminationCause::ExplicitClose);
    assert!(termination.was_open);
    assert_eq!(log.expect_closed().await, termination);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_handshake_hits_connect_timeout() {
    let (connector, server) = mock_pair();
    server.stall_next(1);
    let (handler, mut log) = recording_handler();
    let config = test_config()
        .with_auto_reconnect(false)
        .with_connect_timeout(Duration::from_secs(2));
    let client = assert_ok!(LiveDataClient::with_connector(config, handler, connector));

    let started = Instant::now();
    let termination = assert_ok!(client.run().await);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3), "gave up after {elapsed:?}");
    assert_eq!(
        termination.cause,
        TerminationCause::Transport("connect timed out after 2000ms".to_string())
    );
    assert!(!termination.was_open);
    assert_eq!(server.attempts(), 1);
    assert_eq!(log.expect_closed().await, termination);
    assert_eq!(client.state(), SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_backoff_stops_retrying() {
    let (connector, mut server) = mock_pair();
    server.refuse_next(usize::MAX);
    let (handler, mut log) = recording_handler();
    let config = test_config().with_reconnect_policy(ReconnectPolicy::fixed(Duration::from_secs(10)));
    let client = assert_ok!(LiveDataClient::with_connector(config, handler, connector));
    assert_ok!(client.connect());

    let termination = log.expect_closed().await;
    assert!(!termination.was_open);
    assert_eq!(client.state(), SessionState::Closed);

    client.disconnect().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.attempts(), 1);
    assert!(server.try_accept().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_server_close_without_auto_reconnect_stays_closed() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client =
        assert_ok!(LiveDataClient::with_connector(test_config().with_auto_reconnect(false), handler, connector));
    assert_ok!(client.connect());

    let conn = server.accept().await;
    log.expect_connected().await;
    conn.close();

    let termination = client.closed().await.expect("client was connected");
    assert_eq!(termination.cause, TerminationCause::ClosedByServer);
    assert_eq!(log.expect_closed().await.cause, TerminationCause::ClosedByServer);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.attempts(), 1);

    // A closed client can be started again.
    assert_ok!(client.connect());
    let _conn = server.accept().await;
    log.expect_connected().await;
    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let (connector, server) = mock_pair();
    server.refuse_next(usize::MAX);
    let (handler, mut log) = recording_handler();
    let policy = ReconnectPolicy::fixed(Duration::from_millis(50)).with_max_attempts(3);
    let client = assert_ok!(LiveDataClient::with_connector(
        test_config().with_reconnect_policy(policy),
        handler,
        connector
    ));

    let termination = assert_ok!(client.run().await);
    assert!(!termination.was_open);
    assert!(matches!(termination.cause, TerminationCause::Transport(_)));
    // Initial attempt plus three retries.
    assert_eq!(server.attempts(), 4);

    for _ in 0..4 {
        assert!(matches!(log.next().await, Recorded::Closed(_)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_twice_is_rejected() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));

    assert_ok!(client.connect());
    assert!(matches!(assert_err!(client.connect()), ClientError::AlreadyConnected));

    let _conn = server.accept().await;
    log.expect_connected().await;
    assert!(matches!(assert_err!(client.clone().connect()), ClientError::AlreadyConnected));

    client.disconnect().await;
    assert_ok!(client.connect());
    let _conn = server.accept().await;
    client.disconnect().await;
}

#[rstest]
#[case::ignore(UnmatchedUnsubscribe::Ignore)]
#[case::reject(UnmatchedUnsubscribe::Reject)]
#[tokio::test(start_paused = true)]
async fn test_exact_unsubscribe_leaves_wildcard(#[case] mode: UnmatchedUnsubscribe) {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let config = test_config().with_unmatched_unsubscribe(mode);
    let client = assert_ok!(LiveDataClient::with_connector(config, handler, connector));

    assert_ok!(client.subscribe(vec![Subscription::all("comments")]));
    assert_ok!(client.connect());
    let mut conn = server.accept().await;
    conn.next_control().await;
    log.expect_connected().await;

    let result = client.unsubscribe(vec![SubscriptionKey::new("comments", "comment_created")]);
    match mode {
        UnmatchedUnsubscribe::Ignore => assert_ok!(result),
        UnmatchedUnsubscribe::Reject => match assert_err!(result) {
            ClientError::Subscription(SubscriptionError::NoMatch { topic, message_type }) => {
                assert_eq!(topic, "comments");
                assert_eq!(message_type, "comment_created");
            }
            other => panic!("expected NoMatch, got {other:?}"),
        },
    }
    assert_eq!(identities(&client.subscriptions()), identities(&[Subscription::all("comments")]));

    // Nothing was queued ahead of this frame.
    assert_ok!(client.send(json!({"marker": 1})));
    assert_eq!(conn.next_text().await, json!({"marker": 1}));

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_removes_every_filter_variant() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));

    assert_ok!(client.subscribe(vec![
        Subscription::new("crypto_prices", "update").with_filters(r#"{"symbol":"btcusdt"}"#),
        Subscription::new("crypto_prices", "update").with_filters(r#"{"symbol":"ethusdt"}"#),
        Subscription::new("activity", "trades"),
    ]));
    assert_ok!(client.connect());
    let mut conn = server.accept().await;
    assert_eq!(conn.next_control().await.subscriptions.len(), 3);
    log.expect_connected().await;

    assert_ok!(client.unsubscribe(vec![SubscriptionKey::new("crypto_prices", "update")]));
    let frame = conn.next_text().await;
    assert_eq!(
        frame,
        json!({
            "action": "unsubscribe",
            "subscriptions": [{"topic": "crypto_prices", "type": "update"}]
        })
    );
    assert_eq!(
        identities(&client.subscriptions()),
        identities(&[Subscription::new("activity", "trades")])
    );

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_subscribe_sends_nothing() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));

    assert_ok!(client.subscribe(vec![Subscription::new("activity", "trades")]));
    assert_ok!(client.connect());
    let mut conn = server.accept().await;
    conn.next_control().await;
    log.expect_connected().await;

    assert_ok!(client.subscribe(vec![Subscription::new("activity", "trades")]));
    assert_eq!(client.subscriptions().len(), 1);

    assert_ok!(client.send(json!({"marker": 2})));
    assert_eq!(conn.next_text().await, json!({"marker": 2}));

    client.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_subscription_changes_keep_server_in_sync() {
    let (connector, mut server) = mock_pair();
    let (handler, mut log) = recording_handler();
    let client = assert_ok!(LiveDataClient::with_connector(test_config(), handler, connector));
    assert_ok!(client.connect());
    let mut conn = server.accept().await;
    log.expect_connected().await;

    let workers: Vec<_> = (0..2)
        .map(|worker| {
            let client = client.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    let message_type = if i % 3 == 0 { "orders_matched" } else { "trades" };
                    if (i + worker) % 2 == 0 {
                        client
                            .subscribe(vec![Subscription::new("activity", message_type)])
                            .expect("subscribe");
                    } else {
                        client
                            .unsubscribe(vec![SubscriptionKey::new("activity", message_type)])
                            .expect("unsubscribe");
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread");
    }

    // Replay the wire frames the server saw into its own view of the set.
    assert_ok!(client.send(json!({"marker": "end"})));
    let mut server_view: HashSet<SubscriptionIdentity> = HashSet::new();
    loop {
        let frame = conn.next_text().await;
        if frame.get("marker").is_some() {
            break;
        }
        let control: ControlMessage = serde_json::from_value(frame).expect("control frame");
        for subscription in control.subscriptions {
            match control.action {
                Action::Subscribe => {
                    server_view.insert(subscription.identity());
                }
                Action::Unsubscribe => server_view.retain(|identity| {
                    identity.topic != subscription.topic || identity.selector != subscription.selector
                }),
            }
        }
    }

    assert_eq!(server_view, identities(&client.subscriptions()));
    client.disconnect().await;
}
