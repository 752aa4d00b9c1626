use lanchat::{ChatError, Request, SessionEvent};
use lanchat_tests::harness::server::{MockServer, Reply};
use lanchat_tests::harness::{client_for, drain_for, init_tracing, next_event};
use std::time::Duration;

async fn chat_server() -> MockServer {
    MockServer::spawn(|req| match req {
        Request::Register { .. } => Reply::text("OK|registered"),
        Request::Unregister { .. } => Reply::text("OK|unregistered"),
        Request::Send { to, .. } => Reply::Text(format!("ACK|delivered to {to}")),
        Request::Wait { .. } => Reply::Hold,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn send_carries_sender_recipient_and_body() {
    init_tracing();
    let server = chat_server().await;
    let (client, _events) = client_for(&server, "alice");

    let reply = client.send(" bob ", " hi | there ").await.unwrap();
    assert_eq!(reply, "ACK|delivered to bob");
    assert_eq!(
        server.requests(),
        vec![Request::Send {
            from: "alice".to_string(),
            to: "bob".to_string(),
            body: "hi | there".to_string(),
        }]
    );
}

#[tokio::test]
async fn any_reply_counts_as_sent() {
    let server = MockServer::always("ERR|no such user").await.unwrap();
    let (client, _events) = client_for(&server, "alice");

    assert_eq!(
        client.send("nobody", "hello").await.unwrap(),
        "ERR|no such user"
    );
}

#[tokio::test]
async fn invalid_send_never_opens_a_connection() {
    let server = chat_server().await;
    let (client, _events) = client_for(&server, "alice");

    for (to, body) in [("", "hello"), ("bob", ""), ("   ", "  ")] {
        assert!(matches!(
            client.send(to, body).await,
            Err(ChatError::InvalidInput(_))
        ));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepted(), 0);
}

#[tokio::test]
async fn send_runs_alongside_the_wait_loop() {
    init_tracing();
    let server = chat_server().await;
    let (client, mut events) = client_for(&server, "alice");

    client.register().await.unwrap();
    client.start_loop().unwrap();
    server
        .wait_for_requests(1, Duration::from_secs(2), |r| {
            matches!(r, Request::Wait { .. })
        })
        .await;

    // The held wait connection does not block an independent send.
    let reply = tokio::time::timeout(Duration::from_secs(1), client.send("bob", "hi"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, "ACK|delivered to bob");
    assert!(client.session().is_running());

    assert!(drain_for(&mut events, Duration::from_millis(100)).await.is_empty());
    assert!(client.stop_loop(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn shutdown_stops_the_loop_then_unregisters() {
    init_tracing();
    let server = chat_server().await;
    let (client, mut events) = client_for(&server, "alice");

    client.register().await.unwrap();
    client.start_loop().unwrap();
    server
        .wait_for_requests(1, Duration::from_secs(2), |r| {
            matches!(r, Request::Wait { .. })
        })
        .await;

    let reply = client.shutdown().await.unwrap();
    assert_eq!(reply, "OK|unregistered");
    assert!(!client.session().is_registered());
    assert!(!client.session().is_running());
    assert_eq!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(SessionEvent::Disconnected)
    );

    let requests = server.requests();
    assert_eq!(
        requests.last(),
        Some(&Request::Unregister {
            username: "alice".to_string()
        })
    );
    assert_eq!(server.wait_for_idle(Duration::from_secs(2)).await, 0);
}

#[tokio::test]
async fn failed_unregister_does_not_block_shutdown() {
    init_tracing();
    let server = MockServer::spawn(|req| match req {
        Request::Register { .. } => Reply::text("OK|registered"),
        Request::Unregister { .. } => Reply::text("ERR|unknown user"),
        _ => Reply::Hold,
    })
    .await
    .unwrap();
    let (client, _events) = client_for(&server, "alice");

    client.register().await.unwrap();
    client.start_loop().unwrap();

    let result = tokio::time::timeout(Duration::from_secs(3), client.shutdown())
        .await
        .unwrap();
    match result {
        Err(ChatError::Rejected(reply)) => assert_eq!(reply, "ERR|unknown user"),
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(!client.session().is_running());
}
