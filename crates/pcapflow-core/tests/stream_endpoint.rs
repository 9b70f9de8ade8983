use std::net::IpAddr;
use std::time::Duration;

use futures_util::StreamExt;
use pcapflow_core::{PacketRecord, Protocol, StreamServer, StreamSink};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

async fn wait_for_subscribers(sink: &StreamSink, expected: usize) {
    for _ in 0..200 {
        if sink.subscriber_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} subscribers, have {}", sink.subscriber_count());
}

fn record() -> PacketRecord {
    let src: IpAddr = "10.1.1.1".parse().unwrap();
    let dst: IpAddr = "10.1.1.2".parse().unwrap();
    PacketRecord::new(42.5, 98, Protocol::Tcp, Some((src, dst)))
}

#[tokio::test]
async fn connected_clients_receive_published_records() {
    let sink = StreamSink::new();
    let server = StreamServer::bind("127.0.0.1:0", sink.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = server.spawn(shutdown.clone());

    let url = format!("ws://{addr}");
    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_subscribers(&sink, 2).await;

    assert_eq!(sink.publish(&record()).unwrap(), 2);

    let expected = serde_json::to_string(&record()).unwrap();
    for client in [&mut first, &mut second] {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match message {
            Message::Text(text) => assert_eq!(text, expected),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    drop(first);
    wait_for_subscribers(&sink, 1).await;
    assert_eq!(sink.publish(&record()).unwrap(), 1);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sink.subscriber_count(), 0);
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let sink = StreamSink::new();
    let server = StreamServer::bind("127.0.0.1:0", sink.clone()).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();

    let err = match StreamServer::bind(&addr, sink).await {
        Ok(_) => panic!("expected second bind to fail"),
        Err(err) => err,
    };
    assert!(matches!(err, pcapflow_core::StreamError::Bind { .. }));
}

#[tokio::test]
async fn shutdown_completes_with_a_connection_stuck_before_handshake() {
    let sink = StreamSink::new();
    let server = StreamServer::bind("127.0.0.1:0", sink.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = server.spawn(shutdown.clone());

    // Plain TCP connection that never sends the upgrade request.
    let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("endpoint should stop while a handshake is pending")
        .unwrap();
    assert_eq!(sink.subscriber_count(), 0);
}
