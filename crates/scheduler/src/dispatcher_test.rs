//! Tests for the command dispatcher
//!
//! Full-stack scenarios: a real relay and dispatcher on loopback sockets,
//! driven by encoded datagrams exactly as a sender would produce them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use cued_protocol::{decode_message, encode, encode_bundle, now_unix, Arg, Message};

use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::metrics::DispatcherMetrics;
use crate::relay::{CueRelay, CueRelayConfig};

struct Harness {
    client: UdpSocket,
    cmd_addr: SocketAddr,
    cue_addr: SocketAddr,
    observer: UdpSocket,
    metrics: Arc<DispatcherMetrics>,
    _cancel: CancellationToken,
}

async fn start() -> Harness {
    let observer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let observer_port = observer.local_addr().unwrap().port();

    let cancel = CancellationToken::new();

    let relay_config = CueRelayConfig {
        cue_port: 0,
        observer_host: "127.0.0.1".into(),
        observer_port,
        heartbeat: Duration::from_secs(1),
        ..Default::default()
    };
    let (relay, relay_handle) = CueRelay::bind(relay_config, cancel.clone()).await.unwrap();
    let cue_addr = relay.local_addr().unwrap();
    tokio::spawn(relay.run());

    let dispatcher_config = DispatcherConfig {
        bind_address: "127.0.0.1".into(),
        command_port: 0,
        ..Default::default()
    };
    let dispatcher = Dispatcher::bind(dispatcher_config, relay_handle, cancel.clone())
        .await
        .unwrap();
    let cmd_addr = dispatcher.local_addr().unwrap();
    let metrics = dispatcher.metrics();
    tokio::spawn(dispatcher.run());

    Harness {
        client: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        cmd_addr,
        cue_addr,
        observer,
        metrics,
        _cancel: cancel,
    }
}

impl Harness {
    /// Send a timed bundle carrying one command
    async fn send_bundle(&self, time: f64, inner: &Message) {
        let bytes = encode_bundle(time, &[encode(inner)]);
        self.client.send_to(&bytes, self.cmd_addr).await.unwrap();
    }

    /// Send an immediate command
    async fn send_command(&self, msg: &Message) {
        self.client
            .send_to(&encode(msg), self.cmd_addr)
            .await
            .unwrap();
    }
}

async fn recv_datagram(sock: &UdpSocket, ms: u64) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 64 * 1024];
    match timeout(Duration::from_millis(ms), sock.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}

/// Destination socket for forwarded commands
async fn dest_socket() -> (UdpSocket, u16) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    (sock, port)
}

fn send_after(port: u16, address: &str) -> Message {
    Message::new("/send_after")
        .arg("127.0.0.1")
        .arg(i32::from(port))
        .arg(address)
}

fn send_after_tagged(tag: &str, port: u16, address: &str) -> Message {
    Message::new("/send_after_tagged")
        .arg(tag)
        .arg("127.0.0.1")
        .arg(i32::from(port))
        .arg(address)
}

#[tokio::test]
async fn test_immediate_forward_below_threshold() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    let start = Instant::now();
    h.send_bundle(now_unix(), &send_after(port, "/ping")).await;

    let received = recv_datagram(&dest, 500).await.expect("forward arrives");
    // No timer involved: the forward happens in the dispatch path itself
    assert!(start.elapsed() < Duration::from_millis(200));

    let msg = decode_message(&received).unwrap();
    assert_eq!(msg.address, "/ping");
    assert!(msg.args.is_empty());
}

#[tokio::test]
async fn test_forwarded_command_keeps_arguments() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    let inner = send_after(port, "/note").arg(60).arg(0.5f32).arg("soft");
    h.send_bundle(now_unix(), &inner).await;

    let received = recv_datagram(&dest, 500).await.expect("forward arrives");
    let msg = decode_message(&received).unwrap();
    assert_eq!(msg.address, "/note");
    assert_eq!(msg.args[0], Arg::Int(60));
    assert_eq!(msg.args[1], Arg::Float(0.5));
    assert_eq!(msg.args[2], Arg::Str("soft".into()));
}

#[tokio::test]
async fn test_scheduled_forward_fires_near_target() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    let start = Instant::now();
    h.send_bundle(now_unix() + 0.25, &send_after(port, "/later"))
        .await;

    let received = recv_datagram(&dest, 2000).await.expect("forward arrives");
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(200) && elapsed <= Duration::from_millis(600),
        "fired at {:?}, target 250ms",
        elapsed
    );

    let msg = decode_message(&received).unwrap();
    assert_eq!(msg.address, "/later");
}

#[tokio::test]
async fn test_flush_cancels_pending_deliveries() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    // Schedule for +500ms, flush at +100ms
    h.send_bundle(
        now_unix() + 0.5,
        &send_after_tagged("drums", port, "/note").arg(60),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.send_command(&Message::new("/flush").arg("drums")).await;

    assert!(
        recv_datagram(&dest, 900).await.is_none(),
        "flushed delivery must never be transmitted"
    );
}

#[tokio::test]
async fn test_flush_cancels_many_independent_delays() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    for i in 0..5 {
        h.send_bundle(
            now_unix() + 0.3 + f64::from(i) * 0.1,
            &send_after_tagged("batch", port, "/n").arg(i),
        )
        .await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.send_command(&Message::new("/flush").arg("batch")).await;

    assert!(
        recv_datagram(&dest, 1200).await.is_none(),
        "no flushed delivery may survive"
    );
}

#[tokio::test]
async fn test_flush_tag_isolation() {
    let h = start().await;
    let (dest_a, port_a) = dest_socket().await;
    let (dest_b, port_b) = dest_socket().await;

    h.send_bundle(
        now_unix() + 0.4,
        &send_after_tagged("a", port_a, "/from-a"),
    )
    .await;
    h.send_bundle(
        now_unix() + 0.4,
        &send_after_tagged("b", port_b, "/from-b"),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.send_command(&Message::new("/flush").arg("a")).await;

    let received = recv_datagram(&dest_b, 1000).await.expect("tag b still fires");
    assert_eq!(decode_message(&received).unwrap().address, "/from-b");

    assert!(
        recv_datagram(&dest_a, 200).await.is_none(),
        "tag a was flushed"
    );
}

#[tokio::test]
async fn test_flush_unknown_tag_is_noop() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    h.send_command(&Message::new("/flush").arg("ghost")).await;

    // The dispatcher is still serving
    h.send_bundle(now_unix(), &send_after(port, "/alive")).await;
    assert!(recv_datagram(&dest, 500).await.is_some());
}

#[tokio::test]
async fn test_default_tag_flush_cancels_send_after() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    h.send_bundle(now_unix() + 0.5, &send_after(port, "/note")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.send_command(&Message::new("/flush").arg("default")).await;

    assert!(recv_datagram(&dest, 900).await.is_none());
}

#[tokio::test]
async fn test_invalid_input_does_not_stop_processing() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    // Garbage, an unknown immediate command, a malformed bundle element -
    // then a valid schedule
    h.client.send_to(&[0xDE, 0xAD, 0xBE], h.cmd_addr).await.unwrap();
    h.send_command(&Message::new("/no-such-command").arg(1)).await;
    h.send_bundle(now_unix(), &Message::new("/also-unknown")).await;

    h.send_bundle(now_unix(), &send_after(port, "/valid")).await;

    let received = recv_datagram(&dest, 500).await.expect("valid input processed");
    assert_eq!(decode_message(&received).unwrap().address, "/valid");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let s = h.metrics.snapshot();
    assert_eq!(s.decode_errors, 1);
    assert_eq!(s.unknown_commands, 2);
    assert_eq!(s.datagrams_received, 4);
}

#[tokio::test]
async fn test_relay_controls_via_dispatcher() {
    let h = start().await;
    let cue_client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let cue = encode(&Message::new("/beat").arg(1));

    // Relaying starts disabled
    cue_client.send_to(&cue, h.cue_addr).await.unwrap();
    assert!(recv_datagram(&h.observer, 300).await.is_none());

    h.send_command(&Message::new("/stop-start-cue-server").arg(1))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    cue_client.send_to(&cue, h.cue_addr).await.unwrap();
    let received = recv_datagram(&h.observer, 500).await.expect("cue relayed");
    let msg = decode_message(&received).unwrap();
    assert_eq!(msg.address, "/external-osc-cue");

    // Toggle the bind scope through the dispatcher; the relay keeps serving
    h.send_command(&Message::new("/internal-cue-port").arg(0)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    cue_client.send_to(&cue, h.cue_addr).await.unwrap();
    assert!(recv_datagram(&h.observer, 500).await.is_some());

    h.send_command(&Message::new("/internal-cue-port").arg(1)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    cue_client.send_to(&cue, h.cue_addr).await.unwrap();
    assert!(recv_datagram(&h.observer, 500).await.is_some());
}

#[tokio::test]
async fn test_flush_after_fire_is_harmless() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    h.send_bundle(now_unix() + 0.1, &send_after_tagged("late", port, "/x"))
        .await;

    // Let it fire, then flush the now-empty tag
    let received = recv_datagram(&dest, 1000).await;
    assert!(received.is_some());

    h.send_command(&Message::new("/flush").arg("late")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Still serving afterwards
    h.send_bundle(now_unix(), &send_after(port, "/after")).await;
    assert!(recv_datagram(&dest, 500).await.is_some());
}

#[tokio::test]
async fn test_malformed_schedule_commands_ignored() {
    let h = start().await;
    let (dest, port) = dest_socket().await;

    // Missing port and address
    h.send_bundle(now_unix(), &Message::new("/send_after").arg("127.0.0.1"))
        .await;
    // Port out of range
    h.send_bundle(
        now_unix(),
        &Message::new("/send_after")
            .arg("127.0.0.1")
            .arg(0)
            .arg("/x"),
    )
    .await;
    // Tagged without tag
    h.send_bundle(now_unix(), &Message::new("/send_after_tagged")).await;

    // Still serving
    h.send_bundle(now_unix(), &send_after(port, "/ok")).await;
    assert!(recv_datagram(&dest, 500).await.is_some());
}
