//! Tests for the cue relay

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use cued_protocol::{decode_message, encode, Arg, Message};

use crate::metrics::RelayMetrics;
use crate::relay::{CueRelay, CueRelayConfig, FireContext, Forward, RelayHandle};
use crate::timer::TimerHandle;
use crate::tracker;

/// Relay under test plus everything needed to poke at it
struct Harness {
    relay: RelayHandle,
    intake_addr: SocketAddr,
    observer: UdpSocket,
    metrics: Arc<RelayMetrics>,
    _cancel: CancellationToken,
}

async fn start_relay(internal: bool, enabled: bool) -> Harness {
    let observer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let observer_port = observer.local_addr().unwrap().port();

    let config = CueRelayConfig {
        cue_port: 0,
        observer_host: "127.0.0.1".into(),
        observer_port,
        internal,
        enabled,
        heartbeat: Duration::from_secs(1),
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let (relay, handle) = CueRelay::bind(config, cancel.clone()).await.unwrap();
    let intake_addr = relay.local_addr().unwrap();
    let metrics = relay.metrics();
    tokio::spawn(relay.run());

    Harness {
        relay: handle,
        intake_addr,
        observer,
        metrics,
        _cancel: cancel,
    }
}

async fn recv_datagram(sock: &UdpSocket, ms: u64) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 64 * 1024];
    match timeout(Duration::from_millis(ms), sock.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}

#[tokio::test]
async fn test_forward_transmission() {
    let h = start_relay(true, false).await;
    let dest = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest_port = dest.local_addr().unwrap().port();

    h.relay.forward(Forward::new(
        0.0,
        "127.0.0.1",
        dest_port,
        Bytes::from_static(b"hello"),
    ));

    let received = recv_datagram(&dest, 500).await.expect("forward arrives");
    assert_eq!(received, b"hello");
    assert_eq!(h.metrics.snapshot().forwards_sent, 1);
}

#[tokio::test]
async fn test_forward_ignores_relay_flags() {
    // Disabled relaying and loopback-only intake must not affect forwards
    let h = start_relay(true, false).await;
    let dest = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest_port = dest.local_addr().unwrap().port();

    let payload = encode(&Message::new("/note").arg(60));
    h.relay
        .forward(Forward::new(1.5, "127.0.0.1", dest_port, payload.clone()));

    let received = recv_datagram(&dest, 500).await.expect("forward arrives");
    assert_eq!(received, &payload[..]);
}

#[tokio::test]
async fn test_stale_fire_dropped() {
    let h = start_relay(true, false).await;
    let dest = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest_port = dest.local_addr().unwrap().port();

    let handle = TimerHandle::for_test();
    handle.cancel();

    let mut forward = Forward::new(0.0, "127.0.0.1", dest_port, Bytes::from_static(b"late"));
    forward.fire = Some(FireContext {
        handle,
        tracker: tracker::spawn("stale"),
    });
    h.relay.forward(forward);

    assert!(recv_datagram(&dest, 300).await.is_none(), "stale fire leaked");
    assert_eq!(h.metrics.snapshot().stale_fires_dropped, 1);
    assert_eq!(h.metrics.snapshot().forwards_sent, 0);
}

#[tokio::test]
async fn test_cue_dropped_when_disabled() {
    let h = start_relay(true, false).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let cue = encode(&Message::new("/beat").arg(1));
    client.send_to(&cue, h.intake_addr).await.unwrap();

    assert!(recv_datagram(&h.observer, 300).await.is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let s = h.metrics.snapshot();
    assert_eq!(s.cues_received, 1);
    assert_eq!(s.cues_dropped, 1);
    assert_eq!(s.cues_relayed, 0);
}

#[tokio::test]
async fn test_cue_wrapped_and_relayed_when_enabled() {
    let h = start_relay(true, true).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_addr = client.local_addr().unwrap();
    let cue = encode(&Message::new("/beat").arg(4).arg("strong"));
    client.send_to(&cue, h.intake_addr).await.unwrap();

    let received = recv_datagram(&h.observer, 500).await.expect("cue relayed");
    let msg = decode_message(&received).unwrap();

    assert_eq!(msg.address, "/external-osc-cue");
    assert_eq!(msg.args[0], Arg::Str(client_addr.ip().to_string()));
    assert_eq!(msg.args[1], Arg::Int(i32::from(client_addr.port())));
    assert_eq!(msg.args[2], Arg::Str("/beat".into()));
    assert_eq!(msg.args[3], Arg::Int(4));
    assert_eq!(msg.args[4], Arg::Str("strong".into()));
}

#[tokio::test]
async fn test_set_enabled_at_runtime() {
    let h = start_relay(true, false).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    h.relay.set_enabled(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cue = encode(&Message::new("/go"));
    client.send_to(&cue, h.intake_addr).await.unwrap();
    assert!(recv_datagram(&h.observer, 500).await.is_some());

    h.relay.set_enabled(false);
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.send_to(&cue, h.intake_addr).await.unwrap();
    assert!(recv_datagram(&h.observer, 300).await.is_none());
}

#[tokio::test]
async fn test_internal_toggle_preserves_port() {
    let h = start_relay(true, true).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let cue = encode(&Message::new("/tick"));

    // Loopback -> open
    h.relay.set_internal(false);
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.send_to(&cue, h.intake_addr).await.unwrap();
    assert!(
        recv_datagram(&h.observer, 500).await.is_some(),
        "intake dead after rebind to open scope"
    );

    // Open -> loopback, same port again
    h.relay.set_internal(true);
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.send_to(&cue, h.intake_addr).await.unwrap();
    assert!(
        recv_datagram(&h.observer, 500).await.is_some(),
        "intake dead after rebind back to loopback"
    );

    assert_eq!(h.metrics.snapshot().rebinds, 2);
}

#[tokio::test]
async fn test_set_internal_same_scope_is_noop() {
    let h = start_relay(true, true).await;

    h.relay.set_internal(true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.metrics.snapshot().rebinds, 0);
}

#[tokio::test]
async fn test_malformed_cue_then_valid() {
    let h = start_relay(true, true).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    client.send_to(&[0xFF, 0xFE, 0x00], h.intake_addr).await.unwrap();

    let cue = encode(&Message::new("/still-alive"));
    client.send_to(&cue, h.intake_addr).await.unwrap();

    let received = recv_datagram(&h.observer, 500).await.expect("valid cue relayed");
    let msg = decode_message(&received).unwrap();
    assert_eq!(msg.args[2], Arg::Str("/still-alive".into()));
}
