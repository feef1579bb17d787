//! DltInterface end to end over the in-memory loopback link.

use std::thread;
use std::time::{Duration, Instant};

use dltlink::dlt::codec::encode;
use dltlink::dlt::{BackendTuning, LoopbackPeer, LoopbackTransport};
use dltlink::{DltError, DltInterface, LinkState, MessageKind};

fn tuning() -> BackendTuning {
    BackendTuning {
        read_timeout: Duration::from_millis(10),
        ..BackendTuning::default()
    }
}

fn open(tuning: BackendTuning) -> (DltInterface, LoopbackPeer) {
    let (transport, peer) = LoopbackTransport::pair();
    let link = DltInterface::from_transport(Box::new(transport), tuning).unwrap();
    (link, peer)
}

fn read_within(link: &mut DltInterface, timeout: Duration) -> Option<(MessageKind, Vec<u8>)> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some((kind, payload)) = link.read() {
            return Some((kind, payload.to_vec()));
        }
        thread::sleep(Duration::from_millis(2));
    }
    None
}

fn wait_for_state(link: &DltInterface, state: LinkState, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if link.state() == state {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn request_goes_out_as_seven_byte_frame_and_echo_comes_back() {
    let (mut link, peer) = open(tuning());
    assert!(link.is_connected());

    link.request(b"test").unwrap();
    let wire = peer.read_exact_timeout(7, Duration::from_secs(1));
    assert_eq!(wire, vec![0x77, 0x01, 0x04, b't', b'e', b's', b't']);

    peer.write(&wire);
    let (kind, payload) = read_within(&mut link, Duration::from_secs(1)).expect("frame");
    assert_eq!(kind, MessageKind::Request);
    assert_eq!(payload, b"test");

    link.close();
}

#[test]
fn link_reports_connected_right_after_construction() {
    for _ in 0..50 {
        let (mut link, _peer) = open(tuning());
        assert_eq!(link.state(), LinkState::Connected);
        assert!(link.is_connected());
        link.close();
    }
}

#[test]
fn respond_uses_response_code() {
    let (mut link, peer) = open(tuning());
    link.respond(b"test").unwrap();
    let wire = peer.read_exact_timeout(7, Duration::from_secs(1));
    assert_eq!(&wire[..3], &[0x77, 0x02, 0x04]);
    assert_eq!(&wire[3..], b"test");
    link.close();
}

#[test]
fn read_on_idle_link_returns_none_immediately() {
    let (mut link, _peer) = open(BackendTuning::default());
    let start = Instant::now();
    assert!(link.read().is_none());
    assert!(start.elapsed() < Duration::from_millis(10));
    link.close();
}

#[test]
fn writes_reach_the_wire_in_call_order() {
    let (mut link, peer) = open(tuning());
    let a = vec![0xAA; 40];
    let b = vec![0xBB; 3];
    link.request(&a).unwrap();
    link.request(&b).unwrap();

    let wire = peer.read_exact_timeout(43 + 6, Duration::from_secs(1));
    let mut expected = encode(&a, MessageKind::Request).unwrap().to_vec();
    expected.extend_from_slice(&encode(&b, MessageKind::Request).unwrap());
    assert_eq!(wire, expected);
    link.close();
}

#[test]
fn inbound_frames_keep_arrival_order_through_noise() {
    let (mut link, peer) = open(tuning());
    let mut stream = vec![0x00, 0x11];
    stream.extend_from_slice(&encode(b"one", MessageKind::Request).unwrap());
    stream.push(0x42);
    stream.extend_from_slice(&encode(b"two", MessageKind::Response).unwrap());
    stream.extend_from_slice(&encode(b"three", MessageKind::Request).unwrap());
    peer.write(&stream);

    let mut got = Vec::new();
    while got.len() < 3 {
        match read_within(&mut link, Duration::from_secs(1)) {
            Some((_, payload)) => got.push(payload),
            None => break,
        }
    }
    assert_eq!(got, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    assert_eq!(link.stats().desync_bytes, 3);
    link.close();
}

#[test]
fn empty_frames_are_dropped_by_default() {
    let (mut link, peer) = open(tuning());
    peer.write(&encode(b"", MessageKind::Request).unwrap());
    peer.write(&encode(b"x", MessageKind::Request).unwrap());

    let (_, payload) = read_within(&mut link, Duration::from_secs(1)).expect("frame");
    assert_eq!(payload, b"x");
    assert!(link.read().is_none());
    assert_eq!(link.stats().empty_frames_dropped, 1);
    link.close();
}

#[test]
fn empty_frames_delivered_when_enabled() {
    let (mut link, peer) = open(BackendTuning {
        deliver_empty_frames: true,
        ..tuning()
    });
    peer.write(&encode(b"", MessageKind::Response).unwrap());
    let (kind, payload) = read_within(&mut link, Duration::from_secs(1)).expect("frame");
    assert_eq!(kind, MessageKind::Response);
    assert!(payload.is_empty());
    link.close();
}

#[test]
fn unknown_kind_is_delivered_as_received() {
    let (mut link, peer) = open(tuning());
    peer.write(&[0x77, 0x05, 0x01, 0x09]);
    let (kind, payload) = read_within(&mut link, Duration::from_secs(1)).expect("frame");
    assert_eq!(kind, MessageKind::Unknown(0x05));
    assert_eq!(payload, vec![0x09]);
    assert_eq!(link.stats().unknown_kind_frames, 1);
    link.close();
}

#[test]
fn oversized_payload_fails_before_write() {
    let (mut link, peer) = open(tuning());
    let err = link.request(&[0u8; 256]).unwrap_err();
    assert!(matches!(err, DltError::PayloadTooLarge(256)));
    thread::sleep(Duration::from_millis(30));
    assert!(peer.take_written().is_empty());
    link.close();
}

#[test]
fn close_releases_transport_once_and_is_idempotent() {
    let (mut link, peer) = open(tuning());
    link.close();
    assert_eq!(link.state(), LinkState::Stopped);
    assert_eq!(peer.disconnect_count(), 1);
    assert!(!peer.is_connected());

    link.close();
    drop(link);
    assert_eq!(peer.disconnect_count(), 1);
}

#[test]
fn close_returns_within_a_read_timeout() {
    let (mut link, _peer) = open(BackendTuning {
        read_timeout: Duration::from_millis(50),
        ..BackendTuning::default()
    });
    let start = Instant::now();
    link.close();
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn response_queued_just_before_close_is_flushed() {
    let (mut link, peer) = open(tuning());
    link.respond(b"resp").unwrap();
    link.close();
    assert_eq!(peer.take_written(), encode(b"resp", MessageKind::Response).unwrap().to_vec());
}

#[test]
fn drop_closes_the_link() {
    let (link, peer) = open(tuning());
    drop(link);
    assert_eq!(peer.disconnect_count(), 1);
}

#[test]
fn lost_transport_stops_worker_and_reports_disconnected() {
    let (mut link, peer) = open(tuning());
    peer.write(&encode(b"last", MessageKind::Request).unwrap());
    thread::sleep(Duration::from_millis(50));
    peer.hang_up();

    assert!(wait_for_state(&link, LinkState::Stopped, Duration::from_secs(1)));
    assert!(!link.is_connected());
    assert!(matches!(link.request(b"more"), Err(DltError::Disconnected)));

    // frames that made it in before the loss are still readable
    let (_, payload) = read_within(&mut link, Duration::from_millis(100)).expect("queued frame");
    assert_eq!(payload, b"last");
    assert!(link.read().is_none());

    link.close();
    assert_eq!(peer.disconnect_count(), 1);
}

#[test]
fn refused_connection_fails_construction() {
    let (transport, peer) = LoopbackTransport::pair();
    peer.refuse_connections();
    let result = DltInterface::from_transport(Box::new(transport), tuning());
    assert!(matches!(result, Err(DltError::Transport(_))));
}

#[test]
fn unknown_backend_name_fails_fast() {
    let result = DltInterface::new("bluetooth", "/dev/null");
    assert!(matches!(result, Err(DltError::UnsupportedBackend(ref name)) if name == "bluetooth"));
}

#[cfg(feature = "serial")]
#[test]
fn serial_backend_on_missing_device_is_transport_error() {
    let result = DltInterface::new("serial", "/dev/does-not-exist-dlt");
    assert!(matches!(result, Err(DltError::Transport(_))));
}

#[test]
fn stats_count_traffic() {
    let (mut link, peer) = open(tuning());
    link.request(b"ping").unwrap();
    let _ = peer.read_exact_timeout(7, Duration::from_secs(1));
    peer.write(&encode(b"pong", MessageKind::Response).unwrap());
    let _ = read_within(&mut link, Duration::from_secs(1)).expect("frame");

    let stats = link.stats();
    assert_eq!(stats.frames_sent, 1);
    assert_eq!(stats.bytes_sent, 7);
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.bytes_received, 7);
    link.close();
}
