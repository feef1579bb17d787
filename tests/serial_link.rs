//! DltInterface over the serial backend, with a pty master playing the device.
#![cfg(all(unix, feature = "serial"))]

use std::io::{Read, Write};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use serialport::{SerialPort, TTYPort};

use dltlink::{DltError, DltInterface, LinkState, MessageKind};

// TTYPort::pair is not thread safe
static PTY_LOCK: Mutex<()> = Mutex::new(());

fn open_link() -> (DltInterface, TTYPort, TTYPort) {
    let (mut device, slave) = TTYPort::pair().expect("pty pair");
    device.set_timeout(Duration::from_secs(1)).unwrap();
    let path = slave.name().expect("slave path");
    let link = DltInterface::new("serial", &path).unwrap();
    (link, device, slave)
}

fn read_within(link: &mut DltInterface, timeout: Duration) -> Option<(MessageKind, Vec<u8>)> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some((kind, payload)) = link.read() {
            return Some((kind, payload.to_vec()));
        }
        thread::sleep(Duration::from_millis(5));
    }
    None
}

#[test]
fn request_echo_and_response_over_serial() {
    let _guard = PTY_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (mut link, mut device, _slave) = open_link();
    assert_eq!(link.state(), LinkState::Connected);

    link.request(b"test").unwrap();
    let mut wire = [0u8; 7];
    device.read_exact(&mut wire).unwrap();
    assert_eq!(wire, [0x77, 0x01, 0x04, b't', b'e', b's', b't']);

    device.write_all(&wire).unwrap();
    let (kind, payload) = read_within(&mut link, Duration::from_secs(2)).expect("echo");
    assert_eq!(kind, MessageKind::Request);
    assert_eq!(payload, b"test");

    device.write_all(&[0x77, 0x02, 0x04, b'r', b'e', b's', b'p']).unwrap();
    let (kind, payload) = read_within(&mut link, Duration::from_secs(2)).expect("response");
    assert_eq!(kind, MessageKind::Response);
    assert_eq!(payload, b"resp");

    link.respond(b"ok").unwrap();
    let mut wire = [0u8; 5];
    device.read_exact(&mut wire).unwrap();
    assert_eq!(wire, [0x77, 0x02, 0x02, b'o', b'k']);

    link.close();
    assert_eq!(link.state(), LinkState::Stopped);
}

#[test]
fn device_hang_up_stops_the_link() {
    let _guard = PTY_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (mut link, device, _slave) = open_link();

    drop(device);
    let deadline = Instant::now() + Duration::from_secs(2);
    while link.state() != LinkState::Stopped && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(link.state(), LinkState::Stopped);
    assert!(matches!(link.request(b"more"), Err(DltError::Disconnected)));
    link.close();
}
