//! Transfer termination: EOI, end-of-string and count limits on reads;
//! EOI signaling on writes, including the zero-length case.

use gpib_control::DeviceConfig;
use gpib_protocol::{Eos, ReadTermination, SendEnd, error::ErrorCode};
use gpib_tests::board_with;

#[test]
fn eoi_terminated_read_sets_end() {
    let (board, addresses) = board_with(&[9]);
    board.transport().push_response(addresses[0], b"+1.234E+0".to_vec());
    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    let (data, completion) = board.read(unit, 256);
    assert!(!completion.is_err());
    assert_eq!(data, b"+1.234E+0");
    assert_eq!(completion.count(), 9);
    assert!(completion.status().end());
}

#[test]
fn count_limited_read_does_not_set_end() {
    let (board, addresses) = board_with(&[9]);
    board.transport().push_response(addresses[0], b"abcdef".to_vec());
    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    let (data, completion) = board.read(unit, 4);
    assert!(!completion.is_err());
    assert_eq!(data, b"abcd");
    assert!(!completion.status().end());

    // The rest of the message is still there.
    let (rest, completion) = board.read(unit, 64);
    assert_eq!(rest, b"ef");
    assert!(completion.status().end());
}

#[test]
fn eos_terminated_read_stops_at_the_character() {
    let (board, addresses) = board_with(&[9]);
    board
        .transport()
        .push_response(addresses[0], b"line one\nline two\n".to_vec());
    let mut config = DeviceConfig::new(addresses[0]);
    config.eos = Some(Eos::new(b'\n').terminate_read(true));
    let unit = board.open_device(config);
    let (data, completion) = board.read(unit, 256);
    assert_eq!(data, b"line one\n");
    assert!(completion.status().end());
}

#[test]
fn empty_write_still_asserts_eoi() {
    let (board, addresses) = board_with(&[9]);
    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    let completion = board.write(unit, b"");
    assert!(!completion.is_err());
    assert_eq!(completion.count(), 0);
    // The zero-length transfer reached the instrument.
    assert_eq!(board.transport().received_by(addresses[0]), vec![Vec::new()]);
}

#[test]
fn newline_eoi_appends_a_terminated_newline() {
    let (board, addresses) = board_with(&[9]);
    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    let completion = board.write_with(unit, b"*RST", SendEnd::NewlineEoi);
    assert!(!completion.is_err());
    assert_eq!(completion.count(), 5);
    assert_eq!(
        board.transport().received_by(addresses[0]),
        vec![b"*RST".to_vec(), b"\n".to_vec()]
    );
}

#[test]
fn receive_with_explicit_eos_compares_all_eight_bits() {
    let (board, addresses) = board_with(&[9]);
    // 0x8A matches '\n' under a 7-bit compare but not under the full one.
    board
        .transport()
        .push_response(addresses[0], b"ab\x8Acd\nef".to_vec());
    let (data, completion) = board.receive(addresses[0], 256, ReadTermination::Eos(b'\n'));
    assert!(!completion.is_err());
    assert_eq!(data, b"ab\x8Acd\n");
    assert!(completion.status().end());
}

#[test]
fn read_with_no_talker_times_out() {
    let (board, addresses) = board_with(&[9]);
    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    let (data, completion) = board.read(unit, 64);
    assert!(data.is_empty());
    assert!(completion.is_err());
    assert_eq!(completion.error(), Some(ErrorCode::Aborted));
    assert!(completion.status().timed_out());
}
