//! Addressing sequences as seen on the wire: talk/listen command bytes,
//! secondary addresses, and the broadcast forms of the multi-device
//! operations.

use gpib_protocol::{BusAddress, SendEnd, command};
use gpib_sim::SimBus;
use gpib_tests::board_with;

#[test]
fn send_addresses_listeners_then_board_to_talk() {
    let (board, addresses) = board_with(&[5, 9]);
    let completion = board.send_list(&addresses, b"*CLS", SendEnd::Eoi);
    assert!(!completion.is_err());
    assert_eq!(completion.count(), 4);
    assert_eq!(
        board.transport().command_log(),
        vec![command::UNL, 0x25, 0x29, command::mta(0)]
    );
    for address in &addresses {
        assert_eq!(board.transport().received_by(*address), vec![b"*CLS".to_vec()]);
    }
}

#[test]
fn receive_addresses_the_source_to_talk() {
    let (board, addresses) = board_with(&[9]);
    board.transport().push_response(addresses[0], b"ok".to_vec());
    let (data, completion) = board.receive(
        addresses[0],
        64,
        gpib_protocol::ReadTermination::End,
    );
    assert!(!completion.is_err());
    assert_eq!(data, b"ok");
    assert_eq!(
        board.transport().command_log(),
        vec![command::UNL, command::mla(0), command::mta(9)]
    );
}

#[test]
fn secondary_addresses_ride_in_the_listen_sequence() {
    let (board, _) = board_with(&[]);
    let extended = BusAddress::with_secondary(5, 0x62).unwrap();
    board.transport().attach(extended);
    let completion = board.send(extended, b"hi", SendEnd::Eoi);
    assert!(!completion.is_err());
    assert_eq!(
        board.transport().command_log(),
        vec![command::UNL, 0x25, 0x62, command::mta(0)]
    );
    assert_eq!(board.transport().received_by(extended), vec![b"hi".to_vec()]);
}

#[test]
fn broadcast_clear_reaches_every_device() {
    let (board, addresses) = board_with(&[5, 9]);
    let completion = board.clear_devices(&[]);
    assert!(!completion.is_err());
    assert_eq!(board.transport().command_log(), vec![command::DCL]);
    for address in &addresses {
        assert_eq!(board.transport().clear_count(*address), 1);
    }
}

#[test]
fn selected_clear_reaches_only_the_listed_device() {
    let (board, addresses) = board_with(&[5, 9]);
    let completion = board.clear_devices(&[addresses[1]]);
    assert!(!completion.is_err());
    assert_eq!(
        board.transport().command_log(),
        vec![command::UNL, 0x29, command::SDC]
    );
    assert_eq!(board.transport().clear_count(addresses[0]), 0);
    assert_eq!(board.transport().clear_count(addresses[1]), 1);
}

#[test]
fn broadcast_trigger_hits_the_addressed_set() {
    let (board, addresses) = board_with(&[5, 9]);
    assert!(!board.send_setup(&addresses).is_err());
    assert!(!board.trigger(&[]).is_err());
    for address in &addresses {
        assert_eq!(board.transport().trigger_count(*address), 1);
    }
}

#[test]
fn find_listeners_reports_attached_devices() {
    let (board, _) = board_with(&[5, 9]);
    let probes = [
        BusAddress::new(5).unwrap(),
        BusAddress::new(9).unwrap(),
        BusAddress::new(12).unwrap(),
    ];
    let (found, completion) = board.find_listeners(&probes, 30);
    assert!(!completion.is_err());
    assert_eq!(completion.count(), 2);
    assert_eq!(found, vec![probes[0], probes[1]]);
}

#[test]
fn find_listeners_respects_the_limit() {
    let (board, _) = board_with(&[5, 9]);
    let probes = [BusAddress::new(5).unwrap(), BusAddress::new(9).unwrap()];
    let (found, completion) = board.find_listeners(&probes, 1);
    assert!(!completion.is_err());
    assert_eq!(found.len(), 1);
    assert_eq!(completion.count(), 1);
}
