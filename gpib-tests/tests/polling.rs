//! Serial and parallel polling, service requests, and the SRQ line.

use gpib_control::{Board, last_count};
use gpib_protocol::{BusAddress, Timeout, command, error::ErrorCode};
use gpib_sim::SimBus;
use gpib_tests::board_with;

#[test]
fn serial_poll_returns_the_status_byte_and_clears_srq() {
    let (board, addresses) = board_with(&[9]);
    board.transport().set_status_byte(addresses[0], 0x50);
    let (asserted, _) = board.test_srq();
    assert!(asserted);

    let (byte, completion) = board.serial_poll(addresses[0]);
    assert!(!completion.is_err());
    assert_eq!(byte, 0x50);
    assert!(completion.status().needs_service());

    let (asserted, _) = board.test_srq();
    assert!(!asserted);
}

#[test]
fn serial_poll_follows_the_addressed_exchange() {
    let (board, addresses) = board_with(&[9]);
    board.transport().set_status_byte(addresses[0], 0x02);
    let (byte, completion) = board.serial_poll(addresses[0]);
    assert_eq!(byte, 0x02);
    // A non-requesting byte carries no RQS flag.
    assert!(!completion.status().needs_service());
    assert_eq!(
        board.transport().command_log(),
        vec![
            command::UNL,
            command::mla(0),
            command::mta(9),
            command::SPE,
            command::SPD,
            command::UNT,
        ]
    );
}

#[test]
fn serial_poll_works_without_being_in_charge() {
    let board = Board::<SimBus>::builder().build(SimBus::new());
    let address = BusAddress::new(9).unwrap();
    board.transport().attach(address);
    board.transport().set_status_byte(address, 0x41);
    let (byte, completion) = board.serial_poll(address);
    assert!(!completion.is_err());
    assert_eq!(byte, 0x41);
}

#[test]
fn serial_poll_all_keeps_one_byte_per_address() {
    let (board, addresses) = board_with(&[9]);
    board.transport().set_status_byte(addresses[0], 0x42);
    let list = [addresses[0], BusAddress::new(12).unwrap()];
    let (bytes, completion) = board.serial_poll_all(&list);
    assert_eq!(bytes, vec![0x42, 0]);
    assert!(completion.is_err());
    assert_eq!(completion.error(), Some(ErrorCode::Aborted));
    assert_eq!(completion.count(), 2);
}

#[test]
fn find_requesting_service_stops_at_the_first_requester() {
    let (board, addresses) = board_with(&[5, 9]);
    board.transport().set_status_byte(addresses[1], 0x41);
    let (index, byte, completion) = board.find_requesting_service(&addresses);
    assert!(!completion.is_err());
    assert_eq!(index, 1);
    assert_eq!(byte, 0x41);
    assert!(completion.status().needs_service());
}

#[test]
fn find_requesting_service_overflows_past_the_list() {
    let (board, addresses) = board_with(&[5, 9]);
    let (index, byte, completion) = board.find_requesting_service(&addresses);
    assert_eq!(index, addresses.len());
    assert_eq!(byte, 0);
    assert_eq!(completion.error(), Some(ErrorCode::TableOverflow));
    assert_eq!(last_count(), addresses.len());
}

#[test]
fn parallel_poll_configuration_and_response() {
    let (board, addresses) = board_with(&[9]);
    assert!(!board.parallel_poll_configure(addresses[0], 3, true).is_err());
    assert_eq!(
        board.transport().parallel_poll_config(addresses[0]),
        Some((3, true))
    );

    let (bits, completion) = board.parallel_poll();
    assert!(!completion.is_err());
    assert_eq!(bits, 0);

    board.transport().set_individual_status_of(addresses[0], true);
    let (bits, _) = board.parallel_poll();
    assert_eq!(bits, 0b0000_0100);

    assert!(!board.parallel_poll_unconfigure(&addresses).is_err());
    assert_eq!(board.transport().parallel_poll_config(addresses[0]), None);
}

#[test]
fn parallel_poll_rejects_an_invalid_data_line() {
    let (board, addresses) = board_with(&[9]);
    for line in [0, 9] {
        let completion = board.parallel_poll_configure(addresses[0], line, true);
        assert_eq!(completion.error(), Some(ErrorCode::InvalidArgument));
    }
}

#[test]
fn parallel_poll_requires_being_in_charge() {
    let board = Board::<SimBus>::builder().build(SimBus::new());
    let (_, completion) = board.parallel_poll();
    assert_eq!(completion.error(), Some(ErrorCode::NotController));
}

#[test]
fn broadcast_unconfigure_uses_the_universal_command() {
    let (board, _) = board_with(&[5, 9]);
    assert!(!board.parallel_poll_unconfigure(&[]).is_err());
    assert_eq!(board.transport().command_log(), vec![command::PPU]);
}

#[test]
fn request_service_reports_the_rqs_bit() {
    let (board, _) = board_with(&[]);
    let completion = board.request_service(0x40);
    assert!(!completion.is_err());
    assert!(completion.status().needs_service());
    assert!(!board.request_service(0x00).status().needs_service());
}

#[test]
fn wait_srq_times_out_when_nobody_requests() {
    let board = Board::<SimBus>::builder()
        .timeout(Timeout::Us10)
        .build(SimBus::new());
    assert!(!board.interface_clear().is_err());
    let (asserted, completion) = board.wait_srq();
    assert!(!asserted);
    assert_eq!(completion.error(), Some(ErrorCode::Aborted));
    assert!(completion.status().timed_out());
}

#[test]
fn wait_srq_sees_a_request() {
    let (board, addresses) = board_with(&[9]);
    board.transport().set_status_byte(addresses[0], 0x41);
    let (asserted, completion) = board.wait_srq();
    assert!(asserted);
    assert!(!completion.is_err());
}
