//! The result model: the error flag carries an error code exactly when
//! set, the thread-scoped triple mirrors the last completion, and the
//! descriptor/configuration surface validates its inputs.

use gpib_control::{
    BoardOption, DeviceConfig, Unit, last_count, last_error, last_status,
};
use gpib_protocol::{BusAddress, SendEnd, Timeout, error::ErrorCode};
use gpib_tests::board_with;

/// A primary address with nothing attached; sends to it find no listener.
fn absent_address() -> BusAddress {
    BusAddress::new(12).expect("valid primary")
}

#[test]
fn the_error_flag_carries_a_code_exactly_when_set() {
    let (board, addresses) = board_with(&[9]);

    let completion = board.send(addresses[0], b"*CLS", SendEnd::Eoi);
    assert!(!completion.status().err());
    assert_eq!(completion.error(), None);

    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    let (_, completion) = board.read(unit, 8);
    assert!(completion.status().err());
    assert!(completion.error().is_some());
}

#[test]
fn the_thread_triple_mirrors_the_last_completion() {
    let (board, addresses) = board_with(&[9]);
    let completion = board.send(addresses[0], b"DATA", SendEnd::Eoi);
    assert_eq!(last_status(), completion.status());
    assert_eq!(last_error(), None);
    assert_eq!(last_count(), 4);

    let failed = board.send(absent_address(), b"x", SendEnd::Eoi);
    assert_eq!(last_status(), failed.status());
    assert_eq!(last_error(), failed.error());
}

#[test]
fn threads_never_observe_each_others_results() {
    let (board, addresses) = board_with(&[9]);
    assert!(!board.send(addresses[0], b"ours", SendEnd::Eoi).is_err());
    let ours = (last_status(), last_error(), last_count());

    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                // Fresh thread, fresh triple.
                assert_eq!(last_count(), 0);
                let completion = board.send(absent_address(), b"x", SendEnd::Eoi);
                assert!(completion.is_err());
                assert_eq!(last_error(), completion.error());
            })
            .join()
            .expect("worker thread");
    });

    assert_eq!((last_status(), last_error(), last_count()), ours);
}

#[test]
fn device_options_configure_and_query() {
    let (board, addresses) = board_with(&[9]);
    let unit = board.open_device(DeviceConfig::new(addresses[0]));

    assert!(!board.configure(unit, BoardOption::Timeout, 5).is_err());
    let (value, completion) = board.query(unit, BoardOption::Timeout);
    assert!(!completion.is_err());
    assert_eq!(value, 5);
}

#[test]
fn board_only_options_are_rejected_on_devices() {
    let (board, addresses) = board_with(&[9]);
    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    let completion = board.configure(unit, BoardOption::SystemController, 1);
    assert_eq!(completion.error(), Some(ErrorCode::NoCapability));
}

#[test]
fn out_of_range_values_are_invalid_arguments() {
    let (board, _) = board_with(&[]);
    for (option, value) in [
        (BoardOption::Timeout, 99),
        (BoardOption::PrimaryAddress, 31),
        (BoardOption::SecondaryAddress, 0x5F),
    ] {
        let completion = board.configure(Unit::BOARD, option, value);
        assert_eq!(completion.error(), Some(ErrorCode::InvalidArgument));
    }
}

#[test]
fn stale_descriptors_report_invalid_handle() {
    let (board, addresses) = board_with(&[9]);
    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    assert!(!board.take_offline(unit).is_err());

    let completion = board.write(unit, b"late");
    assert_eq!(completion.error(), Some(ErrorCode::InvalidHandle));

    // Stale twice over: offlining again fails too.
    assert_eq!(
        board.take_offline(unit).error(),
        Some(ErrorCode::InvalidHandle)
    );
}

#[test]
fn taking_the_board_offline_restores_its_configuration() {
    let (board, addresses) = board_with(&[9]);
    let unit = board.open_device(DeviceConfig::new(addresses[0]));
    assert!(!board.configure(Unit::BOARD, BoardOption::Timeout, 5).is_err());

    assert!(!board.take_offline(Unit::BOARD).is_err());

    let (value, completion) = board.query(Unit::BOARD, BoardOption::Timeout);
    assert!(!completion.is_err());
    assert_eq!(value, u16::from(Timeout::default().code()));

    // Devices opened before went stale with the board.
    assert_eq!(board.write(unit, b"x").error(), Some(ErrorCode::InvalidHandle));
}
