//! # GPIB Bus Simulator
//!
//! An in-memory IEEE-488 bus backend for exercising the control plane
//! without hardware. The simulator decodes the interface command bytes it
//! receives, tracks the addressed talker and listeners, and routes data
//! to scriptable instruments.
//!
//! ## Overview
//!
//! [`SimBus`] implements [`Transport`]. Instruments are attached at bus
//! addresses and scripted through the bus handle: queue response messages,
//! install serial poll status bytes, configure parallel poll answers.
//! Every command byte that crosses the bus is appended to a log that tests
//! can inspect to verify addressing sequences.
//!
//! ```
//! use gpib_protocol::BusAddress;
//! use gpib_sim::SimBus;
//!
//! let bus = SimBus::new();
//! let dmm = BusAddress::new(9).unwrap();
//! bus.attach(dmm);
//! bus.push_response(dmm, b"+1.234E+0".to_vec());
//! ```

use gpib_control::{EndReason, LineStates, Reception, RoleState, Transport, TransportError};
use gpib_protocol::{BusAddress, Eos, Timeout, command};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// The requesting-service bit of a serial poll status byte.
const RQS_BIT: u8 = 0x40;

/// Whether the last primary address byte selected the talk or the listen
/// lane; a following secondary command refines it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Lane {
    Talk,
    Listen,
}

#[derive(Debug)]
struct Instrument {
    address: BusAddress,
    responses: VecDeque<Vec<u8>>,
    received: Vec<Vec<u8>>,
    status_byte: u8,
    individual_status: bool,
    parallel_poll: Option<(u8, bool)>,
    listening: bool,
    remote: bool,
    lockout: bool,
    clear_count: u32,
    trigger_count: u32,
    accepts_control: bool,
}

impl Instrument {
    fn new(address: BusAddress) -> Instrument {
        Instrument {
            address,
            responses: VecDeque::new(),
            received: Vec::new(),
            status_byte: 0,
            individual_status: false,
            parallel_poll: None,
            listening: false,
            remote: false,
            lockout: false,
            clear_count: 0,
            trigger_count: 0,
            accepts_control: true,
        }
    }
}

struct SimState {
    instruments: Vec<Instrument>,
    talker: Option<BusAddress>,
    board_talker: bool,
    board_listener: bool,
    pending: Option<(u8, Lane)>,
    ppc_armed: bool,
    serial_poll_mode: bool,
    cic: bool,
    atn: bool,
    ren: bool,
    timeout: Timeout,
    board_status: u8,
    board_ist: bool,
    command_log: Vec<u8>,
}

/// A simulated GPIB bus.
///
/// The simulated transceiver starts outside the Controller-in-Charge role;
/// an Interface Clear pulse puts it in charge, like powering up a system
/// controller board next to an already-running bus.
pub struct SimBus {
    board_primary: u8,
    state: Mutex<SimState>,
}

impl Default for SimBus {
    fn default() -> Self {
        SimBus::new()
    }
}

impl SimBus {
    /// A bus whose controller board answers to primary address 0.
    pub fn new() -> SimBus {
        SimBus::with_board_address(0)
    }

    /// A bus whose controller board answers to the given primary address.
    pub fn with_board_address(board_primary: u8) -> SimBus {
        SimBus {
            board_primary,
            state: Mutex::new(SimState {
                instruments: Vec::new(),
                talker: None,
                board_talker: false,
                board_listener: false,
                pending: None,
                ppc_armed: false,
                serial_poll_mode: false,
                cic: false,
                atn: false,
                ren: false,
                timeout: Timeout::default(),
                board_status: 0,
                board_ist: false,
                command_log: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attaches an instrument at `address`. Re-attaching an occupied
    /// address replaces the previous instrument.
    pub fn attach(&self, address: BusAddress) {
        let mut state = self.lock();
        state.instruments.retain(|instrument| instrument.address != address);
        state.instruments.push(Instrument::new(address));
        log::debug!("attached instrument at {}", address);
    }

    /// Queues a message the instrument will talk when addressed. The
    /// instrument asserts EOI with the final byte of each message.
    pub fn push_response(&self, address: BusAddress, message: Vec<u8>) {
        self.with_instrument(address, |instrument| {
            instrument.responses.push_back(message)
        });
    }

    /// Installs the instrument's serial poll status byte. A set RQS bit
    /// asserts the Service Request line until the instrument is polled.
    pub fn set_status_byte(&self, address: BusAddress, byte: u8) {
        self.with_instrument(address, |instrument| instrument.status_byte = byte);
    }

    /// Sets the instrument's individual status bit, its parallel poll
    /// answer input.
    pub fn set_individual_status_of(&self, address: BusAddress, ist: bool) {
        self.with_instrument(address, |instrument| instrument.individual_status = ist);
    }

    /// Scripts whether the instrument accepts a pass-control handoff.
    pub fn set_accepts_control(&self, address: BusAddress, accepts: bool) {
        self.with_instrument(address, |instrument| instrument.accepts_control = accepts);
    }

    /// The messages written to the instrument so far, one entry per data
    /// send.
    pub fn received_by(&self, address: BusAddress) -> Vec<Vec<u8>> {
        self.with_instrument(address, |instrument| instrument.received.clone())
            .unwrap_or_default()
    }

    /// How many device clears (selected or universal) the instrument saw.
    pub fn clear_count(&self, address: BusAddress) -> u32 {
        self.with_instrument(address, |instrument| instrument.clear_count)
            .unwrap_or(0)
    }

    /// How many triggers the instrument saw.
    pub fn trigger_count(&self, address: BusAddress) -> u32 {
        self.with_instrument(address, |instrument| instrument.trigger_count)
            .unwrap_or(0)
    }

    /// Whether the instrument is in remote state.
    pub fn is_remote(&self, address: BusAddress) -> bool {
        self.with_instrument(address, |instrument| instrument.remote)
            .unwrap_or(false)
    }

    /// Whether the instrument is locked out of local control.
    pub fn in_lockout(&self, address: BusAddress) -> bool {
        self.with_instrument(address, |instrument| instrument.lockout)
            .unwrap_or(false)
    }

    /// The instrument's parallel poll assignment: data line and sense.
    pub fn parallel_poll_config(&self, address: BusAddress) -> Option<(u8, bool)> {
        self.with_instrument(address, |instrument| instrument.parallel_poll)
            .flatten()
    }

    /// Every interface command byte sent so far, in bus order.
    pub fn command_log(&self) -> Vec<u8> {
        self.lock().command_log.clone()
    }

    /// Empties the command log, typically between test phases.
    pub fn clear_command_log(&self) {
        self.lock().command_log.clear();
    }

    fn with_instrument<R>(
        &self,
        address: BusAddress,
        f: impl FnOnce(&mut Instrument) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        match state
            .instruments
            .iter_mut()
            .find(|instrument| instrument.address == address)
        {
            Some(instrument) => Some(f(instrument)),
            None => {
                log::warn!("no instrument at {}", address);
                None
            }
        }
    }
}

impl SimState {
    fn apply_command(&mut self, board_primary: u8, byte: u8) {
        match byte {
            command::UNL => {
                for instrument in &mut self.instruments {
                    instrument.listening = false;
                }
                self.board_listener = false;
                self.pending = None;
            }
            command::UNT => {
                self.talker = None;
                self.board_talker = false;
                self.pending = None;
            }
            command::GTL => {
                for instrument in self.instruments.iter_mut().filter(|i| i.listening) {
                    instrument.remote = false;
                }
            }
            command::SDC => {
                for instrument in self.instruments.iter_mut().filter(|i| i.listening) {
                    instrument.clear_count += 1;
                }
            }
            command::DCL => {
                for instrument in &mut self.instruments {
                    instrument.clear_count += 1;
                }
            }
            command::GET => {
                for instrument in self.instruments.iter_mut().filter(|i| i.listening) {
                    instrument.trigger_count += 1;
                }
            }
            command::LLO => {
                if self.ren {
                    for instrument in &mut self.instruments {
                        instrument.lockout = true;
                    }
                }
            }
            command::SPE => self.serial_poll_mode = true,
            command::SPD => self.serial_poll_mode = false,
            command::PPC => self.ppc_armed = true,
            command::PPU => {
                for instrument in &mut self.instruments {
                    instrument.parallel_poll = None;
                }
                self.ppc_armed = false;
            }
            command::TCT => {
                if let Some(address) = self.talker
                    && let Some(instrument) = self
                        .instruments
                        .iter()
                        .find(|instrument| instrument.address == address)
                    && instrument.accepts_control
                {
                    log::debug!("{} took control", address);
                    self.cic = false;
                }
            }
            0x20..=0x3E => self.address_primary(board_primary, byte & 0x1F, Lane::Listen),
            0x40..=0x5E => self.address_primary(board_primary, byte & 0x1F, Lane::Talk),
            0x60..=0x7E => self.secondary_group(byte),
            _ => log::warn!("unhandled interface command {:#04x}", byte),
        }
    }

    fn address_primary(&mut self, board_primary: u8, pad: u8, lane: Lane) {
        self.pending = Some((pad, lane));
        if lane == Lane::Talk {
            // A talk address implicitly untalks everyone else.
            self.talker = None;
            self.board_talker = false;
        }
        if pad == board_primary {
            match lane {
                Lane::Talk => self.board_talker = true,
                Lane::Listen => self.board_listener = true,
            }
            return;
        }
        let ren = self.ren;
        let plain = self
            .instruments
            .iter_mut()
            .find(|instrument| {
                instrument.address.primary() == pad && instrument.address.secondary().is_none()
            });
        let Some(instrument) = plain else { return };
        match lane {
            Lane::Talk => self.talker = Some(instrument.address),
            Lane::Listen => {
                instrument.listening = true;
                if ren {
                    instrument.remote = true;
                }
            }
        }
    }

    fn secondary_group(&mut self, byte: u8) {
        if self.ppc_armed {
            if byte & 0x10 == 0 {
                let line = (byte & 0x07) + 1;
                let sense = byte & 0x08 != 0;
                for instrument in self.instruments.iter_mut().filter(|i| i.listening) {
                    instrument.parallel_poll = Some((line, sense));
                }
            } else {
                for instrument in self.instruments.iter_mut().filter(|i| i.listening) {
                    instrument.parallel_poll = None;
                }
            }
            self.ppc_armed = false;
            return;
        }
        let Some((pad, lane)) = self.pending else {
            log::warn!("secondary command {:#04x} without a primary address", byte);
            return;
        };
        let ren = self.ren;
        let extended = self.instruments.iter_mut().find(|instrument| {
            instrument.address.primary() == pad && instrument.address.secondary() == Some(byte)
        });
        let Some(instrument) = extended else { return };
        match lane {
            Lane::Talk => self.talker = Some(instrument.address),
            Lane::Listen => {
                instrument.listening = true;
                if ren {
                    instrument.remote = true;
                }
            }
        }
    }

    fn srq(&self) -> bool {
        self.instruments
            .iter()
            .any(|instrument| instrument.status_byte & RQS_BIT != 0)
    }

    fn talker_mut(&mut self) -> Option<&mut Instrument> {
        let address = self.talker?;
        self.instruments
            .iter_mut()
            .find(|instrument| instrument.address == address)
    }
}

impl Transport for SimBus {
    fn send_commands(&self, commands: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();
        for &byte in commands {
            state.command_log.push(byte);
            state.apply_command(self.board_primary, byte);
        }
        Ok(commands.len())
    }

    fn send_data(&self, data: &[u8], assert_eoi: bool) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if !state.instruments.iter().any(|i| i.listening) {
            return Err(TransportError::NoListener);
        }
        log::trace!("data out: {} bytes (eoi: {})", data.len(), assert_eoi);
        for instrument in state.instruments.iter_mut().filter(|i| i.listening) {
            instrument.received.push(data.to_vec());
        }
        Ok(data.len())
    }

    fn receive_data(&self, max: usize, eos: Option<Eos>) -> Result<Reception, TransportError> {
        let mut state = self.lock();
        if state.serial_poll_mode {
            let Some(instrument) = state.talker_mut() else {
                return Err(TransportError::Timeout);
            };
            let byte = instrument.status_byte;
            // The poll clears the request.
            instrument.status_byte &= !RQS_BIT;
            return Ok(Reception {
                data: vec![byte],
                end: EndReason::CountReached,
            });
        }
        let Some(instrument) = state.talker_mut() else {
            return Err(TransportError::Timeout);
        };
        let Some(mut message) = instrument.responses.pop_front() else {
            return Err(TransportError::Timeout);
        };
        let mut data = Vec::new();
        let mut end = EndReason::Eoi;
        while let Some(&byte) = message.first() {
            if data.len() >= max {
                end = EndReason::CountReached;
                break;
            }
            message.remove(0);
            data.push(byte);
            if let Some(eos) = eos
                && eos.matches(byte)
            {
                end = EndReason::EosMatch;
                break;
            }
        }
        if !message.is_empty() {
            instrument.responses.push_front(message);
        }
        Ok(Reception { data, end })
    }

    fn set_remote_enable(&self, assert: bool) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.ren = assert;
        if !assert {
            for instrument in &mut state.instruments {
                instrument.remote = false;
                instrument.lockout = false;
            }
        }
        Ok(())
    }

    fn pulse_interface_clear(&self, dwell: Duration) -> Result<(), TransportError> {
        log::debug!("interface clear pulse ({:?})", dwell);
        let mut state = self.lock();
        state.cic = true;
        state.atn = false;
        state.serial_poll_mode = false;
        state.ppc_armed = false;
        state.pending = None;
        state.talker = None;
        state.board_talker = false;
        state.board_listener = false;
        for instrument in &mut state.instruments {
            instrument.listening = false;
        }
        Ok(())
    }

    fn set_attention(&self, assert: bool) -> Result<(), TransportError> {
        self.lock().atn = assert;
        Ok(())
    }

    fn parallel_poll(&self) -> Result<u8, TransportError> {
        let state = self.lock();
        let mut bits = 0u8;
        for instrument in &state.instruments {
            if let Some((line, sense)) = instrument.parallel_poll
                && instrument.individual_status == sense
            {
                bits |= 1 << (line - 1);
            }
        }
        Ok(bits)
    }

    fn lines(&self) -> Result<LineStates, TransportError> {
        let state = self.lock();
        Ok(LineStates {
            srq: Some(state.srq()),
            atn: Some(state.atn),
            ren: Some(state.ren),
            ifc: Some(false),
            ..LineStates::default()
        })
    }

    fn role(&self) -> Result<RoleState, TransportError> {
        let state = self.lock();
        Ok(RoleState {
            system_controller: true,
            cic: state.cic,
            atn: state.atn,
            remote: false,
            lockout: false,
            talker: state.board_talker,
            listener: state.board_listener,
        })
    }

    fn listener_present(&self, address: BusAddress) -> Result<bool, TransportError> {
        let state = self.lock();
        Ok(state
            .instruments
            .iter()
            .any(|instrument| instrument.address == address))
    }

    fn set_timeout(&self, timeout: Timeout) -> Result<(), TransportError> {
        self.lock().timeout = timeout;
        Ok(())
    }

    fn request_service(&self, status_byte: u8) -> Result<(), TransportError> {
        self.lock().board_status = status_byte;
        Ok(())
    }

    fn set_individual_status(&self, ist: bool) -> Result<(), TransportError> {
        self.lock().board_ist = ist;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addressed_bus() -> (SimBus, BusAddress) {
        let bus = SimBus::new();
        let address = BusAddress::new(9).unwrap();
        bus.attach(address);
        bus.pulse_interface_clear(Duration::from_micros(100)).unwrap();
        (bus, address)
    }

    #[test]
    fn interface_clear_takes_charge() {
        let bus = SimBus::new();
        assert!(!bus.role().unwrap().cic);
        bus.pulse_interface_clear(Duration::from_micros(100)).unwrap();
        assert!(bus.role().unwrap().cic);
    }

    #[test]
    fn data_routes_to_addressed_listener() {
        let (bus, address) = addressed_bus();
        bus.send_commands(&[command::UNL, address.listen_command()])
            .unwrap();
        bus.send_data(b"*IDN?", true).unwrap();
        assert_eq!(bus.received_by(address), vec![b"*IDN?".to_vec()]);
    }

    #[test]
    fn send_without_listeners_is_an_error() {
        let (bus, _) = addressed_bus();
        assert_eq!(bus.send_data(b"x", true), Err(TransportError::NoListener));
    }

    #[test]
    fn talker_message_ends_with_eoi() {
        let (bus, address) = addressed_bus();
        bus.push_response(address, b"+1.0E+0".to_vec());
        bus.send_commands(&[address.talk_command()]).unwrap();
        let reception = bus.receive_data(64, None).unwrap();
        assert_eq!(reception.data, b"+1.0E+0");
        assert_eq!(reception.end, EndReason::Eoi);
    }

    #[test]
    fn count_limit_leaves_the_rest_of_the_message() {
        let (bus, address) = addressed_bus();
        bus.push_response(address, b"abcdef".to_vec());
        bus.send_commands(&[address.talk_command()]).unwrap();
        let first = bus.receive_data(4, None).unwrap();
        assert_eq!(first.data, b"abcd");
        assert_eq!(first.end, EndReason::CountReached);
        let rest = bus.receive_data(64, None).unwrap();
        assert_eq!(rest.data, b"ef");
        assert_eq!(rest.end, EndReason::Eoi);
    }

    #[test]
    fn eos_match_stops_the_receive() {
        let (bus, address) = addressed_bus();
        bus.push_response(address, b"line\nmore".to_vec());
        bus.send_commands(&[address.talk_command()]).unwrap();
        let eos = Eos::new(b'\n').terminate_read(true);
        let reception = bus.receive_data(64, Some(eos)).unwrap();
        assert_eq!(reception.data, b"line\n");
        assert_eq!(reception.end, EndReason::EosMatch);
    }

    #[test]
    fn receive_without_talker_times_out() {
        let (bus, _) = addressed_bus();
        assert_eq!(bus.receive_data(8, None), Err(TransportError::Timeout));
    }

    #[test]
    fn serial_poll_mode_yields_the_status_byte_and_clears_rqs() {
        let (bus, address) = addressed_bus();
        bus.set_status_byte(address, 0x50);
        assert_eq!(bus.lines().unwrap().srq, Some(true));
        bus.send_commands(&[address.talk_command(), command::SPE])
            .unwrap();
        let reception = bus.receive_data(1, None).unwrap();
        assert_eq!(reception.data, vec![0x50]);
        bus.send_commands(&[command::SPD, command::UNT]).unwrap();
        assert_eq!(bus.lines().unwrap().srq, Some(false));
    }

    #[test]
    fn parallel_poll_configuration_and_response() {
        let (bus, address) = addressed_bus();
        bus.send_commands(&[
            command::UNL,
            address.listen_command(),
            command::PPC,
            command::ppe(3, true),
            command::UNL,
        ])
        .unwrap();
        assert_eq!(bus.parallel_poll_config(address), Some((3, true)));
        assert_eq!(bus.parallel_poll().unwrap(), 0);
        bus.set_individual_status_of(address, true);
        assert_eq!(bus.parallel_poll().unwrap(), 0b0000_0100);
        bus.send_commands(&[command::PPU]).unwrap();
        assert_eq!(bus.parallel_poll_config(address), None);
    }

    #[test]
    fn lockout_needs_remote_enable() {
        let (bus, address) = addressed_bus();
        bus.send_commands(&[command::LLO]).unwrap();
        assert!(!bus.in_lockout(address));
        bus.set_remote_enable(true).unwrap();
        bus.send_commands(&[command::LLO]).unwrap();
        assert!(bus.in_lockout(address));
        bus.set_remote_enable(false).unwrap();
        assert!(!bus.in_lockout(address));
    }

    #[test]
    fn secondary_addressing_reaches_extended_instruments() {
        let bus = SimBus::new();
        let extended = BusAddress::with_secondary(5, 0x62).unwrap();
        bus.attach(extended);
        bus.pulse_interface_clear(Duration::from_micros(100)).unwrap();
        bus.send_commands(&[command::UNL, extended.listen_command(), 0x62])
            .unwrap();
        bus.send_data(b"hi", true).unwrap();
        assert_eq!(bus.received_by(extended), vec![b"hi".to_vec()]);
    }

    #[test]
    fn pass_control_hands_off_when_accepted() {
        let (bus, address) = addressed_bus();
        bus.send_commands(&[address.talk_command(), command::TCT])
            .unwrap();
        assert!(!bus.role().unwrap().cic);
    }

    #[test]
    fn pass_control_refused_keeps_charge() {
        let (bus, address) = addressed_bus();
        bus.set_accepts_control(address, false);
        bus.send_commands(&[address.talk_command(), command::TCT])
            .unwrap();
        assert!(bus.role().unwrap().cic);
    }
}
