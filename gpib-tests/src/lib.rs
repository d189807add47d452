//! Shared fixtures for the integration tests: boards over the simulated
//! bus, and a gated transport that blocks receives until released so
//! asynchronous paths can be tested without races.

use gpib_control::{
    Board, LineStates, Reception, RoleState, Transport, TransportError,
};
use gpib_protocol::{BusAddress, Eos, Timeout};
use gpib_sim::SimBus;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A board in charge of a simulated bus with instruments at the given
/// primary addresses. The interface is already reset and the command log
/// cleared, so tests see only their own traffic.
pub fn board_with(addresses: &[u8]) -> (Board<SimBus>, Vec<BusAddress>) {
    let bus = SimBus::new();
    let mut attached = Vec::new();
    for pad in addresses {
        let address = BusAddress::new(*pad).expect("fixture addresses are valid");
        bus.attach(address);
        attached.push(address);
    }
    let board = Board::<SimBus>::builder().system_controller(true).build(bus);
    assert!(!board.reset_interface().is_err());
    board.transport().clear_command_log();
    (board, attached)
}

/// A transport that delegates to a [`SimBus`] but holds every receive at a
/// gate until [`release`](GatedBus::release) opens it. Lets a test park an
/// asynchronous read deterministically.
pub struct GatedBus {
    inner: SimBus,
    open: Mutex<bool>,
    gate: Condvar,
}

impl GatedBus {
    pub fn new(inner: SimBus) -> GatedBus {
        GatedBus {
            inner,
            open: Mutex::new(false),
            gate: Condvar::new(),
        }
    }

    pub fn sim(&self) -> &SimBus {
        &self.inner
    }

    /// Opens the gate; parked and future receives proceed.
    pub fn release(&self) {
        let mut open = self.open.lock().expect("gate lock");
        *open = true;
        self.gate.notify_all();
    }

    fn wait_for_gate(&self) {
        let mut open = self.open.lock().expect("gate lock");
        while !*open {
            open = self.gate.wait(open).expect("gate lock");
        }
    }
}

impl Transport for GatedBus {
    fn send_commands(&self, commands: &[u8]) -> Result<usize, TransportError> {
        self.inner.send_commands(commands)
    }

    fn send_data(&self, data: &[u8], assert_eoi: bool) -> Result<usize, TransportError> {
        self.inner.send_data(data, assert_eoi)
    }

    fn receive_data(&self, max: usize, eos: Option<Eos>) -> Result<Reception, TransportError> {
        self.wait_for_gate();
        self.inner.receive_data(max, eos)
    }

    fn set_remote_enable(&self, assert: bool) -> Result<(), TransportError> {
        self.inner.set_remote_enable(assert)
    }

    fn pulse_interface_clear(&self, dwell: Duration) -> Result<(), TransportError> {
        self.inner.pulse_interface_clear(dwell)
    }

    fn set_attention(&self, assert: bool) -> Result<(), TransportError> {
        self.inner.set_attention(assert)
    }

    fn parallel_poll(&self) -> Result<u8, TransportError> {
        self.inner.parallel_poll()
    }

    fn lines(&self) -> Result<LineStates, TransportError> {
        self.inner.lines()
    }

    fn role(&self) -> Result<RoleState, TransportError> {
        self.inner.role()
    }

    fn listener_present(&self, address: BusAddress) -> Result<bool, TransportError> {
        self.inner.listener_present(address)
    }

    fn set_timeout(&self, timeout: Timeout) -> Result<(), TransportError> {
        self.inner.set_timeout(timeout)
    }

    fn request_service(&self, status_byte: u8) -> Result<(), TransportError> {
        self.inner.request_service(status_byte)
    }

    fn set_individual_status(&self, ist: bool) -> Result<(), TransportError> {
        self.inner.set_individual_status(ist)
    }
}
