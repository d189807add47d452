//! Bus control: acquiring, exercising and handing off the
//! Controller-in-Charge role, plus remote/local/lockout management.
//!
//! No transition result is trusted blindly: after the transport call the
//! board reads its role back and reports a bus error when the transition
//! did not take effect. Callers confirm transitions through the returned
//! status word.

use crate::board::{Board, Unit};
use crate::result::{Completion, Failure};
use crate::{RoleState, Transport};
use gpib_protocol::{BusAddress, StatusWord, command, error::ErrorCode, resolve};
use std::fmt::Display;
use std::time::Duration;

/// Minimum Interface Clear dwell.
const IFC_DWELL: Duration = Duration::from_micros(100);

/// The board's position in the controller protocol.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ControllerState {
    /// Another participant controls the bus.
    #[default]
    NotController,
    /// Controller-in-Charge, neither actively driving ATN nor standing by.
    InCharge,
    /// Controller-in-Charge with ATN asserted.
    Active,
    /// Controller-in-Charge, ATN released for a data transfer.
    Standby,
}

impl ControllerState {
    pub fn in_charge(self) -> bool {
        self != ControllerState::NotController
    }
}

impl Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::NotController => write!(f, "not controller"),
            ControllerState::InCharge => write!(f, "controller-in-charge"),
            ControllerState::Active => write!(f, "active controller"),
            ControllerState::Standby => write!(f, "standby controller"),
        }
    }
}

impl<T: Transport> Board<T> {
    /// The board's current controller state, derived from a live role read.
    pub fn controller_state(&self) -> ControllerState {
        let role = match self.transport.role() {
            Ok(role) => role,
            Err(_) => return ControllerState::NotController,
        };
        let mut inner = self.lock();
        inner.state = reconcile(inner.state, &role);
        inner.state
    }

    /// Requests or releases System Controller capability, the right to
    /// drive Interface Clear and Remote Enable.
    pub fn request_system_control(&self, enable: bool) -> Completion {
        self.lock().config.system_controller = enable;
        log::debug!("system controller capability: {}", enable);
        self.finish(Ok((StatusWord::empty(), 0)))
    }

    /// Acquires Controller-in-Charge by pulsing Interface Clear.
    ///
    /// Requires the System Controller role; reports a
    /// not-system-controller error otherwise. Safe to repeat: the pulse
    /// unconditionally returns the board to CIC and unaddresses every
    /// device.
    pub fn interface_clear(&self) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.do_interface_clear()
        })();
        self.finish(result.map(|()| (StatusWord::empty(), 0)))
    }

    fn do_interface_clear(&self) -> Result<(), Failure> {
        self.require_system_controller()?;
        log::debug!("pulsing interface clear for {:?}", IFC_DWELL);
        self.transport.pulse_interface_clear(IFC_DWELL)?;
        let role = self.transport.role()?;
        if !role.cic {
            log::error!("interface clear did not leave the board in charge");
            return Err(Failure::new(ErrorCode::Bus));
        }
        self.lock().state = ControllerState::InCharge;
        Ok(())
    }

    /// Becomes Active Controller by asserting ATN. Valid only while
    /// Controller-in-Charge; reports a not-CIC error otherwise.
    pub fn take_control(&self) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            self.transport.set_attention(true)?;
            let role = self.transport.role()?;
            if !role.atn {
                return Err(Failure::new(ErrorCode::Bus));
            }
            self.lock().state = ControllerState::Active;
            Ok(())
        })();
        self.finish(result.map(|()| (StatusWord::empty(), 0)))
    }

    /// Goes from Active Controller to Standby, releasing ATN so an
    /// addressed talker may use the bus.
    pub fn go_to_standby(&self) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            if self.lock().state != ControllerState::Active {
                return Err(Failure::new(ErrorCode::NotController));
            }
            self.transport.set_attention(false)?;
            let role = self.transport.role()?;
            if role.atn {
                return Err(Failure::new(ErrorCode::Bus));
            }
            self.lock().state = ControllerState::Standby;
            Ok(())
        })();
        self.finish(result.map(|()| (StatusWord::empty(), 0)))
    }

    /// Passes Controller-in-Charge to the device at `address`, which must
    /// itself have controller capability. A refusal shows up as a bus
    /// error: the role read after the take-control message still reports
    /// this board in charge.
    pub fn pass_control(&self, address: BusAddress) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            let mut commands = vec![address.talk_command()];
            if let Some(sad) = address.secondary_command() {
                commands.push(sad);
            }
            commands.push(command::TCT);
            log::debug!("passing control to {}", address);
            self.transport.send_commands(&commands)?;
            self.transport.set_attention(false)?;
            let role = self.transport.role()?;
            if role.cic {
                log::error!("device {} did not accept control", address);
                return Err(Failure::new(ErrorCode::Bus));
            }
            self.lock().state = ControllerState::NotController;
            Ok(())
        })();
        self.finish(result.map(|()| (StatusWord::empty(), 0)))
    }

    /// Bus-wide recovery: asserts Remote Enable, then pulses Interface
    /// Clear, unconditionally returning the board to Controller-in-Charge
    /// with every device unaddressed. The sequence is not reversible once
    /// started; a transport failure mid-sequence leaves the bus in need of
    /// another reset.
    pub fn reset_interface(&self) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.do_reset_interface()
        })();
        self.finish(result.map(|()| (StatusWord::empty(), 0)))
    }

    fn do_reset_interface(&self) -> Result<(), Failure> {
        self.require_system_controller()?;
        log::info!("resetting interface");
        self.transport.set_remote_enable(true)?;
        self.do_interface_clear()
    }

    /// Resets and initializes the bus and the listed 488.2 devices: the
    /// interface reset, a universal device clear, then the `*RST` message
    /// to every listed device.
    pub fn reset_system(&self, addresses: &[BusAddress]) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.do_reset_interface()?;
            self.transport.send_commands(&[command::DCL])?;
            let targets = resolve(addresses);
            self.do_send(
                &targets,
                b"*RST",
                gpib_protocol::SendEnd::NewlineEoi,
            )
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Sends Local Lockout to all devices. Only the Controller-in-Charge
    /// may subsequently alter device state until it releases the lockout.
    pub fn send_local_lockout(&self) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            self.transport
                .send_commands(&[command::LLO])
                .map_err(Failure::from)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Places the listed devices in remote-with-lockout state: Remote
    /// Enable, listen addressing, then Local Lockout.
    pub fn set_remote_with_lockout(&self, addresses: &[BusAddress]) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.require_system_controller()?;
            self.require_cic()?;
            self.transport.set_remote_enable(true)?;
            let mut commands = resolve(addresses).listen_sequence();
            commands.push(command::LLO);
            self.transport.send_commands(&commands).map_err(Failure::from)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Returns the listed devices to local control by sending Go To Local.
    /// The broadcast form instead releases the Remote Enable line, ending
    /// any lockout bus-wide. Lockout can only be released by the current
    /// Controller-in-Charge.
    pub fn enable_local(&self, addresses: &[BusAddress]) -> Completion {
        let targets = resolve(addresses);
        let result = (|| {
            self.ensure_idle()?;
            if targets.is_broadcast() {
                self.require_system_controller()?;
                self.transport.set_remote_enable(false)?;
                return Ok(0);
            }
            self.require_cic()?;
            let mut commands = targets.listen_sequence();
            commands.push(command::GTL);
            self.transport.send_commands(&commands).map_err(Failure::from)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Asserts Remote Enable and addresses the listed devices to listen,
    /// placing them in remote state.
    pub fn enable_remote(&self, addresses: &[BusAddress]) -> Completion {
        let targets = resolve(addresses);
        let result = (|| {
            self.ensure_idle()?;
            self.require_system_controller()?;
            self.transport.set_remote_enable(true)?;
            if targets.is_broadcast() {
                return Ok(0);
            }
            self.require_cic()?;
            self.transport
                .send_commands(&targets.listen_sequence())
                .map_err(Failure::from)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Returns a unit to local control. For a device unit this is Go To
    /// Local addressed to that device; for the board it releases Remote
    /// Enable unless a lockout is in effect.
    pub fn go_to_local(&self, unit: Unit) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            let view = self.view(unit)?;
            if view.is_board {
                let role = self.transport.role()?;
                if role.lockout {
                    // Lockout wins; not an error.
                    return Ok(());
                }
                self.require_system_controller()?;
                self.transport.set_remote_enable(false)?;
                return Ok(());
            }
            self.require_cic()?;
            let mut commands = resolve(&[view.address]).listen_sequence();
            commands.push(command::GTL);
            self.transport.send_commands(&commands)?;
            Ok(())
        })();
        self.finish(result.map(|()| (StatusWord::empty(), 0)))
    }
}

/// Folds a live role read into the advisory sub-state. Losing or gaining
/// CIC externally overrides whatever was recorded.
fn reconcile(previous: ControllerState, role: &RoleState) -> ControllerState {
    if !role.cic {
        return ControllerState::NotController;
    }
    match previous {
        ControllerState::NotController => ControllerState::InCharge,
        state => state,
    }
}
