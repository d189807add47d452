//! Data movement: commands, reads and writes, and the multi-device
//! send/receive/clear/trigger operations, under the transfer termination
//! policy.
//!
//! Reads stop at the first of: the requested count, EOI on an incoming
//! byte, or a configured end-of-string match. Writes signal their end per
//! [`SendEnd`]; asserting EOI on a zero-length write is honored.

use crate::board::{Board, Unit, UnitView};
use crate::result::{Completion, Failure};
use crate::{EndReason, Transport};
use gpib_protocol::{
    BusAddress, Eos, ReadTermination, ResolvedList, SendEnd, StatusWord, command,
    error::ErrorCode, resolve,
};

impl<T: Transport> Board<T> {
    /// Sends raw interface command bytes. Requires Controller-in-Charge.
    pub fn command(&self, commands: &[u8]) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.do_commands(commands)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    pub(crate) fn do_commands(&self, commands: &[u8]) -> Result<usize, Failure> {
        self.require_cic()?;
        log::trace!("command bytes: {:02x?}", commands);
        Ok(self.transport.send_commands(commands)?)
    }

    /// Writes data to a unit using its configured end-of-transfer mode.
    pub fn write(&self, unit: Unit, data: &[u8]) -> Completion {
        match self.view(unit) {
            Ok(view) => {
                let end = if view.send_eoi { SendEnd::Eoi } else { SendEnd::None };
                self.write_with(unit, data, end)
            }
            Err(failure) => self.fail(failure),
        }
    }

    /// Writes data to a unit with an explicit end-of-transfer mode.
    ///
    /// For a device unit the bus is addressed first; a board-level write
    /// assumes the bus is already addressed. Asserting EOI on an empty
    /// transfer is performed, not skipped.
    pub fn write_with(&self, unit: Unit, data: &[u8], end: SendEnd) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            let view = self.view(unit)?;
            self.do_unit_write(&view, data, end)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    pub(crate) fn do_unit_write(
        &self,
        view: &UnitView,
        data: &[u8],
        end: SendEnd,
    ) -> Result<usize, Failure> {
        self.apply_timeout(view)?;
        if !view.is_board {
            self.require_cic()?;
            if self.lock().config.assert_ren_on_addressing {
                self.transport.set_remote_enable(true)?;
            }
            let addressing = self.send_addressing(&resolve(&[view.address]));
            self.transport.send_commands(&addressing)?;
        }
        log::debug!(
            "write: {} bytes to {} ({})",
            data.len(),
            view.address,
            end
        );
        self.send_payload(data, end, view.eos)
    }

    fn send_payload(
        &self,
        data: &[u8],
        end: SendEnd,
        eos: Option<Eos>,
    ) -> Result<usize, Failure> {
        match end {
            SendEnd::None => {
                let eoi = eos_wants_eoi(eos, data);
                Ok(self.transport.send_data(data, eoi)?)
            }
            SendEnd::Eoi => Ok(self.transport.send_data(data, true)?),
            SendEnd::NewlineEoi => {
                let mut count = self.transport.send_data(data, false)?;
                count += self
                    .transport
                    .send_data(b"\n", true)
                    .map_err(|error| Failure::from(error).counted(count))?;
                Ok(count)
            }
        }
    }

    /// Reads up to `max` bytes from a unit. The read stops at the first of:
    /// the count, EOI, or the unit's end-of-string condition when that is
    /// configured to terminate reads. The END flag reports the latter two.
    pub fn read(&self, unit: Unit, max: usize) -> (Vec<u8>, Completion) {
        let result = (|| {
            self.ensure_idle()?;
            let view = self.view(unit)?;
            self.do_unit_read(&view, max)
        })();
        match result {
            Ok((data, flags)) => {
                let count = data.len();
                (data, self.finish(Ok((flags, count))))
            }
            Err(failure) => (Vec::new(), self.fail(failure)),
        }
    }

    pub(crate) fn do_unit_read(
        &self,
        view: &UnitView,
        max: usize,
    ) -> Result<(Vec<u8>, StatusWord), Failure> {
        self.apply_timeout(view)?;
        if !view.is_board {
            self.require_cic()?;
            let addressing = self.receive_addressing(view.address);
            self.transport.send_commands(&addressing)?;
        }
        let stop = view.eos.filter(|eos| eos.terminates_read());
        let reception = self.transport.receive_data(max, stop)?;
        log::debug!(
            "read: {} bytes from {} ({:?})",
            reception.data.len(),
            view.address,
            reception.end
        );
        let flags = match reception.end {
            EndReason::CountReached => StatusWord::empty(),
            EndReason::Eoi | EndReason::EosMatch => StatusWord::END,
        };
        Ok((reception.data, flags))
    }

    /// Addresses the listed devices to listen and this board to talk, in
    /// preparation for [`send_data_bytes`](Board::send_data_bytes). The
    /// broadcast form keeps the currently addressed listeners.
    pub fn send_setup(&self, addresses: &[BusAddress]) -> Completion {
        let targets = resolve(addresses);
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            let addressing = self.send_addressing(&targets);
            if addressing.is_empty() {
                return Ok(0);
            }
            Ok(self.transport.send_commands(&addressing)?)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Sends data to listeners that are already addressed.
    pub fn send_data_bytes(&self, data: &[u8], end: SendEnd) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.send_payload(data, end, None)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Addresses the listed devices and sends `data` to all of them.
    pub fn send_list(&self, addresses: &[BusAddress], data: &[u8], end: SendEnd) -> Completion {
        let targets = resolve(addresses);
        let result = (|| {
            self.ensure_idle()?;
            self.do_send(&targets, data, end)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Sends `data` to a single device.
    pub fn send(&self, address: BusAddress, data: &[u8], end: SendEnd) -> Completion {
        self.send_list(&[address], data, end)
    }

    pub(crate) fn do_send(
        &self,
        targets: &ResolvedList,
        data: &[u8],
        end: SendEnd,
    ) -> Result<usize, Failure> {
        self.require_cic()?;
        let addressing = self.send_addressing(targets);
        if !addressing.is_empty() {
            self.transport.send_commands(&addressing)?;
        }
        self.send_payload(data, end, None)
    }

    /// Addresses `source` to talk and this board to listen, in preparation
    /// for [`receive_response`](Board::receive_response).
    pub fn receive_setup(&self, source: BusAddress) -> Completion {
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            let addressing = self.receive_addressing(source);
            Ok(self.transport.send_commands(&addressing)?)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Reads from the already-addressed talker under an explicit
    /// termination condition. The end-of-string form compares all eight
    /// bits.
    pub fn receive_response(
        &self,
        max: usize,
        termination: ReadTermination,
    ) -> (Vec<u8>, Completion) {
        let result = (|| {
            self.ensure_idle()?;
            self.do_receive_response(max, termination)
        })();
        match result {
            Ok((data, flags)) => {
                let count = data.len();
                (data, self.finish(Ok((flags, count))))
            }
            Err(failure) => (Vec::new(), self.fail(failure)),
        }
    }

    fn do_receive_response(
        &self,
        max: usize,
        termination: ReadTermination,
    ) -> Result<(Vec<u8>, StatusWord), Failure> {
        let stop = match termination {
            ReadTermination::End => None,
            ReadTermination::Eos(byte) => {
                Some(Eos::new(byte).terminate_read(true).full_compare(true))
            }
        };
        let reception = self.transport.receive_data(max, stop)?;
        let flags = match reception.end {
            EndReason::CountReached => StatusWord::empty(),
            EndReason::Eoi | EndReason::EosMatch => StatusWord::END,
        };
        Ok((reception.data, flags))
    }

    /// Addresses `source` and reads up to `max` bytes from it.
    pub fn receive(
        &self,
        source: BusAddress,
        max: usize,
        termination: ReadTermination,
    ) -> (Vec<u8>, Completion) {
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            let addressing = self.receive_addressing(source);
            self.transport.send_commands(&addressing)?;
            self.do_receive_response(max, termination)
        })();
        match result {
            Ok((data, flags)) => {
                let count = data.len();
                (data, self.finish(Ok((flags, count))))
            }
            Err(failure) => (Vec::new(), self.fail(failure)),
        }
    }

    /// Clears the listed devices with Selected Device Clear; the broadcast
    /// form sends the universal Device Clear to every device on the bus.
    pub fn clear_devices(&self, addresses: &[BusAddress]) -> Completion {
        let targets = resolve(addresses);
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            let commands = if targets.is_broadcast() {
                vec![command::DCL]
            } else {
                let mut commands = targets.listen_sequence();
                commands.push(command::SDC);
                commands
            };
            Ok(self.transport.send_commands(&commands)?)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Clears a single opened device.
    pub fn clear_device(&self, unit: Unit) -> Completion {
        match self.view(unit) {
            Ok(view) if !view.is_board => self.clear_devices(&[view.address]),
            Ok(_) => self.fail(Failure::new(ErrorCode::InvalidArgument)),
            Err(failure) => self.fail(failure),
        }
    }

    /// Sends Group Execute Trigger to the listed devices. The broadcast
    /// form triggers whatever is currently listen-active without
    /// re-addressing.
    pub fn trigger(&self, addresses: &[BusAddress]) -> Completion {
        let targets = resolve(addresses);
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            let commands = if targets.is_broadcast() {
                vec![command::GET]
            } else {
                let mut commands = targets.listen_sequence();
                commands.push(command::GET);
                commands
            };
            Ok(self.transport.send_commands(&commands)?)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Triggers a single opened device.
    pub fn trigger_device(&self, unit: Unit) -> Completion {
        match self.view(unit) {
            Ok(view) if !view.is_board => self.trigger(&[view.address]),
            Ok(_) => self.fail(Failure::new(ErrorCode::InvalidArgument)),
            Err(failure) => self.fail(failure),
        }
    }

    /// Probes the listed primary addresses for listening devices. An
    /// unresponsive primary address is re-probed across the whole
    /// secondary range. At most `limit` addresses are stored; the
    /// completion count reports how many were.
    pub fn find_listeners(
        &self,
        addresses: &[BusAddress],
        limit: usize,
    ) -> (Vec<BusAddress>, Completion) {
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            let mut found = Vec::new();
            'outer: for probe in addresses {
                let primary = BusAddress::new(probe.primary())
                    .expect("primary validated at construction");
                if self.transport.listener_present(primary)? {
                    if found.len() >= limit {
                        break 'outer;
                    }
                    found.push(primary);
                    continue;
                }
                for sad in gpib_protocol::address::SECONDARY_MIN
                    ..=gpib_protocol::address::SECONDARY_MAX
                {
                    let extended = BusAddress::with_secondary(probe.primary(), sad)
                        .expect("secondary range is valid");
                    if self.transport.listener_present(extended)? {
                        if found.len() >= limit {
                            break 'outer;
                        }
                        found.push(extended);
                    }
                }
            }
            Ok(found)
        })();
        match result {
            Ok(found) => {
                let count = found.len();
                (found, self.finish(Ok((StatusWord::empty(), count))))
            }
            Err(failure) => (Vec::new(), self.fail(failure)),
        }
    }
}

/// EOI is also asserted when the end-of-string configuration asks for EOI
/// with the EOS character and the payload ends with that character.
fn eos_wants_eoi(eos: Option<Eos>, data: &[u8]) -> bool {
    match (eos, data.last()) {
        (Some(eos), Some(last)) => eos.eoi_on_send() && eos.matches(*last),
        _ => false,
    }
}
