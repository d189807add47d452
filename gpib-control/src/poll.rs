//! Polling: serial polls collect one status byte per device over
//! individual addressed exchanges; a parallel poll collects one bit per
//! configured device in a single bus cycle. Parallel polls require the
//! board to be Controller-in-Charge; serial polls do not.

use crate::board::{Board, Unit};
use crate::result::{Completion, Failure};
use crate::Transport;
use gpib_protocol::{BusAddress, StatusWord, command, error::ErrorCode, resolve};
use std::time::Instant;

/// The requesting-service bit of a serial poll status byte.
const RQS_BIT: u8 = 0x40;

impl<T: Transport> Board<T> {
    /// Serial polls a single device and returns its status byte. The RQS
    /// flag of the completion mirrors the requesting-service bit.
    pub fn serial_poll(&self, address: BusAddress) -> (u8, Completion) {
        let result = (|| {
            self.ensure_idle()?;
            self.do_serial_poll(address)
        })();
        match result {
            Ok(byte) => (byte, self.finish(Ok((rqs_flag(byte), 1)))),
            Err(failure) => (0, self.fail(failure)),
        }
    }

    fn do_serial_poll(&self, address: BusAddress) -> Result<u8, Failure> {
        let board_view = self.view(Unit::BOARD)?;
        self.apply_timeout(&board_view)?;

        let mut enable = vec![
            command::UNL,
            command::mla(board_view.address.primary()),
            address.talk_command(),
        ];
        if let Some(sad) = address.secondary_command() {
            enable.push(sad);
        }
        enable.push(command::SPE);
        self.transport.send_commands(&enable)?;

        let reception = self.transport.receive_data(1, None).map_err(|error| {
            // Leave serial poll mode even when the byte never came.
            let _ = self.transport.send_commands(&[command::SPD, command::UNT]);
            Failure::from(error)
        })?;
        self.transport.send_commands(&[command::SPD, command::UNT])?;

        let byte = *reception
            .data
            .first()
            .ok_or(Failure::new(ErrorCode::StatusByteLost))?;
        log::debug!("serial poll {}: {:#04x}", address, byte);
        Ok(byte)
    }

    /// Serial polls every listed device in order. The result always holds
    /// exactly one byte per input address; a failing poll contributes a
    /// zero byte and the first failure is reported in the completion.
    pub fn serial_poll_all(&self, addresses: &[BusAddress]) -> (Vec<u8>, Completion) {
        if let Err(failure) = self.ensure_idle() {
            return (Vec::new(), self.fail(failure));
        }
        let mut results = Vec::with_capacity(addresses.len());
        let mut first_failure: Option<Failure> = None;
        for address in addresses {
            match self.do_serial_poll(*address) {
                Ok(byte) => results.push(byte),
                Err(failure) => {
                    results.push(0);
                    first_failure.get_or_insert(failure);
                }
            }
        }
        let count = results.len();
        let completion = match first_failure {
            None => self.finish(Ok((StatusWord::empty(), count))),
            Some(failure) => self.fail(failure.counted(count)),
        };
        (results, completion)
    }

    /// Serial polls the listed devices in order until one requests
    /// service, returning its index and status byte. When none does, the
    /// index equals the list length (the terminator's position) and a
    /// table-overflow error is reported.
    pub fn find_requesting_service(&self, addresses: &[BusAddress]) -> (usize, u8, Completion) {
        if let Err(failure) = self.ensure_idle() {
            return (addresses.len(), 0, self.fail(failure));
        }
        for (index, address) in addresses.iter().enumerate() {
            match self.do_serial_poll(*address) {
                Ok(byte) if byte & RQS_BIT != 0 => {
                    return (index, byte, self.finish(Ok((StatusWord::RQS, index))));
                }
                Ok(_) => {}
                Err(failure) => {
                    return (index, 0, self.fail(failure.counted(index)));
                }
            }
        }
        (
            addresses.len(),
            0,
            self.fail(Failure::new(ErrorCode::TableOverflow).counted(addresses.len())),
        )
    }

    /// Conducts a parallel poll: the eight response bits of every
    /// configured device, collected in one bus cycle. Requires
    /// Controller-in-Charge.
    pub fn parallel_poll(&self) -> (u8, Completion) {
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            Ok(self.transport.parallel_poll()?)
        })();
        match result {
            Ok(bits) => {
                log::debug!("parallel poll: {:#010b}", bits);
                (bits, self.finish(Ok((StatusWord::empty(), 1))))
            }
            Err(failure) => (0, self.fail(failure)),
        }
    }

    /// Configures a device's parallel poll response: which of the eight
    /// data lines it drives (1..=8) and under which individual-status
    /// sense it asserts the line.
    pub fn parallel_poll_configure(
        &self,
        address: BusAddress,
        data_line: u8,
        sense: bool,
    ) -> Completion {
        let result = (|| {
            if !(1..=8).contains(&data_line) {
                return Err(Failure::new(ErrorCode::InvalidArgument));
            }
            self.ensure_idle()?;
            self.require_cic()?;
            let mut commands = resolve(&[address]).listen_sequence();
            commands.push(command::PPC);
            commands.push(command::ppe(data_line, sense));
            commands.push(command::UNL);
            Ok(self.transport.send_commands(&commands)?)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Removes the listed devices from parallel poll participation. The
    /// broadcast form sends the universal Parallel Poll Unconfigure to
    /// every device on the bus.
    pub fn parallel_poll_unconfigure(&self, addresses: &[BusAddress]) -> Completion {
        let targets = resolve(addresses);
        let result = (|| {
            self.ensure_idle()?;
            self.require_cic()?;
            let commands = if targets.is_broadcast() {
                vec![command::PPU]
            } else {
                let mut commands = targets.listen_sequence();
                commands.push(command::PPC);
                commands.push(command::PPD);
                commands.push(command::UNL);
                commands
            };
            Ok(self.transport.send_commands(&commands)?)
        })();
        self.finish(result.map(|count| (StatusWord::empty(), count)))
    }

    /// Sets or clears the board's individual status bit, its own answer to
    /// parallel polls.
    pub fn set_individual_status(&self, ist: bool) -> Completion {
        let result = self
            .transport
            .set_individual_status(ist)
            .map_err(Failure::from);
        self.finish(result.map(|()| (StatusWord::empty(), 0)))
    }

    /// Installs the board's serial poll response byte, requesting service
    /// from the Controller-in-Charge when its RQS bit is set.
    pub fn request_service(&self, status_byte: u8) -> Completion {
        let result = self
            .transport
            .request_service(status_byte)
            .map_err(Failure::from);
        self.finish(result.map(|()| (rqs_flag(status_byte), 0)))
    }

    /// The current level of the Service Request line.
    pub fn test_srq(&self) -> (bool, Completion) {
        let result = (|| {
            let lines = self.transport.lines()?;
            lines
                .srq
                .ok_or(Failure::new(ErrorCode::NoCapability))
        })();
        match result {
            Ok(asserted) => (asserted, self.finish(Ok((StatusWord::empty(), 0)))),
            Err(failure) => (false, self.fail(failure)),
        }
    }

    /// Blocks until a device asserts Service Request or the board timeout
    /// expires. Expiry reports the timeout flag with an aborted error.
    pub fn wait_srq(&self) -> (bool, Completion) {
        let result = (|| {
            let view = self.view(Unit::BOARD)?;
            let deadline = view.timeout.duration().map(|limit| Instant::now() + limit);
            loop {
                let lines = self.transport.lines()?;
                match lines.srq {
                    Some(true) => return Ok(()),
                    Some(false) => {}
                    None => return Err(Failure::new(ErrorCode::NoCapability)),
                }
                if let Some(deadline) = deadline
                    && Instant::now() >= deadline
                {
                    return Err(Failure {
                        code: ErrorCode::Aborted,
                        flags: StatusWord::TIMO,
                        count: 0,
                    });
                }
                std::thread::sleep(std::time::Duration::from_micros(100));
            }
        })();
        match result {
            Ok(()) => (true, self.finish(Ok((StatusWord::empty(), 0)))),
            Err(failure) => (false, self.fail(failure)),
        }
    }
}

fn rqs_flag(byte: u8) -> StatusWord {
    if byte & RQS_BIT != 0 {
        StatusWord::RQS
    } else {
        StatusWord::empty()
    }
}
