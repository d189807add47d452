use crate::async_io::PendingState;
use crate::controller::ControllerState;
use crate::result::{Completion, Failure};
use crate::{Transport, TransportError};
use gpib_protocol::{BusAddress, Eos, ResolvedList, StatusWord, Timeout, command, error::ErrorCode};
use std::sync::{Arc, Mutex, MutexGuard};

/// An opaque descriptor for the board itself or a device attached through
/// it. Allocated by [`Board::open_device`]; stale after
/// [`Board::take_offline`], and never reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Unit(u32);

impl Unit {
    /// The board's own descriptor.
    pub const BOARD: Unit = Unit(0);
}

/// Software configuration of the board.
#[derive(Copy, Clone, Debug)]
pub struct BoardConfig {
    /// The board's own bus address.
    pub address: BusAddress,
    /// Timeout rung for board-level transfers.
    pub timeout: Timeout,
    /// Assert EOI with the last byte of writes.
    pub send_eoi: bool,
    /// End-of-string handling; `None` disables it.
    pub eos: Option<Eos>,
    /// The board may send Interface Clear and Remote Enable.
    pub system_controller: bool,
    /// Assert Remote Enable when addressing devices.
    pub assert_ren_on_addressing: bool,
    /// Use DMA for transfers (forwarded to the transceiver; carried as
    /// configuration only).
    pub dma: bool,
    /// Re-send addressing before every device transfer.
    pub readdress: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            address: BusAddress::new(0).expect("0 is a valid primary address"),
            timeout: Timeout::default(),
            send_eoi: true,
            eos: None,
            system_controller: true,
            assert_ren_on_addressing: false,
            dma: false,
            readdress: true,
        }
    }
}

/// Software configuration of a device opened through the board.
#[derive(Copy, Clone, Debug)]
pub struct DeviceConfig {
    pub address: BusAddress,
    pub timeout: Timeout,
    pub send_eoi: bool,
    pub eos: Option<Eos>,
}

impl DeviceConfig {
    pub fn new(address: BusAddress) -> DeviceConfig {
        DeviceConfig {
            address,
            timeout: Timeout::default(),
            send_eoi: true,
            eos: None,
        }
    }
}

/// The closed set of configuration items for [`Board::configure`] and
/// [`Board::query`]. Each value documents its effect; anything outside a
/// value's valid range reports an invalid-argument error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BoardOption {
    /// Primary address of the unit, `0..=30`.
    PrimaryAddress,
    /// Secondary address of the unit: `0x60..=0x7E`, or zero to disable.
    SecondaryAddress,
    /// Timeout rung selection code for the unit, `0..=17`.
    Timeout,
    /// Assert EOI with the last byte of writes (non-zero enables).
    SendEoi,
    /// Packed end-of-string configuration; zero disables EOS handling.
    EosConfiguration,
    /// The board is System Controller (board only).
    SystemController,
    /// Assert Remote Enable when addressing devices (board only).
    RemoteEnableOnAddressing,
    /// Use DMA for transfers (board only).
    Dma,
    /// Re-send addressing before every device transfer (board only).
    Readdress,
}

impl BoardOption {
    fn board_only(self) -> bool {
        matches!(
            self,
            BoardOption::SystemController
                | BoardOption::RemoteEnableOnAddressing
                | BoardOption::Dma
                | BoardOption::Readdress
        )
    }
}

pub(crate) struct Inner {
    pub config: BoardConfig,
    pub units: Vec<Option<DeviceConfig>>,
    pub state: ControllerState,
    pub pending: Option<Arc<PendingState>>,
    pub waiting: bool,
}

/// Resolved settings for the unit an operation targets.
#[derive(Copy, Clone, Debug)]
pub(crate) struct UnitView {
    pub address: BusAddress,
    pub timeout: Timeout,
    pub send_eoi: bool,
    pub eos: Option<Eos>,
    pub is_board: bool,
}

/// A GPIB interface board: the control plane over a [`Transport`] backend.
///
/// All operations take `&self`; the board serializes access to its own
/// descriptor table internally, but callers must serialize role-changing bus
/// operations against a given board themselves.
pub struct Board<T: Transport> {
    pub(crate) transport: Arc<T>,
    pub(crate) inner: Arc<Mutex<Inner>>,
    initial: BoardConfig,
}

/// Builder to create a [`Board`] and modify configuration options.
///
/// # Example
///
/// ```ignore
/// use gpib_control::board::Builder;
/// use gpib_protocol::Timeout;
///
/// let board = Builder::new()
///     .timeout(Timeout::S1)
///     .system_controller(true)
///     .build(transport);
/// ```
#[derive(Default)]
pub struct Builder {
    config: BoardConfig,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the board's own bus address.
    pub fn address(mut self, address: BusAddress) -> Self {
        self.config.address = address;
        self
    }

    /// Set the timeout rung for board-level transfers.
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Whether EOI is asserted with the last byte of writes.
    pub fn send_eoi(mut self, enable: bool) -> Self {
        self.config.send_eoi = enable;
        self
    }

    /// Set the end-of-string configuration.
    pub fn eos(mut self, eos: Option<Eos>) -> Self {
        self.config.eos = eos;
        self
    }

    /// Whether the board is System Controller.
    pub fn system_controller(mut self, enable: bool) -> Self {
        self.config.system_controller = enable;
        self
    }

    /// Whether Remote Enable is asserted when addressing devices.
    pub fn assert_ren_on_addressing(mut self, enable: bool) -> Self {
        self.config.assert_ren_on_addressing = enable;
        self
    }

    /// Build and return the board.
    pub fn build<T: Transport>(self, transport: T) -> Board<T> {
        Board::new(transport, self.config)
    }
}

impl<T: Transport> Board<T> {
    pub fn new(transport: T, config: BoardConfig) -> Board<T> {
        log::debug!(
            "opening board at {} (system controller: {})",
            config.address,
            config.system_controller
        );
        Board {
            transport: Arc::new(transport),
            inner: Arc::new(Mutex::new(Inner {
                config,
                units: Vec::new(),
                state: ControllerState::NotController,
                pending: None,
                waiting: false,
            })),
            initial: config,
        }
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    /// The backend this board drives.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens a device attached through this board and returns its
    /// descriptor. The descriptor stays valid until [`take_offline`]
    /// invalidates it.
    ///
    /// [`take_offline`]: Board::take_offline
    pub fn open_device(&self, config: DeviceConfig) -> Unit {
        let mut inner = self.lock();
        inner.units.push(Some(config));
        let unit = Unit(inner.units.len() as u32);
        drop(inner);
        log::debug!("opened device {} as unit {:?}", config.address, unit);
        Completion::success(self.role_flags(), 0).record();
        unit
    }

    /// Takes a unit offline. A device descriptor becomes stale and is never
    /// reallocated; using it afterwards reports an invalid-handle error.
    /// Taking the board itself offline invalidates every open device and
    /// restores the board's pre-configured state.
    pub fn take_offline(&self, unit: Unit) -> Completion {
        let mut inner = self.lock();
        if unit == Unit::BOARD {
            log::debug!("board offline: resetting configuration, dropping all units");
            for slot in inner.units.iter_mut() {
                *slot = None;
            }
            inner.config = self.initial;
            drop(inner);
            return Completion::success(self.role_flags(), 0).record();
        }
        match inner.units.get_mut(unit.0 as usize - 1) {
            Some(slot @ Some(_)) => {
                *slot = None;
                drop(inner);
                log::debug!("unit {:?} taken offline", unit);
                Completion::success(self.role_flags(), 0).record()
            }
            _ => {
                drop(inner);
                self.fail(Failure::new(ErrorCode::InvalidHandle))
            }
        }
    }

    /// Changes one configuration item of a board or device.
    pub fn configure(&self, unit: Unit, option: BoardOption, value: u16) -> Completion {
        let result = self.apply_option(unit, option, value);
        self.finish(result.map(|()| (StatusWord::empty(), 0)))
    }

    /// Returns the current value of one configuration item.
    pub fn query(&self, unit: Unit, option: BoardOption) -> (u16, Completion) {
        match self.read_option(unit, option) {
            Ok(value) => (
                value,
                self.finish(Ok((StatusWord::empty(), 0))),
            ),
            Err(failure) => (0, self.fail(failure)),
        }
    }

    fn apply_option(&self, unit: Unit, option: BoardOption, value: u16) -> Result<(), Failure> {
        let mut inner = self.lock();
        if option.board_only() && unit != Unit::BOARD {
            return Err(Failure::new(ErrorCode::NoCapability));
        }
        if unit != Unit::BOARD {
            inner.unit_exists(unit)?;
        }

        // Validate before touching anything.
        let parsed_address = match option {
            BoardOption::PrimaryAddress => {
                let pad = u8::try_from(value).map_err(|_| ErrorCode::InvalidArgument)?;
                let current = inner.address_of(unit)?;
                Some(match current.secondary() {
                    Some(sad) => BusAddress::with_secondary(pad, sad),
                    None => BusAddress::new(pad),
                }
                .map_err(|_| ErrorCode::InvalidArgument)?)
            }
            BoardOption::SecondaryAddress => {
                let current = inner.address_of(unit)?;
                Some(if value == 0 {
                    BusAddress::new(current.primary()).map_err(|_| ErrorCode::InvalidArgument)?
                } else {
                    let sad = u8::try_from(value).map_err(|_| ErrorCode::InvalidArgument)?;
                    BusAddress::with_secondary(current.primary(), sad)
                        .map_err(|_| ErrorCode::InvalidArgument)?
                })
            }
            _ => None,
        };

        match option {
            BoardOption::PrimaryAddress | BoardOption::SecondaryAddress => {
                inner.set_address(unit, parsed_address.expect("validated above"));
            }
            BoardOption::Timeout => {
                let code = u8::try_from(value).map_err(|_| ErrorCode::InvalidArgument)?;
                let timeout = Timeout::from_code(code).ok_or(ErrorCode::InvalidArgument)?;
                inner.set_timeout(unit, timeout);
            }
            BoardOption::SendEoi => inner.set_send_eoi(unit, value != 0),
            BoardOption::EosConfiguration => inner.set_eos(unit, Eos::unpack(value)),
            BoardOption::SystemController => inner.config.system_controller = value != 0,
            BoardOption::RemoteEnableOnAddressing => {
                inner.config.assert_ren_on_addressing = value != 0
            }
            BoardOption::Dma => inner.config.dma = value != 0,
            BoardOption::Readdress => inner.config.readdress = value != 0,
        }
        log::debug!("unit {:?}: {:?} set to {:#x}", unit, option, value);
        Ok(())
    }

    fn read_option(&self, unit: Unit, option: BoardOption) -> Result<u16, Failure> {
        let inner = self.lock();
        if option.board_only() && unit != Unit::BOARD {
            return Err(Failure::new(ErrorCode::NoCapability));
        }
        let view = inner.view(unit)?;
        Ok(match option {
            BoardOption::PrimaryAddress => u16::from(view.address.primary()),
            BoardOption::SecondaryAddress => u16::from(view.address.secondary().unwrap_or(0)),
            BoardOption::Timeout => u16::from(view.timeout.code()),
            BoardOption::SendEoi => u16::from(view.send_eoi),
            BoardOption::EosConfiguration => view.eos.map(Eos::pack).unwrap_or(0),
            BoardOption::SystemController => u16::from(inner.config.system_controller),
            BoardOption::RemoteEnableOnAddressing => {
                u16::from(inner.config.assert_ren_on_addressing)
            }
            BoardOption::Dma => u16::from(inner.config.dma),
            BoardOption::Readdress => u16::from(inner.config.readdress),
        })
    }

    /// A second handle onto the same board, sharing transport and state.
    /// Used by asynchronous workers.
    pub(crate) fn clone_handle(&self) -> Board<T> {
        Board {
            transport: self.transport.clone(),
            inner: self.inner.clone(),
            initial: self.initial,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resolved settings of `unit`, or an invalid-handle failure for a stale
    /// or unknown descriptor.
    pub(crate) fn view(&self, unit: Unit) -> Result<UnitView, Failure> {
        self.lock().view(unit)
    }

    /// Fails the operation when an asynchronous transfer is still pending on
    /// this board.
    pub(crate) fn ensure_idle(&self) -> Result<(), Failure> {
        if self.lock().pending.is_some() {
            return Err(Failure::new(ErrorCode::InProgress));
        }
        Ok(())
    }

    /// The live role of the board as a requirement check: operations that
    /// need Controller-in-Charge call this first.
    pub(crate) fn require_cic(&self) -> Result<(), Failure> {
        let role = self.transport.role()?;
        if !role.cic {
            return Err(Failure::new(ErrorCode::NotController));
        }
        Ok(())
    }

    pub(crate) fn require_system_controller(&self) -> Result<(), Failure> {
        if !self.lock().config.system_controller {
            return Err(Failure::new(ErrorCode::NotSystemController));
        }
        Ok(())
    }

    /// Status flags describing the current bus role, read back from the
    /// transport after every operation. The bus state is never cached.
    pub(crate) fn role_flags(&self) -> StatusWord {
        let mut flags = StatusWord::empty();
        if let Ok(role) = self.transport.role() {
            if role.cic {
                flags |= StatusWord::CIC;
                if let Ok(lines) = self.transport.lines()
                    && lines.srq == Some(true)
                {
                    flags |= StatusWord::SRQI;
                }
            }
            if role.atn {
                flags |= StatusWord::ATN;
            }
            if role.remote {
                flags |= StatusWord::REM;
            }
            if role.lockout {
                flags |= StatusWord::LOK;
            }
            if role.talker {
                flags |= StatusWord::TACS;
            }
            if role.listener {
                flags |= StatusWord::LACS;
            }
        }
        flags
    }

    /// Select the unit's timeout rung on the transport ahead of a blocking
    /// exchange.
    pub(crate) fn apply_timeout(&self, view: &UnitView) -> Result<(), TransportError> {
        self.transport.set_timeout(view.timeout)
    }

    /// Interface command bytes that address `targets` to listen and this
    /// board to talk. The broadcast form leaves the active set addressed and
    /// yields no bytes.
    pub(crate) fn send_addressing(&self, targets: &ResolvedList) -> Vec<u8> {
        if targets.is_broadcast() {
            return Vec::new();
        }
        let mut commands = targets.listen_sequence();
        commands.push(command::mta(self.lock().config.address.primary()));
        commands
    }

    /// Interface command bytes that address `source` to talk and this board
    /// to listen.
    pub(crate) fn receive_addressing(&self, source: BusAddress) -> Vec<u8> {
        let mut commands = vec![
            command::UNL,
            command::mla(self.lock().config.address.primary()),
            source.talk_command(),
        ];
        if let Some(sad) = source.secondary_command() {
            commands.push(sad);
        }
        commands
    }

    /// Converts an operation result into a recorded [`Completion`], folding
    /// in the live role flags.
    pub(crate) fn finish(&self, result: Result<(StatusWord, usize), Failure>) -> Completion {
        match result {
            Ok((flags, count)) => {
                Completion::success(flags | self.role_flags(), count).record()
            }
            Err(failure) => self.fail(failure),
        }
    }

    pub(crate) fn fail(&self, failure: Failure) -> Completion {
        log::debug!("operation failed: {} ({:?})", failure.code, failure.code);
        Completion::failure(
            failure.code,
            failure.flags | self.role_flags(),
            failure.count,
        )
        .record()
    }
}

impl Inner {
    fn unit_exists(&self, unit: Unit) -> Result<(), Failure> {
        match self.units.get(unit.0 as usize - 1) {
            Some(Some(_)) => Ok(()),
            _ => Err(Failure::new(ErrorCode::InvalidHandle)),
        }
    }

    pub(crate) fn view(&self, unit: Unit) -> Result<UnitView, Failure> {
        if unit == Unit::BOARD {
            return Ok(UnitView {
                address: self.config.address,
                timeout: self.config.timeout,
                send_eoi: self.config.send_eoi,
                eos: self.config.eos,
                is_board: true,
            });
        }
        match self.units.get(unit.0 as usize - 1) {
            Some(Some(device)) => Ok(UnitView {
                address: device.address,
                timeout: device.timeout,
                send_eoi: device.send_eoi,
                eos: device.eos,
                is_board: false,
            }),
            _ => Err(Failure::new(ErrorCode::InvalidHandle)),
        }
    }

    fn address_of(&self, unit: Unit) -> Result<BusAddress, Failure> {
        Ok(self.view(unit)?.address)
    }

    fn set_address(&mut self, unit: Unit, address: BusAddress) {
        match self.device_mut(unit) {
            Some(device) => device.address = address,
            None => self.config.address = address,
        }
    }

    fn set_timeout(&mut self, unit: Unit, timeout: Timeout) {
        match self.device_mut(unit) {
            Some(device) => device.timeout = timeout,
            None => self.config.timeout = timeout,
        }
    }

    fn set_send_eoi(&mut self, unit: Unit, enable: bool) {
        match self.device_mut(unit) {
            Some(device) => device.send_eoi = enable,
            None => self.config.send_eoi = enable,
        }
    }

    fn set_eos(&mut self, unit: Unit, eos: Option<Eos>) {
        match self.device_mut(unit) {
            Some(device) => device.eos = eos,
            None => self.config.eos = eos,
        }
    }

    fn device_mut(&mut self, unit: Unit) -> Option<&mut DeviceConfig> {
        if unit == Unit::BOARD {
            return None;
        }
        self.units
            .get_mut(unit.0 as usize - 1)
            .and_then(Option::as_mut)
    }
}
