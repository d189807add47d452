//! # GPIB Control Library
//!
//! This crate provides the control plane for an IEEE-488 (GPIB) instrument
//! bus: addressing devices, moving data, acquiring and handing off the
//! Controller-in-Charge role, polling for service requests, and reporting
//! every outcome through a thread-scoped status/error/count triple.
//!
//! ## Architecture
//!
//! The crate is built around two main components:
//!
//! - **[`Transport`] Trait**: the seam to the physical bus transceiver.
//!   Backends implement raw command/data byte exchange, line-state queries
//!   and role queries; they contain no protocol logic.
//! - **[`Board`]**: the controller. It owns a transport, hands out unit
//!   descriptors for attached devices, validates controller-role
//!   preconditions, resolves address lists, applies the transfer termination
//!   policy and records the outcome of every operation.
//!
//! ## How it works
//!
//! 1. A backend (for example the simulator in `gpib-sim`) implements
//!    [`Transport`]
//! 2. The backend is wrapped in a [`Board`] via [`board::Builder`]
//! 3. Devices are opened as [`board::Unit`] descriptors
//! 4. Operations run synchronously, or asynchronously through
//!    [`async_io::AsyncOperation`] completion handles
//! 5. Every operation returns a [`result::Completion`] and overwrites the
//!    calling thread's status/error/count accessors
//!
//! ## Error handling
//!
//! Operations never unwind past the API surface. Failure is reported through
//! the error flag of the returned status word together with exactly one
//! [`ErrorCode`](gpib_protocol::error::ErrorCode); the transfer count stays
//! meaningful on partial transfers. Callers check after every call; the only
//! built-in recovery operations are [`Board::abort`] and
//! [`Board::reset_interface`].
//!
//! ## Thread model
//!
//! The status/error/count triple is strictly thread-local: concurrent
//! callers never observe each other's results. The bus itself is a single
//! shared resource; callers must serialize role-changing operations against
//! a given board externally.
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Enable a logger
//! implementation such as `env_logger` to see operations, addressing
//! sequences and error conditions.

pub mod async_io;
pub mod board;
pub mod controller;
pub mod poll;
pub mod result;
pub mod transfer;

pub use async_io::AsyncOperation;
pub use board::{Board, BoardConfig, BoardOption, Builder, DeviceConfig, Unit};
pub use controller::ControllerState;
pub use result::{Completion, last_count, last_error, last_status};

use gpib_protocol::{BusAddress, Eos, Timeout};
use std::{error::Error, fmt::Display, time::Duration};

/// Why a receive stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EndReason {
    /// The requested byte count was reached.
    CountReached,
    /// A byte arrived with EOI asserted.
    Eoi,
    /// A byte matched the end-of-string condition.
    EosMatch,
}

/// Bytes produced by a receive together with the stop reason.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reception {
    pub data: Vec<u8>,
    pub end: EndReason,
}

/// Levels of the bus management and handshake lines. `None` means the
/// transceiver cannot observe that line.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LineStates {
    pub eoi: Option<bool>,
    pub atn: Option<bool>,
    pub srq: Option<bool>,
    pub ren: Option<bool>,
    pub ifc: Option<bool>,
    pub nrfd: Option<bool>,
    pub ndac: Option<bool>,
    pub dav: Option<bool>,
}

/// The board's bus role as reported by the transceiver. The control plane
/// never caches this; transitions are confirmed by reading it back.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RoleState {
    /// The board is configured as System Controller.
    pub system_controller: bool,
    /// The board is Controller-in-Charge.
    pub cic: bool,
    /// The board is asserting ATN.
    pub atn: bool,
    /// Remote state.
    pub remote: bool,
    /// Local lockout in effect.
    pub lockout: bool,
    /// Talker active.
    pub talker: bool,
    /// Listener active.
    pub listener: bool,
}

/// Errors surfaced by a [`Transport`] backend. The control plane maps them
/// onto the status word and the error taxonomy; backends never report
/// through the thread-scoped state themselves.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportError {
    /// The configured timeout expired before the exchange completed.
    Timeout,
    /// A data send found no addressed listeners.
    NoListener,
    /// A command byte was not accepted by the bus.
    Bus,
    /// DMA failure in the transceiver.
    Dma,
    /// The transceiver lost power or went to standby.
    PowerLoss,
    /// Any other transceiver-level failure.
    System(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "transfer timed out"),
            TransportError::NoListener => write!(f, "no listeners on the bus"),
            TransportError::Bus => write!(f, "command not accepted"),
            TransportError::Dma => write!(f, "DMA error"),
            TransportError::PowerLoss => write!(f, "transceiver lost power"),
            TransportError::System(message) => write!(f, "{}", message),
        }
    }
}

impl Error for TransportError {}

/// The physical bus transceiver seam.
///
/// Implementations move raw bytes and report line states; all protocol
/// decisions (addressing, termination, role preconditions, status
/// reporting) stay in [`Board`]. Electrical timing and signal integrity are
/// entirely the backend's concern.
///
/// Blocking calls respect the timeout selected through
/// [`set_timeout`](Transport::set_timeout) and return
/// [`TransportError::Timeout`] on expiry.
pub trait Transport: Send + Sync {
    /// Send interface command bytes with ATN asserted. Returns the number of
    /// command bytes accepted.
    fn send_commands(&self, commands: &[u8]) -> Result<usize, TransportError>;

    /// Send data bytes to the currently addressed listeners. When
    /// `assert_eoi` is set, EOI must be asserted coincident with the final
    /// byte; a zero-length send still performs the assertion.
    ///
    /// Returns the number of data bytes transferred.
    fn send_data(&self, data: &[u8], assert_eoi: bool) -> Result<usize, TransportError>;

    /// Receive up to `max` bytes from the currently addressed talker. The
    /// exchange stops early when a byte arrives with EOI asserted, or when
    /// `eos` is given and a byte matches it.
    fn receive_data(&self, max: usize, eos: Option<Eos>) -> Result<Reception, TransportError>;

    /// Drive the Remote Enable line.
    fn set_remote_enable(&self, assert: bool) -> Result<(), TransportError>;

    /// Assert Interface Clear for at least `dwell`, forcing the transceiver
    /// to Controller-in-Charge and unaddressing every device.
    fn pulse_interface_clear(&self, dwell: Duration) -> Result<(), TransportError>;

    /// Drive the Attention line.
    fn set_attention(&self, assert: bool) -> Result<(), TransportError>;

    /// Collect the eight parallel poll response bits in a single bus cycle.
    fn parallel_poll(&self) -> Result<u8, TransportError>;

    /// Observe the bus management and handshake lines.
    fn lines(&self) -> Result<LineStates, TransportError>;

    /// Report the board's current bus role. Called after every role
    /// transition to confirm it took effect.
    fn role(&self) -> Result<RoleState, TransportError>;

    /// Probe for a listening device at `address`.
    fn listener_present(&self, address: BusAddress) -> Result<bool, TransportError>;

    /// Select the timeout rung governing subsequent blocking exchanges.
    fn set_timeout(&self, timeout: Timeout) -> Result<(), TransportError>;

    /// Forward the board's own serial poll response byte, requesting service
    /// from the Controller-in-Charge when its RQS bit is set.
    fn request_service(&self, status_byte: u8) -> Result<(), TransportError>;

    /// Set or clear the board's individual status bit for parallel polls.
    fn set_individual_status(&self, ist: bool) -> Result<(), TransportError>;
}
