//! # GPIB Protocol Library
//!
//! This crate provides the data model for controlling an IEEE-488 (GPIB)
//! instrument bus: bus addresses and address lists, interface command bytes,
//! the operation status word, the error taxonomy, transfer termination
//! settings and the enumerated timeout ladder.
//!
//! ## Overview
//!
//! GPIB is the classic instrument-control bus: a controller addresses
//! talkers and listeners, moves data, and polls devices for service
//! requests. This crate covers the representation layer only — the types
//! that every controller operation consumes and produces. The stateful
//! control plane lives in the `gpib-control` crate.
//!
//! ## Addresses and address lists
//!
//! A [`BusAddress`] is a (primary, secondary) pair; it packs into 16 bits
//! with the primary address in the low byte:
//!
//! ```
//! use gpib_protocol::BusAddress;
//!
//! let dmm = BusAddress::with_secondary(22, 0x6E).unwrap();
//! assert_eq!(dmm.pack(), 0x6E16);
//! assert_eq!(BusAddress::unpack(0x6E16).unwrap(), dmm);
//! ```
//!
//! Multi-device operations take an address list terminated by the reserved
//! [`NOADDR`] sentinel. [`resolve`] owns the termination, so callers never
//! append the sentinel themselves:
//!
//! ```
//! use gpib_protocol::{BusAddress, NOADDR, resolve};
//!
//! let list = resolve(&[BusAddress::new(4).unwrap()]);
//! assert_eq!(list.packed(), &[0x0004, NOADDR]);
//!
//! // The terminator-only form addresses the currently active set.
//! assert!(resolve(&[]).is_broadcast());
//! ```
//!
//! ## Status reporting
//!
//! Every operation yields a [`StatusWord`], a typed bit vector of
//! independent condition flags. The error flag is set exactly when a
//! thread-scoped [`ErrorCode`](error::ErrorCode) accompanies the word:
//!
//! ```
//! use gpib_protocol::StatusWord;
//!
//! let status = StatusWord::empty().with(StatusWord::CMPL).with(StatusWord::CIC);
//! assert!(status.complete() && status.controller_in_charge());
//! assert!(!status.err());
//! ```
//!
//! ## Termination
//!
//! Writes signal their end per [`SendEnd`](termination::SendEnd); reads stop
//! on a byte count, on EOI, or on a configured end-of-string match
//! ([`Eos`](termination::Eos)). Timeouts come from the closed
//! [`Timeout`](timeout::Timeout) ladder rather than arbitrary durations.

pub mod address;
pub use address::*;
pub mod command;
pub mod error;
pub mod status;
pub use status::StatusWord;
pub mod termination;
pub use termination::{Eos, ReadTermination, SendEnd};
pub mod timeout;
pub use timeout::Timeout;
