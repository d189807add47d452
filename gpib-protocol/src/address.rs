use crate::command;
use crate::error::AddressError;
use std::fmt::Display;

/// Highest valid primary address on the bus.
pub const PRIMARY_MAX: u8 = 30;
/// Lowest valid secondary address (hex 60).
pub const SECONDARY_MIN: u8 = 0x60;
/// Highest valid secondary address (hex 7E).
pub const SECONDARY_MAX: u8 = 0x7E;

/// Reserved packed value that terminates an address list.
/// Not a valid address; [`BusAddress::unpack`] rejects it.
pub const NOADDR: u16 = 0xFFFF;

/// A two-level bus address: a primary address in `0..=30` and an optional
/// secondary address in `0x60..=0x7E`.
///
/// The packed 16-bit form places the primary address in the low byte and the
/// secondary address in the high byte (zero when disabled):
///
/// ```
/// use gpib_protocol::BusAddress;
///
/// let plain = BusAddress::new(9).unwrap();
/// assert_eq!(plain.pack(), 0x0009);
///
/// let extended = BusAddress::with_secondary(9, 0x6E).unwrap();
/// assert_eq!(extended.pack(), 0x6E09);
/// assert_eq!(BusAddress::unpack(0x6E09).unwrap(), extended);
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BusAddress {
    primary: u8,
    secondary: Option<u8>,
}

impl BusAddress {
    /// Creates an address with the secondary part disabled.
    pub fn new(primary: u8) -> Result<BusAddress, AddressError> {
        if primary > PRIMARY_MAX {
            return Err(AddressError::PrimaryOutOfRange(primary));
        }
        Ok(BusAddress {
            primary,
            secondary: None,
        })
    }

    /// Creates an address with both a primary and a secondary part.
    pub fn with_secondary(primary: u8, secondary: u8) -> Result<BusAddress, AddressError> {
        if primary > PRIMARY_MAX {
            return Err(AddressError::PrimaryOutOfRange(primary));
        }
        if !(SECONDARY_MIN..=SECONDARY_MAX).contains(&secondary) {
            return Err(AddressError::SecondaryOutOfRange(secondary));
        }
        Ok(BusAddress {
            primary,
            secondary: Some(secondary),
        })
    }

    /// The primary address.
    pub fn primary(&self) -> u8 {
        self.primary
    }

    /// The secondary address, if enabled.
    pub fn secondary(&self) -> Option<u8> {
        self.secondary
    }

    /// Packs into the 16-bit wire form: primary in the low byte, secondary
    /// (or zero) in the high byte.
    pub fn pack(&self) -> u16 {
        u16::from(self.primary) | (u16::from(self.secondary.unwrap_or(0)) << 8)
    }

    /// Inverts [`pack`](Self::pack) exactly. The list terminator and any
    /// value whose bytes fall outside the valid ranges are rejected.
    pub fn unpack(packed: u16) -> Result<BusAddress, AddressError> {
        if packed == NOADDR {
            return Err(AddressError::ReservedTerminator);
        }
        let primary = (packed & 0xFF) as u8;
        let secondary = (packed >> 8) as u8;
        if secondary == 0 {
            BusAddress::new(primary)
        } else {
            BusAddress::with_secondary(primary, secondary)
        }
    }

    /// The my-listen-address command byte for this address.
    pub fn listen_command(&self) -> u8 {
        command::mla(self.primary)
    }

    /// The my-talk-address command byte for this address.
    pub fn talk_command(&self) -> u8 {
        command::mta(self.primary)
    }

    /// The secondary command byte, if a secondary address is enabled.
    /// Secondary addresses already occupy the secondary command group, so the
    /// byte equals the address itself.
    pub fn secondary_command(&self) -> Option<u8> {
        self.secondary
    }
}

impl Display for BusAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.secondary {
            Some(sad) => write!(f, "{}:{:#04x}", self.primary, sad),
            None => write!(f, "{}", self.primary),
        }
    }
}

/// An address list resolved for the transport: the packed input addresses
/// followed by exactly one [`NOADDR`] terminator.
///
/// [`resolve`] is the only constructor, so an unterminated or
/// doubly-terminated list cannot reach the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedList {
    packed: Vec<u16>,
    addresses: Vec<BusAddress>,
}

/// Resolves an address list for a multi-device operation.
///
/// Appends the single [`NOADDR`] terminator that the transport requires. An
/// empty input resolves to the terminator-only broadcast form, which means
/// "operate on the currently addressed set", not "no devices".
///
/// ```
/// use gpib_protocol::{BusAddress, NOADDR, resolve};
///
/// let list = resolve(&[BusAddress::new(3).unwrap(), BusAddress::new(5).unwrap()]);
/// assert_eq!(list.packed(), &[0x0003, 0x0005, NOADDR]);
///
/// let broadcast = resolve(&[]);
/// assert!(broadcast.is_broadcast());
/// assert_eq!(broadcast.packed(), &[NOADDR]);
/// ```
pub fn resolve(addresses: &[BusAddress]) -> ResolvedList {
    let mut packed = Vec::with_capacity(addresses.len() + 1);
    packed.extend(addresses.iter().map(BusAddress::pack));
    packed.push(NOADDR);
    ResolvedList {
        packed,
        addresses: addresses.to_vec(),
    }
}

impl ResolvedList {
    /// The packed form handed to the transport, including the terminator.
    pub fn packed(&self) -> &[u16] {
        &self.packed
    }

    /// The enumerated addresses, terminator excluded.
    pub fn addresses(&self) -> &[BusAddress] {
        &self.addresses
    }

    /// Number of enumerated addresses (the terminator does not count).
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// `true` for the terminator-only broadcast form.
    pub fn is_broadcast(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Interface command bytes that address every listed device to listen:
    /// unlisten, then the listen (and secondary) command per entry.
    /// The broadcast form yields no bytes; the active set stays addressed.
    pub fn listen_sequence(&self) -> Vec<u8> {
        if self.is_broadcast() {
            return Vec::new();
        }
        let mut sequence = Vec::with_capacity(1 + 2 * self.addresses.len());
        sequence.push(command::UNL);
        for address in &self.addresses {
            sequence.push(address.listen_command());
            if let Some(sad) = address.secondary_command() {
                sequence.push(sad);
            }
        }
        sequence
    }
}

#[test]
fn pack_roundtrip_over_valid_domain() {
    for pad in 0..=PRIMARY_MAX {
        let plain = BusAddress::new(pad).unwrap();
        assert_eq!(BusAddress::unpack(plain.pack()).unwrap(), plain);
        for sad in SECONDARY_MIN..=SECONDARY_MAX {
            let extended = BusAddress::with_secondary(pad, sad).unwrap();
            assert_eq!(BusAddress::unpack(extended.pack()).unwrap(), extended);
        }
    }
}
