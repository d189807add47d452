use std::fmt::Display;

/// How a write signals the end of the transfer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SendEnd {
    /// Do nothing at the end of the transfer.
    None,
    /// Assert EOI coincident with the last data byte. A zero-length transfer
    /// still asserts EOI.
    #[default]
    Eoi,
    /// Append a newline after the data and send it with EOI asserted. This
    /// is distinct from asserting EOI on the original final byte.
    NewlineEoi,
}

/// Per-call termination condition for the multi-device receive operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadTermination {
    /// Stop when a byte arrives with EOI asserted (or the count is reached).
    End,
    /// Stop when this 8-bit end-of-string byte is received (or on EOI or the
    /// count).
    Eos(u8),
}

const REOS: u16 = 0x0400;
const XEOS: u16 = 0x0800;
const BIN: u16 = 0x1000;

/// End-of-string configuration for a unit.
///
/// Packs to a 16-bit value: the EOS character in the low byte and the mode
/// flags in the high byte. A packed value of zero means EOS handling is
/// disabled.
///
/// ```
/// use gpib_protocol::Eos;
///
/// let eos = Eos::new(b'\n').terminate_read(true).full_compare(true);
/// assert_eq!(eos.pack(), 0x140A);
/// assert_eq!(Eos::unpack(0x140A), Some(eos));
/// assert_eq!(Eos::unpack(0), None);
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Eos {
    character: u8,
    flags: u16,
}

impl Eos {
    /// A configuration for `character` with every mode flag clear.
    pub const fn new(character: u8) -> Eos {
        Eos {
            character,
            flags: 0,
        }
    }

    /// The configured end-of-string character.
    pub const fn character(self) -> u8 {
        self.character
    }

    /// Select whether reads terminate when the character is matched.
    #[must_use]
    pub const fn terminate_read(self, enable: bool) -> Eos {
        self.flag(REOS, enable)
    }

    /// Select whether EOI is asserted when the character is sent.
    #[must_use]
    pub const fn assert_eoi_on_send(self, enable: bool) -> Eos {
        self.flag(XEOS, enable)
    }

    /// Select an 8-bit compare instead of the default 7-bit compare.
    #[must_use]
    pub const fn full_compare(self, enable: bool) -> Eos {
        self.flag(BIN, enable)
    }

    const fn flag(self, flag: u16, enable: bool) -> Eos {
        Eos {
            character: self.character,
            flags: if enable {
                self.flags | flag
            } else {
                self.flags & !flag
            },
        }
    }

    pub const fn terminates_read(self) -> bool {
        self.flags & REOS != 0
    }

    pub const fn eoi_on_send(self) -> bool {
        self.flags & XEOS != 0
    }

    pub const fn compares_full_byte(self) -> bool {
        self.flags & BIN != 0
    }

    /// Whether an incoming byte matches the character under the configured
    /// compare width. The 7-bit compare ignores the top bit of both sides.
    pub const fn matches(self, byte: u8) -> bool {
        if self.compares_full_byte() {
            byte == self.character
        } else {
            byte & 0x7F == self.character & 0x7F
        }
    }

    /// The packed 16-bit configuration value.
    pub const fn pack(self) -> u16 {
        self.flags | self.character as u16
    }

    /// Decodes a packed configuration value; zero means disabled. Bits
    /// outside the character and the three mode flags are discarded.
    pub const fn unpack(packed: u16) -> Option<Eos> {
        if packed == 0 {
            return None;
        }
        Some(Eos {
            character: (packed & 0xFF) as u8,
            flags: packed & (REOS | XEOS | BIN),
        })
    }
}

impl Display for SendEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendEnd::None => write!(f, "no end signaling"),
            SendEnd::Eoi => write!(f, "EOI on last byte"),
            SendEnd::NewlineEoi => write!(f, "newline with EOI"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let eos = Eos::new(b'\r')
            .terminate_read(true)
            .assert_eoi_on_send(true);
        assert_eq!(Eos::unpack(eos.pack()), Some(eos));
    }

    #[test]
    fn zero_means_disabled() {
        assert_eq!(Eos::unpack(0), None);
    }

    #[test]
    fn seven_bit_compare_ignores_the_top_bit() {
        let eos = Eos::new(b'\n').terminate_read(true);
        assert!(eos.matches(b'\n'));
        assert!(eos.matches(b'\n' | 0x80));
        assert!(!eos.full_compare(true).matches(b'\n' | 0x80));
    }

    #[test]
    fn unknown_flag_bits_are_discarded() {
        let eos = Eos::unpack(0xFF0A).unwrap();
        assert_eq!(eos.pack(), 0x1C0A);
    }
}
