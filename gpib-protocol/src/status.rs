use std::fmt::Display;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// The status word produced by every bus operation.
///
/// A typed bit vector of independent condition flags. The same type doubles
/// as the wait mask for completion waits.
///
/// ```
/// use gpib_protocol::StatusWord;
///
/// let status = StatusWord::empty()
///     .with(StatusWord::CIC)
///     .with(StatusWord::CMPL);
/// assert!(status.controller_in_charge());
/// assert!(status.complete());
/// assert!(!status.err());
/// ```
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct StatusWord(u16);

impl StatusWord {
    /// Error detected; the thread error code is meaningful.
    pub const ERR: StatusWord = StatusWord(0x8000);
    /// The operation timed out.
    pub const TIMO: StatusWord = StatusWord(0x4000);
    /// EOI or the end-of-string condition was detected.
    pub const END: StatusWord = StatusWord(0x2000);
    /// SRQ detected while Controller-in-Charge.
    pub const SRQI: StatusWord = StatusWord(0x1000);
    /// The polled device needs service.
    pub const RQS: StatusWord = StatusWord(0x0800);
    /// I/O complete.
    pub const CMPL: StatusWord = StatusWord(0x0100);
    /// Local lockout in effect.
    pub const LOK: StatusWord = StatusWord(0x0080);
    /// Remote state.
    pub const REM: StatusWord = StatusWord(0x0040);
    /// This board is Controller-in-Charge.
    pub const CIC: StatusWord = StatusWord(0x0020);
    /// Attention is asserted.
    pub const ATN: StatusWord = StatusWord(0x0010);
    /// Talker active.
    pub const TACS: StatusWord = StatusWord(0x0008);
    /// Listener active.
    pub const LACS: StatusWord = StatusWord(0x0004);
    /// Device trigger state.
    pub const DTAS: StatusWord = StatusWord(0x0002);
    /// Device clear state.
    pub const DCAS: StatusWord = StatusWord(0x0001);

    /// The word with no flag set.
    pub const fn empty() -> StatusWord {
        StatusWord(0)
    }

    /// Returns a copy with `flag` set.
    #[must_use]
    pub const fn with(self, flag: StatusWord) -> StatusWord {
        StatusWord(self.0 | flag.0)
    }

    /// Returns a copy with `flag` cleared.
    #[must_use]
    pub const fn without(self, flag: StatusWord) -> StatusWord {
        StatusWord(self.0 & !flag.0)
    }

    /// Whether every flag in `flags` is set.
    pub const fn contains(self, flags: StatusWord) -> bool {
        self.0 & flags.0 == flags.0
    }

    /// Whether any flag in `flags` is set.
    pub const fn intersects(self, flags: StatusWord) -> bool {
        self.0 & flags.0 != 0
    }

    /// The raw bit pattern.
    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn err(self) -> bool {
        self.contains(Self::ERR)
    }

    pub const fn timed_out(self) -> bool {
        self.contains(Self::TIMO)
    }

    pub const fn end(self) -> bool {
        self.contains(Self::END)
    }

    pub const fn service_requested(self) -> bool {
        self.contains(Self::SRQI)
    }

    pub const fn needs_service(self) -> bool {
        self.contains(Self::RQS)
    }

    pub const fn complete(self) -> bool {
        self.contains(Self::CMPL)
    }

    pub const fn lockout(self) -> bool {
        self.contains(Self::LOK)
    }

    pub const fn remote(self) -> bool {
        self.contains(Self::REM)
    }

    pub const fn controller_in_charge(self) -> bool {
        self.contains(Self::CIC)
    }

    pub const fn attention(self) -> bool {
        self.contains(Self::ATN)
    }

    pub const fn talker_active(self) -> bool {
        self.contains(Self::TACS)
    }

    pub const fn listener_active(self) -> bool {
        self.contains(Self::LACS)
    }

    pub const fn triggered(self) -> bool {
        self.contains(Self::DTAS)
    }

    pub const fn cleared(self) -> bool {
        self.contains(Self::DCAS)
    }
}

impl BitOr for StatusWord {
    type Output = StatusWord;

    fn bitor(self, rhs: StatusWord) -> StatusWord {
        StatusWord(self.0 | rhs.0)
    }
}

impl BitOrAssign for StatusWord {
    fn bitor_assign(&mut self, rhs: StatusWord) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for StatusWord {
    type Output = StatusWord;

    fn bitand(self, rhs: StatusWord) -> StatusWord {
        StatusWord(self.0 & rhs.0)
    }
}

impl Display for StatusWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(StatusWord, &str); 14] = [
            (StatusWord::ERR, "ERR"),
            (StatusWord::TIMO, "TIMO"),
            (StatusWord::END, "END"),
            (StatusWord::SRQI, "SRQI"),
            (StatusWord::RQS, "RQS"),
            (StatusWord::CMPL, "CMPL"),
            (StatusWord::LOK, "LOK"),
            (StatusWord::REM, "REM"),
            (StatusWord::CIC, "CIC"),
            (StatusWord::ATN, "ATN"),
            (StatusWord::TACS, "TACS"),
            (StatusWord::LACS, "LACS"),
            (StatusWord::DTAS, "DTAS"),
            (StatusWord::DCAS, "DCAS"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "(none)")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StatusWord({:#06x}: {})", self.0, self)
    }
}

#[test]
fn flags_are_independent() {
    let mut seen = 0u16;
    for flag in [
        StatusWord::ERR,
        StatusWord::TIMO,
        StatusWord::END,
        StatusWord::SRQI,
        StatusWord::RQS,
        StatusWord::CMPL,
        StatusWord::LOK,
        StatusWord::REM,
        StatusWord::CIC,
        StatusWord::ATN,
        StatusWord::TACS,
        StatusWord::LACS,
        StatusWord::DTAS,
        StatusWord::DCAS,
    ] {
        assert_eq!(seen & flag.bits(), 0);
        seen |= flag.bits();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn with_and_without() {
        let status = StatusWord::empty().with(StatusWord::CIC).with(StatusWord::ATN);
        assert!(status.controller_in_charge());
        assert!(status.attention());
        assert!(!status.without(StatusWord::ATN).attention());
    }

    #[test]
    fn display_names_set_flags() {
        let status = StatusWord::empty().with(StatusWord::CMPL).with(StatusWord::END);
        assert_eq!(status.to_string(), "END|CMPL");
        assert_eq!(StatusWord::empty().to_string(), "(none)");
    }
}
