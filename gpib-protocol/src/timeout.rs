use std::fmt::Display;
use std::time::Duration;

/// The enumerated timeout ladder.
///
/// Timeouts are not arbitrary durations: a unit is always configured with
/// one of these rungs. [`Timeout::nearest`] selects the first rung that
/// covers a requested duration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum Timeout {
    /// Timeout disabled (infinite).
    None = 0,
    Us10 = 1,
    Us30 = 2,
    Us100 = 3,
    Us300 = 4,
    Ms1 = 5,
    Ms3 = 6,
    Ms10 = 7,
    Ms30 = 8,
    Ms100 = 9,
    Ms300 = 10,
    S1 = 11,
    S3 = 12,
    #[default]
    S10 = 13,
    S30 = 14,
    S100 = 15,
    S300 = 16,
    S1000 = 17,
}

const LADDER: [Timeout; 18] = [
    Timeout::None,
    Timeout::Us10,
    Timeout::Us30,
    Timeout::Us100,
    Timeout::Us300,
    Timeout::Ms1,
    Timeout::Ms3,
    Timeout::Ms10,
    Timeout::Ms30,
    Timeout::Ms100,
    Timeout::Ms300,
    Timeout::S1,
    Timeout::S3,
    Timeout::S10,
    Timeout::S30,
    Timeout::S100,
    Timeout::S300,
    Timeout::S1000,
];

impl Timeout {
    /// The numeric selection code of this rung.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a selection code.
    pub fn from_code(code: u8) -> Option<Timeout> {
        LADDER.get(code as usize).copied()
    }

    /// The ideal duration of this rung; `None` when disabled.
    pub const fn duration(self) -> Option<Duration> {
        let micros = match self {
            Timeout::None => return None,
            Timeout::Us10 => 10,
            Timeout::Us30 => 30,
            Timeout::Us100 => 100,
            Timeout::Us300 => 300,
            Timeout::Ms1 => 1_000,
            Timeout::Ms3 => 3_000,
            Timeout::Ms10 => 10_000,
            Timeout::Ms30 => 30_000,
            Timeout::Ms100 => 100_000,
            Timeout::Ms300 => 300_000,
            Timeout::S1 => 1_000_000,
            Timeout::S3 => 3_000_000,
            Timeout::S10 => 10_000_000,
            Timeout::S30 => 30_000_000,
            Timeout::S100 => 100_000_000,
            Timeout::S300 => 300_000_000,
            Timeout::S1000 => 1_000_000_000,
        };
        Some(Duration::from_micros(micros))
    }

    /// The first rung whose duration covers `requested`; a shorter rung
    /// would expire before the requested deadline. Zero selects the disabled
    /// rung; durations beyond the top rung saturate at 1000 s.
    pub fn nearest(requested: Duration) -> Timeout {
        if requested.is_zero() {
            return Timeout::None;
        }
        for rung in &LADDER[1..] {
            if rung.duration().unwrap() >= requested {
                return *rung;
            }
        }
        Timeout::S1000
    }
}

impl Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.duration() {
            None => write!(f, "disabled"),
            Some(duration) => write!(f, "{:?}", duration),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for code in 0..=17 {
            assert_eq!(Timeout::from_code(code).unwrap().code(), code);
        }
        assert_eq!(Timeout::from_code(18), None);
    }

    #[test]
    fn nearest_rounds_up() {
        assert_eq!(Timeout::nearest(Duration::ZERO), Timeout::None);
        assert_eq!(Timeout::nearest(Duration::from_micros(10)), Timeout::Us10);
        assert_eq!(Timeout::nearest(Duration::from_micros(11)), Timeout::Us30);
        assert_eq!(Timeout::nearest(Duration::from_millis(2)), Timeout::Ms3);
        assert_eq!(Timeout::nearest(Duration::from_secs(45)), Timeout::S100);
        assert_eq!(Timeout::nearest(Duration::from_secs(5000)), Timeout::S1000);
    }

    #[test]
    fn ladder_is_monotonic() {
        for pair in LADDER[1..].windows(2) {
            assert!(pair[0].duration().unwrap() < pair[1].duration().unwrap());
        }
    }
}
