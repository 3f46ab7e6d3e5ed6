/// State and event indicators carried in a data packet trailer.
///
/// The discriminant is the bit position within the 12-bit enable and
/// indicator groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateEvent {
    CalibratedTime = 11,
    ValidData = 10,
    ReferenceLock = 9,
    Agc = 8,
    DetectedSignal = 7,
    SpectralInversion = 6,
    OverRange = 5,
    SampleLoss = 4,
    User3 = 3,
    User2 = 2,
    User1 = 1,
    User0 = 0,
}

impl StateEvent {
    pub const ALL: [StateEvent; 12] = [
        StateEvent::CalibratedTime,
        StateEvent::ValidData,
        StateEvent::ReferenceLock,
        StateEvent::Agc,
        StateEvent::DetectedSignal,
        StateEvent::SpectralInversion,
        StateEvent::OverRange,
        StateEvent::SampleLoss,
        StateEvent::User3,
        StateEvent::User2,
        StateEvent::User1,
        StateEvent::User0,
    ];

    fn mask(self) -> u16 {
        1 << (self as u16)
    }

    pub fn name(self) -> &'static str {
        match self {
            StateEvent::CalibratedTime => "calibrated-time",
            StateEvent::ValidData => "valid-data",
            StateEvent::ReferenceLock => "reference-lock",
            StateEvent::Agc => "agc",
            StateEvent::DetectedSignal => "detected-signal",
            StateEvent::SpectralInversion => "spectral-inversion",
            StateEvent::OverRange => "over-range",
            StateEvent::SampleLoss => "sample-loss",
            StateEvent::User3 => "user-3",
            StateEvent::User2 => "user-2",
            StateEvent::User1 => "user-1",
            StateEvent::User0 => "user-0",
        }
    }
}

/// The 4-byte data packet trailer.
///
/// ```text
/// 31..20   19..8       7   6..0
/// enables  indicators  E   associated context packet count
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Trailer {
    /// 12 enable bits; an indicator is meaningful only when enabled.
    pub enables: u16,
    /// 12 indicator bits.
    pub indicators: u16,
    /// Associated context packet count, when the E bit is set.
    pub associated_context_count: Option<u8>,
}

impl Trailer {
    pub const SIZE: usize = 4;

    pub fn from_word(word: u32) -> Self {
        Self {
            enables: ((word >> 20) & 0xFFF) as u16,
            indicators: ((word >> 8) & 0xFFF) as u16,
            associated_context_count: (word & 0x80 != 0).then_some((word & 0x7F) as u8),
        }
    }

    pub fn to_word(&self) -> u32 {
        let mut word = (u32::from(self.enables & 0xFFF) << 20)
            | (u32::from(self.indicators & 0xFFF) << 8);
        if let Some(count) = self.associated_context_count {
            word |= 0x80 | u32::from(count & 0x7F);
        }
        word
    }

    /// Tri-state read: `None` when the indicator is not enabled.
    pub fn get(&self, event: StateEvent) -> Option<bool> {
        let mask = event.mask();
        (self.enables & mask != 0).then_some(self.indicators & mask != 0)
    }

    /// Tri-state write: `None` clears both enable and indicator.
    pub fn set(&mut self, event: StateEvent, value: Option<bool>) {
        let mask = event.mask();
        match value {
            None => {
                self.enables &= !mask;
                self.indicators &= !mask;
            }
            Some(flag) => {
                self.enables |= mask;
                if flag {
                    self.indicators |= mask;
                } else {
                    self.indicators &= !mask;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tri_state_bits() {
        let mut trailer = Trailer::default();
        assert_eq!(trailer.get(StateEvent::ValidData), None);

        trailer.set(StateEvent::ValidData, Some(true));
        trailer.set(StateEvent::OverRange, Some(false));
        assert_eq!(trailer.get(StateEvent::ValidData), Some(true));
        assert_eq!(trailer.get(StateEvent::OverRange), Some(false));

        trailer.set(StateEvent::ValidData, None);
        assert_eq!(trailer.get(StateEvent::ValidData), None);
        assert_eq!(trailer.indicators, 0);
    }

    #[test]
    fn word_layout() {
        let mut trailer = Trailer::default();
        trailer.set(StateEvent::CalibratedTime, Some(true));
        trailer.associated_context_count = Some(3);
        assert_eq!(trailer.to_word(), 0x8008_0083);
        assert_eq!(Trailer::from_word(0x8008_0083), trailer);
    }

    #[test]
    fn count_invalid_without_e_bit() {
        assert_eq!(Trailer::from_word(0x0000_0005).associated_context_count, None);
    }
}
