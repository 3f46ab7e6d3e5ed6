//! Packet timestamps.
//!
//! The integer part is 32 bits whose meaning depends on the TSI code; the
//! fractional part is 64 bits whose meaning depends on the TSF code. Absent
//! parts carry code 0.

/// Integer-seconds timestamp mode (TSI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IntegerMode {
    #[default]
    None = 0,
    Utc = 1,
    Gps = 2,
    Other = 3,
}

impl IntegerMode {
    /// Decode a 2-bit TSI code.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            1 => Self::Utc,
            2 => Self::Gps,
            3 => Self::Other,
            _ => Self::None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Fractional timestamp mode (TSF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FractionalMode {
    #[default]
    None = 0,
    SampleCount = 1,
    RealTime = 2,
    FreeRunning = 3,
}

impl FractionalMode {
    /// Decode a 2-bit TSF code.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            1 => Self::SampleCount,
            2 => Self::RealTime,
            3 => Self::FreeRunning,
            _ => Self::None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Picoseconds in one second; upper bound for real-time fractional values.
pub const PICOSECONDS_PER_SECOND: u64 = 1_000_000_000_000;

/// A packet timestamp. A part whose mode is `None` is absent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeStamp {
    pub integer_mode: IntegerMode,
    pub fractional_mode: FractionalMode,
    pub seconds: u32,
    pub fractional: u64,
}

impl TimeStamp {
    /// UTC seconds plus real-time picoseconds.
    pub fn utc(seconds: u32, picoseconds: u64) -> Self {
        Self {
            integer_mode: IntegerMode::Utc,
            fractional_mode: FractionalMode::RealTime,
            seconds,
            fractional: picoseconds,
        }
    }

    /// GPS seconds plus real-time picoseconds.
    pub fn gps(seconds: u32, picoseconds: u64) -> Self {
        Self {
            integer_mode: IntegerMode::Gps,
            fractional_mode: FractionalMode::RealTime,
            seconds,
            fractional: picoseconds,
        }
    }

    /// Only a free-running sample count, no integer seconds.
    pub fn sample_count(count: u64) -> Self {
        Self {
            integer_mode: IntegerMode::None,
            fractional_mode: FractionalMode::SampleCount,
            seconds: 0,
            fractional: count,
        }
    }

    pub fn is_none(&self) -> bool {
        self.integer_mode == IntegerMode::None && self.fractional_mode == FractionalMode::None
    }

    /// Bytes this timestamp occupies in the packet prologue.
    pub fn wire_len(&self) -> usize {
        let mut len = 0;
        if self.integer_mode != IntegerMode::None {
            len += 4;
        }
        if self.fractional_mode != FractionalMode::None {
            len += 8;
        }
        len
    }

    /// Picoseconds within the second, when the fractional part is real-time.
    pub fn picoseconds(&self) -> Option<u64> {
        (self.fractional_mode == FractionalMode::RealTime).then_some(self.fractional)
    }

    /// Seconds with fraction as floating point, when both parts are time based.
    pub fn as_secs_f64(&self) -> Option<f64> {
        if self.integer_mode == IntegerMode::None {
            return None;
        }
        let frac = self
            .picoseconds()
            .map(|ps| ps as f64 / PICOSECONDS_PER_SECOND as f64)
            .unwrap_or(0.0);
        Some(f64::from(self.seconds) + frac)
    }
}

impl std::fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.integer_mode, self.fractional_mode) {
            (IntegerMode::None, FractionalMode::None) => f.write_str("none"),
            (IntegerMode::None, mode) => write!(f, "{:?}:{}", mode, self.fractional),
            (mode, FractionalMode::None) => write!(f, "{:?}:{}", mode, self.seconds),
            (mode, FractionalMode::RealTime) => {
                write!(f, "{:?}:{}.{:012}", mode, self.seconds, self.fractional)
            }
            (mode, frac_mode) => write!(
                f,
                "{:?}:{} {:?}:{}",
                mode, self.seconds, frac_mode, self.fractional
            ),
        }
    }
}
