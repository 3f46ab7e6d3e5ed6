use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// 64-bit class identifier: 24-bit OUI, 16-bit information class code,
/// 16-bit packet class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassIdentifier {
    pub oui: u32,
    pub icc: u16,
    pub pcc: u16,
}

impl ClassIdentifier {
    /// Wire size of the class identifier section.
    pub const SIZE: usize = 8;

    /// Create a class identifier. The OUI is truncated to 24 bits.
    pub fn new(oui: u32, icc: u16, pcc: u16) -> Self {
        Self {
            oui: oui & 0x00FF_FFFF,
            icc,
            pcc,
        }
    }

    /// Build from the two big-endian words following the stream identifier.
    pub fn from_words(first: u32, second: u32) -> Self {
        Self {
            oui: first & 0x00FF_FFFF,
            icc: (second >> 16) as u16,
            pcc: second as u16,
        }
    }

    /// The two wire words (reserved byte is zero).
    pub fn to_words(self) -> (u32, u32) {
        (
            self.oui & 0x00FF_FFFF,
            (u32::from(self.icc) << 16) | u32::from(self.pcc),
        )
    }

    /// The identifier packed into a single `u64`.
    pub fn as_u64(self) -> u64 {
        let (hi, lo) = self.to_words();
        (u64::from(hi) << 32) | u64::from(lo)
    }
}

impl fmt::Display for ClassIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}-{:02X}-{:02X}:{:04X}.{:04X}",
            (self.oui >> 16) & 0xFF,
            (self.oui >> 8) & 0xFF,
            self.oui & 0xFF,
            self.icc,
            self.pcc
        )
    }
}

impl FromStr for ClassIdentifier {
    type Err = CodecError;

    /// Parse `XX-XX-XX:ICC.PCC` (hex digits).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::InvalidField(format!("invalid class identifier '{s}'"));

        let (oui, codes) = s.split_once(':').ok_or_else(invalid)?;
        let (icc, pcc) = codes.split_once('.').ok_or_else(invalid)?;

        let mut oui_value = 0u32;
        let mut parts = 0;
        for part in oui.split('-') {
            if part.len() != 2 {
                return Err(invalid());
            }
            let byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
            oui_value = (oui_value << 8) | u32::from(byte);
            parts += 1;
        }
        if parts != 3 {
            return Err(invalid());
        }

        let icc = u16::from_str_radix(icc, 16).map_err(|_| invalid())?;
        let pcc = u16::from_str_radix(pcc, 16).map_err(|_| invalid())?;
        Ok(Self::new(oui_value, icc, pcc))
    }
}
