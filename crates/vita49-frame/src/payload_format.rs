use crate::error::{CodecError, Result};

/// How each sample is composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RealComplex {
    #[default]
    Real = 0,
    ComplexCartesian = 1,
    ComplexPolar = 2,
}

impl RealComplex {
    fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(Self::Real),
            1 => Ok(Self::ComplexCartesian),
            2 => Ok(Self::ComplexPolar),
            other => Err(CodecError::InvalidField(format!(
                "reserved real/complex code {other}"
            ))),
        }
    }

    /// Scalar components per sample.
    pub fn components(self) -> usize {
        match self {
            Self::Real => 1,
            Self::ComplexCartesian | Self::ComplexPolar => 2,
        }
    }
}

/// Data item encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataItemFormat {
    #[default]
    SignedFixed,
    /// VRT float with the given exponent width (1..=6).
    SignedVrtFloat(u8),
    Float32,
    Float64,
    UnsignedFixed,
    UnsignedVrtFloat(u8),
}

impl DataItemFormat {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(Self::SignedFixed),
            0x01..=0x06 => Ok(Self::SignedVrtFloat(code)),
            0x0E => Ok(Self::Float32),
            0x0F => Ok(Self::Float64),
            0x10 => Ok(Self::UnsignedFixed),
            0x11..=0x16 => Ok(Self::UnsignedVrtFloat(code - 0x10)),
            other => Err(CodecError::InvalidField(format!(
                "reserved data item format 0x{other:02X}"
            ))),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::SignedFixed => 0x00,
            Self::SignedVrtFloat(exp) => exp & 0x07,
            Self::Float32 => 0x0E,
            Self::Float64 => 0x0F,
            Self::UnsignedFixed => 0x10,
            Self::UnsignedVrtFloat(exp) => 0x10 | (exp & 0x07),
        }
    }

    pub fn is_signed(self) -> bool {
        !matches!(self, Self::UnsignedFixed | Self::UnsignedVrtFloat(_))
    }
}

/// The data packet payload format (two words in a context packet).
///
/// ```text
/// word 1: 31 P | 30..29 real/complex | 28..24 item format | 23 repeat |
///         22..20 event tags | 19..16 channel tags | 11..6 packing-1 | 5..0 size-1
/// word 2: 31..16 repeat count-1 | 15..0 vector size-1
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadFormat {
    /// Link-efficient packing (samples may span word boundaries).
    pub link_efficient: bool,
    pub real_complex: RealComplex,
    pub data_item_format: DataItemFormat,
    pub sample_component_repeat: bool,
    pub event_tag_size: u8,
    pub channel_tag_size: u8,
    /// Bits per packed item field, 1..=64.
    pub item_packing_field_size: u8,
    /// Bits per data item, 1..=64.
    pub data_item_size: u8,
    /// 1..=65536.
    pub repeat_count: u32,
    /// 1..=65536.
    pub vector_size: u32,
}

impl PayloadFormat {
    pub const SIZE: usize = 8;

    /// A processing-efficient format with whole-byte items and no tags.
    pub fn simple(real_complex: RealComplex, data_item_format: DataItemFormat, bits: u8) -> Self {
        Self {
            link_efficient: false,
            real_complex,
            data_item_format,
            sample_component_repeat: false,
            event_tag_size: 0,
            channel_tag_size: 0,
            item_packing_field_size: bits,
            data_item_size: bits,
            repeat_count: 1,
            vector_size: 1,
        }
    }

    /// Real signed 16-bit integers, the most common SDR format.
    pub fn int16() -> Self {
        Self::simple(RealComplex::Real, DataItemFormat::SignedFixed, 16)
    }

    /// Complex cartesian 16-bit integers (interleaved I/Q).
    pub fn complex_int16() -> Self {
        Self::simple(RealComplex::ComplexCartesian, DataItemFormat::SignedFixed, 16)
    }

    /// Real IEEE-754 single precision.
    pub fn float32() -> Self {
        Self::simple(RealComplex::Real, DataItemFormat::Float32, 32)
    }

    pub fn from_words(first: u32, second: u32) -> Result<Self> {
        let packing = ((first >> 6) & 0x3F) as u8 + 1;
        let size = (first & 0x3F) as u8 + 1;
        Ok(Self {
            link_efficient: first & 0x8000_0000 != 0,
            real_complex: RealComplex::from_bits((first >> 29) & 0x3)?,
            data_item_format: DataItemFormat::from_code(((first >> 24) & 0x1F) as u8)?,
            sample_component_repeat: first & 0x0080_0000 != 0,
            event_tag_size: ((first >> 20) & 0x7) as u8,
            channel_tag_size: ((first >> 16) & 0xF) as u8,
            item_packing_field_size: packing,
            data_item_size: size,
            repeat_count: (second >> 16) + 1,
            vector_size: (second & 0xFFFF) + 1,
        })
    }

    pub fn to_words(&self) -> (u32, u32) {
        let mut first = 0u32;
        if self.link_efficient {
            first |= 0x8000_0000;
        }
        first |= (self.real_complex as u32) << 29;
        first |= u32::from(self.data_item_format.code() & 0x1F) << 24;
        if self.sample_component_repeat {
            first |= 0x0080_0000;
        }
        first |= u32::from(self.event_tag_size & 0x7) << 20;
        first |= u32::from(self.channel_tag_size & 0xF) << 16;
        first |= u32::from(self.item_packing_field_size.saturating_sub(1) & 0x3F) << 6;
        first |= u32::from(self.data_item_size.saturating_sub(1) & 0x3F);

        let second = ((self.repeat_count.saturating_sub(1) & 0xFFFF) << 16)
            | (self.vector_size.saturating_sub(1) & 0xFFFF);
        (first, second)
    }

    /// Bytes per scalar component when the format is byte aligned and
    /// processing-efficient without tags; `None` otherwise.
    pub fn aligned_item_bytes(&self) -> Option<usize> {
        if self.link_efficient
            || self.event_tag_size != 0
            || self.channel_tag_size != 0
            || self.item_packing_field_size != self.data_item_size
        {
            return None;
        }
        let bits = self.data_item_size;
        match self.data_item_format {
            DataItemFormat::Float32 if bits == 32 => Some(4),
            DataItemFormat::Float64 if bits == 64 => Some(8),
            DataItemFormat::SignedFixed | DataItemFormat::UnsignedFixed
                if matches!(bits, 8 | 16 | 32 | 64) =>
            {
                Some(usize::from(bits / 8))
            }
            _ => None,
        }
    }
}

impl Default for PayloadFormat {
    fn default() -> Self {
        Self::int16()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int16_words() {
        let (first, second) = PayloadFormat::int16().to_words();
        assert_eq!(first, 0x0000_03CF);
        assert_eq!(second, 0);
        assert_eq!(
            PayloadFormat::from_words(first, second).unwrap(),
            PayloadFormat::int16()
        );
    }

    #[test]
    fn complex_float_words() {
        let mut fmt = PayloadFormat::simple(RealComplex::ComplexCartesian, DataItemFormat::Float32, 32);
        fmt.vector_size = 4;
        let (first, second) = fmt.to_words();
        assert_eq!(first >> 24, 0x2E);
        assert_eq!(second, 3);
        assert_eq!(PayloadFormat::from_words(first, second).unwrap(), fmt);
    }

    #[test]
    fn reserved_codes_rejected() {
        assert!(PayloadFormat::from_words(0x6000_0000, 0).is_err());
        assert!(PayloadFormat::from_words(0x0800_0000, 0).is_err());
    }

    #[test]
    fn aligned_sizes() {
        assert_eq!(PayloadFormat::int16().aligned_item_bytes(), Some(2));
        assert_eq!(PayloadFormat::float32().aligned_item_bytes(), Some(4));
        let mut odd = PayloadFormat::int16();
        odd.data_item_size = 12;
        assert_eq!(odd.aligned_item_bytes(), None);
    }
}
