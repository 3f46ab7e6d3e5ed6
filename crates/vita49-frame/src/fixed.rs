//! Fixed-point conversions used by context fields.
//!
//! A value is stored as a two's-complement integer of `width` bits scaled by
//! `2^radix`. Conversions round to the nearest step and saturate at the
//! format bounds.

/// Radix of 64-bit frequency fields (Hz).
pub const FREQUENCY_RADIX: u32 = 20;
/// Radix of 16-bit gain and reference-level fields (dB / dBm).
pub const GAIN_RADIX: u32 = 7;
/// Radix of the 16-bit temperature field (degrees Celsius).
pub const TEMPERATURE_RADIX: u32 = 6;

/// Size of one least-significant step.
pub fn resolution(radix: u32) -> f64 {
    1.0 / (1u64 << radix) as f64
}

/// Smallest value representable in `width` bits at `radix`.
pub fn min_value(radix: u32, width: u32) -> f64 {
    -((1u128 << (width - 1)) as f64) * resolution(radix)
}

/// Largest value representable in `width` bits at `radix`.
pub fn max_value(radix: u32, width: u32) -> f64 {
    (((1u128 << (width - 1)) - 1) as f64) * resolution(radix)
}

/// Interpret the low `width` bits of `bits` as a signed fixed-point number.
pub fn to_f64(bits: i64, radix: u32, width: u32) -> f64 {
    let shift = 64 - width;
    let signed = (bits << shift) >> shift;
    signed as f64 * resolution(radix)
}

/// Encode `value` as a signed fixed-point number in `width` bits.
///
/// The result is sign-extended to `i64`; callers truncate to the field width.
pub fn from_f64(value: f64, radix: u32, width: u32) -> i64 {
    let scaled = (value * (1u64 << radix) as f64).round();
    let max = ((1u128 << (width - 1)) - 1) as f64;
    let min = -((1u128 << (width - 1)) as f64);
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(min, max) as i64
}

/// Decode a 16-bit field stored in the low half of a word.
pub fn i16_to_f64(raw: u16, radix: u32) -> f64 {
    to_f64(i64::from(raw as i16), radix, 16)
}

/// Encode into a 16-bit field.
pub fn f64_to_i16(value: f64, radix: u32) -> u16 {
    from_f64(value, radix, 16) as i16 as u16
}

/// Decode a full 64-bit field.
pub fn i64_to_f64(raw: u64, radix: u32) -> f64 {
    to_f64(raw as i64, radix, 64)
}

/// Encode into a full 64-bit field.
pub fn f64_to_i64(value: f64, radix: u32) -> u64 {
    from_f64(value, radix, 64) as u64
}
