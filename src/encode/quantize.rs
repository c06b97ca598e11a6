//! Multi-resolution fixed-point position encoding
//!
//! Each axis is quantized to 30 bits relative to its batch box, then split
//! into three 10-bit tiers. The three axes' fields of one tier are packed
//! into a single `u32` (`x | y << 10 | z << 20`), so a renderer can fetch
//! only the coarse tier for distant batches and add finer tiers as needed.

use crate::core::types::DVec3;
use crate::math::Aabb;

pub const STEPS_30BIT: u32 = 1 << 30;
pub const MASK_30BIT: u32 = STEPS_30BIT - 1;
pub const STEPS_10BIT: u32 = 1 << 10;
pub const MASK_10BIT: u32 = STEPS_10BIT - 1;

/// One of the three 10-bit precision layers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Bits 20..30
    Low,
    /// Bits 10..20
    Medium,
    /// Bits 0..10
    High,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Low, Tier::Medium, Tier::High];

    /// Bit position of this tier inside a 30-bit axis value
    pub const fn shift(self) -> u32 {
        match self {
            Tier::Low => 20,
            Tier::Medium => 10,
            Tier::High => 0,
        }
    }
}

/// A position packed into three tier words
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuantizedPosition {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl QuantizedPosition {
    /// Pack three 30-bit axis values
    pub fn from_axes(axes: [u32; 3]) -> Self {
        let pack = |tier: Tier| {
            let field = |v: u32| (v >> tier.shift()) & MASK_10BIT;
            field(axes[0]) | (field(axes[1]) << 10) | (field(axes[2]) << 20)
        };
        Self {
            low: pack(Tier::Low),
            medium: pack(Tier::Medium),
            high: pack(Tier::High),
        }
    }

    pub fn tier(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Low => self.low,
            Tier::Medium => self.medium,
            Tier::High => self.high,
        }
    }

    /// Reassemble the three 30-bit axis values
    pub fn axes(&self) -> [u32; 3] {
        let mut axes = [0u32; 3];
        for tier in Tier::ALL {
            let fields = unpack_word(self.tier(tier));
            for (axis, field) in axes.iter_mut().zip(fields) {
                *axis |= field << tier.shift();
            }
        }
        axes
    }
}

/// Split a tier word into its x, y, z 10-bit fields
#[inline]
pub fn unpack_word(word: u32) -> [u32; 3] {
    [word & MASK_10BIT, (word >> 10) & MASK_10BIT, (word >> 20) & MASK_10BIT]
}

/// Map `value` into `[0, 2^30)` relative to `[min, min + extent]`.
///
/// The upper boundary clamps to `2^30 - 1`. A zero or non-finite extent
/// yields 0.
#[inline]
pub fn quantize_axis(value: f64, min: f64, extent: f64) -> u32 {
    if !(extent > 0.0) || !extent.is_finite() {
        return 0;
    }
    let scaled = (value - min) / extent * STEPS_30BIT as f64;
    if !(scaled > 0.0) {
        return 0;
    }
    (scaled as u64).min(MASK_30BIT as u64) as u32
}

/// Encode a position (in the same frame as `bounds`) into tier words
#[inline]
pub fn encode_position(position: DVec3, bounds: &Aabb) -> QuantizedPosition {
    let extent = bounds.size();
    QuantizedPosition::from_axes([
        quantize_axis(position.x, bounds.min.x, extent.x),
        quantize_axis(position.y, bounds.min.y, extent.y),
        quantize_axis(position.z, bounds.min.z, extent.z),
    ])
}

/// Decode tier words back to a position in the frame of `bounds`
pub fn decode_position(q: &QuantizedPosition, bounds: &Aabb) -> DVec3 {
    let [x, y, z] = q.axes();
    let unit = DVec3::new(x as f64, y as f64, z as f64) / STEPS_30BIT as f64;
    bounds.min + unit * bounds.size()
}

/// Decode using only the coarser tiers down to and including `finest`
pub fn decode_position_at(q: &QuantizedPosition, bounds: &Aabb, finest: Tier) -> DVec3 {
    let mut partial = *q;
    match finest {
        Tier::Low => {
            partial.medium = 0;
            partial.high = 0;
        }
        Tier::Medium => partial.high = 0,
        Tier::High => {}
    }
    decode_position(&partial, bounds)
}

/// Reduce a 16-bit color channel to 8 bits. Values already in range pass through.
#[inline]
fn channel_to_8bit(value: u16) -> u32 {
    if value > 255 {
        (value >> 8) as u32
    } else {
        value as u32
    }
}

/// Read the RGB triple of a record and pack it as `r | g << 8 | b << 16`.
///
/// Records without color get `missing`.
#[inline]
pub fn extract_color(record: &[u8], color_offset: Option<usize>, missing: u32) -> u32 {
    let Some(at) = color_offset else {
        return missing;
    };
    let channel = |i: usize| u16::from_le_bytes([record[at + 2 * i], record[at + 2 * i + 1]]);
    channel_to_8bit(channel(0)) | (channel_to_8bit(channel(1)) << 8) | (channel_to_8bit(channel(2)) << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(DVec3::ZERO, DVec3::ONE)
    }

    #[test]
    fn test_min_encodes_to_zero() {
        let q = encode_position(DVec3::ZERO, &unit_box());
        assert_eq!(q, QuantizedPosition::default());
    }

    #[test]
    fn test_max_clamps_to_full_range() {
        let bounds = Aabb::new(DVec3::new(-3.0, 5.0, 0.25), DVec3::new(7.0, 6.5, 100.0));
        let q = encode_position(bounds.max, &bounds);
        assert_eq!(q.axes(), [MASK_30BIT; 3]);
        for tier in Tier::ALL {
            assert_eq!(unpack_word(q.tier(tier)), [1023, 1023, 1023]);
        }
    }

    #[test]
    fn test_out_of_range_clamps() {
        assert_eq!(quantize_axis(-1.0, 0.0, 1.0), 0);
        assert_eq!(quantize_axis(2.0, 0.0, 1.0), MASK_30BIT);
    }

    #[test]
    fn test_zero_extent_is_zero() {
        let bounds = Aabb::new(DVec3::new(0.0, 1.0, 2.0), DVec3::new(4.0, 1.0, 2.0));
        for x in [0.0, 1.0, 4.0] {
            let q = encode_position(DVec3::new(x, 1.0, 2.0), &bounds);
            let [_, y, z] = q.axes();
            assert_eq!(y, 0);
            assert_eq!(z, 0);
        }
        assert_eq!(quantize_axis(5.0, 5.0, 0.0), 0);
        assert_eq!(quantize_axis(5.0, 5.0, f64::NAN), 0);
    }

    #[test]
    fn test_tier_split() {
        // x = 0b(3)(2)(1) in 10-bit fields, y = all ones, z = 0
        let x = (3 << 20) | (2 << 10) | 1;
        let q = QuantizedPosition::from_axes([x, MASK_30BIT, 0]);
        assert_eq!(unpack_word(q.low), [3, 1023, 0]);
        assert_eq!(unpack_word(q.medium), [2, 1023, 0]);
        assert_eq!(unpack_word(q.high), [1, 1023, 0]);
        assert_eq!(q.axes(), [x, MASK_30BIT, 0]);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let bounds = Aabb::new(DVec3::new(-12.5, 3.0, 1e5), DVec3::new(830.25, 3.75, 1e5 + 42.0));
        let extent = bounds.size();
        let step = extent / STEPS_30BIT as f64;

        let mut seed = 0x2545_F491_4F6C_DD1Du64;
        for _ in 0..10_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let t = DVec3::new(
                (seed & 0xFFFF) as f64 / 65535.0,
                ((seed >> 16) & 0xFFFF) as f64 / 65535.0,
                ((seed >> 32) & 0xFFFF) as f64 / 65535.0,
            );
            let p = bounds.min + t * extent;
            let decoded = decode_position(&encode_position(p, &bounds), &bounds);
            let err = (decoded - p).abs();
            assert!(err.x <= step.x * 1.0001 && err.y <= step.y * 1.0001 && err.z <= step.z * 1.0001,
                "error {:?} exceeds step {:?}", err, step);
        }
    }

    #[test]
    fn test_coarse_decode_error_bound() {
        let bounds = Aabb::new(DVec3::ZERO, DVec3::splat(1024.0));
        let p = DVec3::new(517.3, 12.9, 1000.01);
        let q = encode_position(p, &bounds);

        let coarse = decode_position_at(&q, &bounds, Tier::Low);
        assert!((coarse - p).abs().max_element() <= 1.0);

        let medium = decode_position_at(&q, &bounds, Tier::Medium);
        assert!((medium - p).abs().max_element() <= 1.0 / 1024.0);
    }

    #[test]
    fn test_extract_color_8bit_passthrough() {
        let mut record = vec![0u8; 26];
        record[20..22].copy_from_slice(&200u16.to_le_bytes());
        record[22..24].copy_from_slice(&17u16.to_le_bytes());
        record[24..26].copy_from_slice(&255u16.to_le_bytes());
        assert_eq!(extract_color(&record, Some(20), 0), 200 | (17 << 8) | (255 << 16));
    }

    #[test]
    fn test_extract_color_16bit_downshift() {
        let mut record = vec![0u8; 36];
        record[30..32].copy_from_slice(&0xFFFFu16.to_le_bytes());
        record[32..34].copy_from_slice(&0x8000u16.to_le_bytes());
        record[34..36].copy_from_slice(&256u16.to_le_bytes());
        assert_eq!(extract_color(&record, Some(30), 0), 0xFF | (0x80 << 8) | (1 << 16));
    }

    #[test]
    fn test_extract_color_missing() {
        let record = vec![0u8; 20];
        assert_eq!(extract_color(&record, None, 0x00AB_CDEF), 0x00AB_CDEF);
    }
}
