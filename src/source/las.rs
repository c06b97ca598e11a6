//! LAS public header block parsing
//!
//! The header is decoded with `las::raw::Header`, which keeps the fixed
//! little-endian layout of LAS 1.0-1.4. Only the fields the streaming
//! pipeline needs are kept.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use las::raw;

use crate::core::types::DVec3;
use crate::core::{Error, Result};
use crate::math::Aabb;

/// Smallest legal header (LAS 1.0-1.2)
pub const MIN_HEADER_SIZE: usize = 227;

const SIGNATURE: &[u8; 4] = b"LASF";

/// Bytes occupied by the X, Y, Z integers at the start of every record
pub const XYZ_BYTES: usize = 12;

/// Byte offset of the 16-bit RGB triple within a record, if the format has one
pub fn color_offset(format: u8) -> Option<usize> {
    match format {
        2 => Some(20),
        3 => Some(28),
        7 | 8 => Some(30),
        _ => None,
    }
}

/// Decoded LAS header fields
#[derive(Clone, Debug, PartialEq)]
pub struct LasHeader {
    pub version: (u8, u8),
    /// Point count after clamping
    pub num_points: u64,
    pub offset_to_point_data: u64,
    /// Point data record format with the compression bit removed
    pub format: u8,
    /// Record stride in bytes
    pub stride: u16,
    pub scale: DVec3,
    pub offset: DVec3,
    pub bounds: Aabb,
}

impl LasHeader {
    /// Read and parse the header of the file at `path`.
    ///
    /// The records the header describes must fit inside the file, so a
    /// header that overstates its point count is rejected before it can
    /// reserve arena space.
    pub fn read(path: &Path, max_points: u64) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let raw = raw::Header::read_from(BufReader::new(file)).map_err(|e| Error::header(path, e.to_string()))?;
        let header = Self::from_raw(&raw, max_points).map_err(|reason| Error::header(path, reason))?;

        let end = header.records_end();
        if end > file_len {
            return Err(Error::header(
                path,
                format!(
                    "{} records of {} bytes end at byte {}, past the end of the file ({} bytes)",
                    header.num_points, header.stride, end, file_len
                ),
            ));
        }
        Ok(header)
    }

    /// Parse header bytes. Errors carry a human-readable reason.
    pub fn parse(bytes: &[u8], max_points: u64) -> std::result::Result<Self, String> {
        let raw = raw::Header::read_from(bytes).map_err(|e| e.to_string())?;
        Self::from_raw(&raw, max_points)
    }

    fn from_raw(raw: &raw::Header, max_points: u64) -> std::result::Result<Self, String> {
        if &raw.file_signature != SIGNATURE {
            return Err("missing LASF signature".to_string());
        }

        let (major, minor) = (raw.version.major, raw.version.minor);
        if major != 1 || minor > 4 {
            return Err(format!("unsupported version {}.{}", major, minor));
        }

        let raw_count = if minor < 4 {
            raw.number_of_point_records as u64
        } else {
            match &raw.large_file {
                Some(large_file) => large_file.number_of_point_records,
                None => return Err("LAS 1.4 header without a 64-bit point count".to_string()),
            }
        };

        let format = raw.point_data_record_format % 128;
        let stride = raw.point_data_record_length;
        let required = color_offset(format).map_or(XYZ_BYTES, |c| c + 6);
        if (stride as usize) < required {
            return Err(format!(
                "record stride {} too small for format {} (needs {})",
                stride, format, required
            ));
        }

        Ok(Self {
            version: (major, minor),
            num_points: raw_count.min(max_points),
            offset_to_point_data: raw.offset_to_point_data as u64,
            format,
            stride,
            scale: DVec3::new(raw.x_scale_factor, raw.y_scale_factor, raw.z_scale_factor),
            offset: DVec3::new(raw.x_offset, raw.y_offset, raw.z_offset),
            bounds: Aabb::new(
                DVec3::new(raw.min_x, raw.min_y, raw.min_z),
                DVec3::new(raw.max_x, raw.max_y, raw.max_z),
            ),
        })
    }

    /// Byte position just past the last record
    pub fn records_end(&self) -> u64 {
        self.offset_to_point_data
            .saturating_add(self.num_points.saturating_mul(self.stride as u64))
    }
}

/// Builds LAS files in memory. Used by tests and benchmarks.
#[doc(hidden)]
pub mod synthetic {
    use std::io::Cursor;

    use las::point::Format;
    use las::{Builder, Color, Point, Transform, Vector, Version, Writer};

    use crate::core::types::DVec3;

    /// A record to write: stored integer coordinates and 16-bit color
    #[derive(Clone, Copy, Debug)]
    pub struct SyntheticPoint {
        pub xyz: [i32; 3],
        pub rgb: [u16; 3],
    }

    /// Write a LAS 1.2 file (1.4 when `v14` or the format needs it) with the
    /// given records
    pub fn build_las(
        format: u8,
        scale: DVec3,
        offset: DVec3,
        points: &[SyntheticPoint],
        v14: bool,
    ) -> las::Result<Vec<u8>> {
        let minor: u8 = if v14 || format >= 6 { 4 } else { 2 };
        let point_format = Format::new(format)?;
        let mut builder = Builder::from(Version::new(1, minor));
        builder.point_format = point_format.clone();
        builder.transforms = Vector {
            x: Transform { scale: scale.x, offset: offset.x },
            y: Transform { scale: scale.y, offset: offset.y },
            z: Transform { scale: scale.z, offset: offset.z },
        };
        let header = builder.into_header()?;

        let mut writer = Writer::new(Cursor::new(Vec::new()), header)?;
        for p in points {
            let world = DVec3::new(p.xyz[0] as f64, p.xyz[1] as f64, p.xyz[2] as f64) * scale + offset;
            writer.write_point(Point {
                x: world.x,
                y: world.y,
                z: world.z,
                gps_time: point_format.has_gps_time.then_some(0.0),
                color: point_format.has_color.then(|| Color::new(p.rgb[0], p.rgb[1], p.rgb[2])),
                nir: point_format.has_nir.then_some(0),
                ..Default::default()
            })?;
        }
        Ok(writer.into_inner()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::synthetic::{build_las, SyntheticPoint};
    use super::*;
    use tempfile::TempDir;

    const OFFSET_VERSION_MAJOR: usize = 24;
    const OFFSET_VERSION_MINOR: usize = 25;
    const OFFSET_FORMAT: usize = 104;
    const OFFSET_STRIDE: usize = 105;
    const OFFSET_LEGACY_COUNT: usize = 107;

    fn sample_points() -> Vec<SyntheticPoint> {
        vec![
            SyntheticPoint { xyz: [0, 0, 0], rgb: [10, 20, 30] },
            SyntheticPoint { xyz: [1000, 2000, 3000], rgb: [40, 50, 60] },
        ]
    }

    #[test]
    fn test_parse_v12_header() {
        let offset = DVec3::new(100.0, 200.0, 300.0);
        let bytes = build_las(2, DVec3::splat(0.01), offset, &sample_points(), false).expect("build failed");
        let header = LasHeader::parse(&bytes, MAX_TEST_POINTS).expect("parse failed");

        assert_eq!(header.version, (1, 2));
        assert_eq!(header.num_points, 2);
        assert_eq!(header.format, 2);
        assert_eq!(header.stride, 26);
        assert_eq!(header.offset_to_point_data, MIN_HEADER_SIZE as u64);
        assert_eq!(header.scale, DVec3::splat(0.01));
        assert_eq!(header.offset, DVec3::new(100.0, 200.0, 300.0));
        assert!(header.bounds.min.abs_diff_eq(DVec3::new(100.0, 200.0, 300.0), 1e-9));
        assert!(header.bounds.max.abs_diff_eq(DVec3::new(110.0, 220.0, 330.0), 1e-9));
    }

    #[test]
    fn test_parse_v14_uses_64bit_count() {
        let bytes = build_las(7, DVec3::ONE, DVec3::ZERO, &sample_points(), true).expect("build failed");
        let header = LasHeader::parse(&bytes, MAX_TEST_POINTS).expect("parse failed");

        assert_eq!(header.version, (1, 4));
        assert_eq!(header.num_points, 2);
        assert_eq!(header.format, 7);
    }

    #[test]
    fn test_count_is_clamped() {
        let bytes = build_las(2, DVec3::ONE, DVec3::ZERO, &sample_points(), false).expect("build failed");
        let header = LasHeader::parse(&bytes, 1).expect("parse failed");
        assert_eq!(header.num_points, 1);
    }

    #[test]
    fn test_compression_bit_is_stripped() {
        let mut bytes = build_las(3, DVec3::ONE, DVec3::ZERO, &sample_points(), false).expect("build failed");
        bytes[OFFSET_FORMAT] = 3 | 0x80;
        let header = LasHeader::parse(&bytes, MAX_TEST_POINTS).expect("parse failed");
        assert_eq!(header.format, 3);
    }

    #[test]
    fn test_rejects_bad_signature() {
        let mut bytes = build_las(2, DVec3::ONE, DVec3::ZERO, &sample_points(), false).expect("build failed");
        bytes[0] = b'X';
        assert!(LasHeader::parse(&bytes, MAX_TEST_POINTS).is_err());
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let mut bytes = build_las(2, DVec3::ONE, DVec3::ZERO, &sample_points(), false).expect("build failed");
        bytes[OFFSET_VERSION_MINOR] = 5;
        assert!(LasHeader::parse(&bytes, MAX_TEST_POINTS).is_err());

        bytes[OFFSET_VERSION_MINOR] = 2;
        bytes[OFFSET_VERSION_MAJOR] = 2;
        assert!(LasHeader::parse(&bytes, MAX_TEST_POINTS).is_err());
    }

    #[test]
    fn test_rejects_truncated_header() {
        let bytes = build_las(2, DVec3::ONE, DVec3::ZERO, &[], false).expect("build failed");
        assert!(LasHeader::parse(&bytes[..100], MAX_TEST_POINTS).is_err());

        // a 1.4 header must reach the 64-bit count
        let mut short14 = bytes[..MIN_HEADER_SIZE].to_vec();
        short14[OFFSET_VERSION_MINOR] = 4;
        assert!(LasHeader::parse(&short14, MAX_TEST_POINTS).is_err());
    }

    #[test]
    fn test_rejects_stride_without_color() {
        let mut bytes = build_las(3, DVec3::ONE, DVec3::ZERO, &[], false).expect("build failed");
        bytes[OFFSET_STRIDE..OFFSET_STRIDE + 2].copy_from_slice(&20u16.to_le_bytes());
        let err = LasHeader::parse(&bytes, MAX_TEST_POINTS).unwrap_err();
        assert!(err.contains("stride"));
    }

    #[test]
    fn test_color_offsets() {
        assert_eq!(color_offset(2), Some(20));
        assert_eq!(color_offset(3), Some(28));
        assert_eq!(color_offset(7), Some(30));
        assert_eq!(color_offset(8), Some(30));
        assert_eq!(color_offset(0), None);
        assert_eq!(color_offset(6), None);
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let result = LasHeader::read(Path::new("/nonexistent/cloud.las"), MAX_TEST_POINTS);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_read_checks_records_fit_file() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("cloud.las");
        let bytes = build_las(2, DVec3::ONE, DVec3::ZERO, &sample_points(), false).expect("build failed");
        std::fs::write(&path, &bytes).expect("write failed");

        let header = LasHeader::read(&path, MAX_TEST_POINTS).expect("read failed");
        assert_eq!(header.records_end(), bytes.len() as u64);

        // drop the last record
        std::fs::write(&path, &bytes[..bytes.len() - 26]).expect("write failed");
        let result = LasHeader::read(&path, MAX_TEST_POINTS);
        assert!(matches!(result, Err(Error::Header { .. })));
    }

    #[test]
    fn test_read_rejects_overstated_count() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("empty.las");
        let mut bytes = build_las(2, DVec3::ONE, DVec3::ZERO, &[], false).expect("build failed");
        bytes[OFFSET_LEGACY_COUNT..OFFSET_LEGACY_COUNT + 4].copy_from_slice(&1_000_000_000u32.to_le_bytes());
        std::fs::write(&path, &bytes).expect("write failed");

        // the header alone parses; only the file length exposes it
        assert_eq!(LasHeader::parse(&bytes, MAX_TEST_POINTS).expect("parse failed").num_points, 1_000_000_000);
        let err = LasHeader::read(&path, MAX_TEST_POINTS).unwrap_err();
        assert!(matches!(err, Error::Header { .. }));
        assert!(err.to_string().contains("past the end"));
    }

    #[test]
    fn test_read_garbage_is_header_error() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("junk.las");
        std::fs::write(&path, b"not a point cloud").expect("write failed");
        assert!(matches!(LasHeader::read(&path, MAX_TEST_POINTS), Err(Error::Header { .. })));
    }

    const MAX_TEST_POINTS: u64 = 1_000_000_000;
}
