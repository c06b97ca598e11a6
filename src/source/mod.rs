//! Record sources: header parsing and raw record reads

pub mod las;
pub mod descriptor;

pub use descriptor::PointCloudDescriptor;
pub use las::LasHeader;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::core::{Error, Result};

/// Source container kinds recognized by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Uncompressed LAS, decoded directly
    Las,
    /// LAZ-compressed LAS, not decoded
    Laz,
    Unknown,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("las") => SourceKind::Las,
            Some("laz") => SourceKind::Laz,
            _ => SourceKind::Unknown,
        }
    }

    pub fn is_decodable(self) -> bool {
        self == SourceKind::Las
    }
}

/// Read the raw records `[first_point, first_point + num_points)` of a file
pub fn read_records(desc: &PointCloudDescriptor, first_point: u64, num_points: u64) -> Result<Vec<u8>> {
    let kind = SourceKind::from_path(desc.path());
    if !kind.is_decodable() {
        return Err(Error::UnsupportedFormat {
            path: desc.path.clone(),
        });
    }

    let stride = desc.stride() as u64;
    let byte_offset = desc.header.offset_to_point_data.saturating_add(first_point.saturating_mul(stride));
    let byte_len = num_points.saturating_mul(stride);

    let mut file = File::open(desc.path())?;
    let file_len = file.metadata()?.len();
    if byte_offset.saturating_add(byte_len) > file_len {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "points {}..{} of {} lie past the end of the file ({} bytes)",
                first_point,
                first_point.saturating_add(num_points),
                desc.path().display(),
                file_len
            ),
        )));
    }

    let byte_size = usize::try_from(byte_len)
        .map_err(|_| Error::Capacity(format!("chunk of {} points does not fit in memory", num_points)))?;
    file.seek(SeekFrom::Start(byte_offset))?;
    let mut records = vec![0u8; byte_size];
    file.read_exact(&mut records)?;
    Ok(records)
}
