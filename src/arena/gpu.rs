//! GPU arena backend on wgpu storage buffers
//!
//! wgpu exposes no sparse residency, so each address space is split into
//! fixed-size segments and a segment's buffer is created the first time a
//! commit touches it. Renderers bind the segments that exist.

use std::collections::HashMap;
use std::ops::Range;

use crate::arena::backend::{ArenaBackend, ArenaSpace};
use crate::core::{Error, Result};

/// Default segment size (128 MB), below common `max_storage_buffer_binding_size`
pub const DEFAULT_SEGMENT_SIZE: u64 = 128 * 1024 * 1024;

struct SegmentedSpace {
    capacity: u64,
    segments: Vec<Option<wgpu::Buffer>>,
}

/// Arena backend that commits memory as lazily created GPU buffers
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    segment_size: u64,
    spaces: HashMap<ArenaSpace, SegmentedSpace>,
    committed_bytes: u64,
}

impl GpuBackend {
    /// Create a backend on an existing device.
    ///
    /// The segment size is capped by the device's buffer limits and rounded
    /// down to the copy alignment.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, segment_size: u64) -> Self {
        let limits = device.limits();
        let max = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        let segment_size = segment_size.min(max) & !(wgpu::COPY_BUFFER_ALIGNMENT - 1);
        let segment_size = segment_size.max(wgpu::COPY_BUFFER_ALIGNMENT);

        log::info!("GPU arena: segment size {}MB", segment_size / 1024 / 1024);

        Self {
            device,
            queue,
            segment_size,
            spaces: HashMap::new(),
            committed_bytes: 0,
        }
    }

    /// Create a backend on a headless adapter
    pub async fn headless(segment_size: u64) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable adapter found: {:?}", e)))?;

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("pointstream_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                    max_buffer_size: adapter_limits.max_buffer_size,
                    ..Default::default()
                },
                memory_hints: wgpu::MemoryHints::Performance,
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        log::info!("GPU buffer limits: max_buffer_size={}MB, max_storage_binding={}MB",
            adapter_limits.max_buffer_size / 1024 / 1024,
            adapter_limits.max_storage_buffer_binding_size / 1024 / 1024);

        Ok(Self::new(device, queue, segment_size))
    }

    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    /// Segments of a space; `None` where nothing has been committed yet
    pub fn segments(&self, space: ArenaSpace) -> &[Option<wgpu::Buffer>] {
        self.spaces
            .get(&space)
            .map_or(&[], |s| s.segments.as_slice())
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl ArenaBackend for GpuBackend {
    fn reserve(&mut self, space: ArenaSpace, capacity_bytes: u64, _page_size: u64) -> Result<()> {
        if self.spaces.contains_key(&space) {
            return Err(Error::Arena(format!("{} reserved twice", space.label())));
        }
        let count = capacity_bytes.div_ceil(self.segment_size) as usize;
        self.spaces.insert(space, SegmentedSpace {
            capacity: capacity_bytes,
            segments: (0..count).map(|_| None).collect(),
        });
        Ok(())
    }

    fn commit(&mut self, space: ArenaSpace, range: Range<u64>) -> Result<()> {
        let segmented = self
            .spaces
            .get_mut(&space)
            .ok_or_else(|| Error::Arena(format!("{} not reserved", space.label())))?;
        if range.end > segmented.capacity {
            return Err(Error::Arena(format!(
                "{}: commit {}..{} outside capacity {}",
                space.label(), range.start, range.end, segmented.capacity
            )));
        }
        if range.start >= range.end {
            return Ok(());
        }

        for index in segment_span(&range, self.segment_size) {
            if segmented.segments[index].is_some() {
                continue;
            }
            let size = segment_len(index, self.segment_size, segmented.capacity);

            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(space.label()),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            log::debug!("{}: created segment {} ({} bytes)", space.label(), index, size);

            segmented.segments[index] = Some(buffer);
            self.committed_bytes += size;
        }
        Ok(())
    }

    fn write(&mut self, space: ArenaSpace, byte_offset: u64, data: &[u8]) -> Result<()> {
        let segmented = self
            .spaces
            .get(&space)
            .ok_or_else(|| Error::Arena(format!("{} not reserved", space.label())))?;
        let end = byte_offset + data.len() as u64;
        if end > segmented.capacity {
            return Err(Error::Arena(format!(
                "{}: write {}..{} outside capacity {}",
                space.label(), byte_offset, end, segmented.capacity
            )));
        }
        if byte_offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(Error::Arena(format!(
                "{}: write at {} of {} bytes is not 4-byte aligned",
                space.label(), byte_offset, data.len()
            )));
        }

        let pieces = split_write(byte_offset, data.len(), self.segment_size);
        let targets = resolve_pieces(&segmented.segments, &pieces).map_err(|index| {
            Error::Arena(format!("{}: segment {} is not committed", space.label(), index))
        })?;
        for (buffer, piece) in targets {
            self.queue.write_buffer(buffer, piece.offset, &data[piece.src.clone()]);
        }
        Ok(())
    }

    fn committed_bytes(&self) -> u64 {
        self.committed_bytes
    }
}

/// Indices of the segments a byte range touches; empty for an empty range
fn segment_span(range: &Range<u64>, segment_size: u64) -> Range<usize> {
    if range.start >= range.end {
        return 0..0;
    }
    let first = range.start / segment_size;
    let last = (range.end - 1) / segment_size;
    first as usize..last as usize + 1
}

/// Buffer size of segment `index`. The tail segment is cut to the
/// capacity, rounded up to the copy alignment.
fn segment_len(index: usize, segment_size: u64, capacity: u64) -> u64 {
    let start = index as u64 * segment_size;
    segment_size
        .min(capacity.saturating_sub(start))
        .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Part of a write that lands in a single segment
#[derive(Clone, Debug, PartialEq, Eq)]
struct WritePiece {
    segment: usize,
    /// Byte offset inside the segment
    offset: u64,
    /// Bytes of the source slice
    src: Range<usize>,
}

/// Split a write of `len` bytes at `byte_offset` on segment boundaries
fn split_write(byte_offset: u64, len: usize, segment_size: u64) -> Vec<WritePiece> {
    let end = byte_offset + len as u64;
    let mut pieces = Vec::new();
    let mut cursor = byte_offset;
    while cursor < end {
        let segment = cursor / segment_size;
        let segment_start = segment * segment_size;
        let piece_end = (segment_start + segment_size).min(end);
        pieces.push(WritePiece {
            segment: segment as usize,
            offset: cursor - segment_start,
            src: (cursor - byte_offset) as usize..(piece_end - byte_offset) as usize,
        });
        cursor = piece_end;
    }
    pieces
}

/// Pair every piece with its segment buffer. Fails with the first segment
/// index that has no buffer, before anything is written.
fn resolve_pieces<'a, T>(
    segments: &'a [Option<T>],
    pieces: &'a [WritePiece],
) -> std::result::Result<Vec<(&'a T, &'a WritePiece)>, usize> {
    pieces
        .iter()
        .map(|piece| {
            segments
                .get(piece.segment)
                .and_then(Option::as_ref)
                .map(|buffer| (buffer, piece))
                .ok_or(piece.segment)
        })
        .collect()
}
