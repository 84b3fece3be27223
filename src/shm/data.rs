//! Double-buffered, paged agent snapshots.
//!
//! The data region holds two generations of fixed-size chunks. The simulator
//! always writes the generation the viewer is *not* looking at, then flips
//! the visible index. A snapshot larger than one chunk is split across
//! consecutive chunks of that generation.
//!
//! # Layout
//!
//! ```text
//! current_step: i32
//! visible_buffer_index: i32
//! buffers[2][max_chunks]:
//!     ready: i32
//!     frame_index: i32
//!     chunk_index: i32
//!     total_chunks: i32
//!     agents_in_chunk: i32
//!     agents[chunk_capacity]: AgentData (16 bytes each)
//! ```
//!
//! # Ordering
//!
//! Each chunk is written `ready = 0` → metadata + records → `ready = 1`, and
//! the visible index is stored only after every chunk of the generation is
//! ready. A reader that loads the visible index therefore sees a fully
//! populated generation. It must re-check the index afterwards, since the
//! writer may have flipped twice while it was reading.

use super::ShmRegion;
use crate::agent::AgentData;
use crate::error::{PublishError, ShmError};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::trace;

/// Name of the data region.
pub const SHM_NAME: &str = "/uglylab_shm";
/// Records per chunk in the viewer's layout.
pub const MAX_CHUNK_SIZE: usize = 4096;
/// Chunks per generation in the viewer's layout.
pub const MAX_CHUNKS_PER_FRAME: usize = 10_000;
/// Number of generations.
pub const NUM_BUFFERS: usize = 2;

const HEADER_SIZE: usize = 2 * std::mem::size_of::<i32>();
const CHUNK_HEADER_SIZE: usize = std::mem::size_of::<ChunkHeader>();
const RECORD_SIZE: usize = std::mem::size_of::<AgentData>();

#[repr(C)]
struct RegionHeader {
    current_step: AtomicI32,
    visible_buffer_index: AtomicI32,
}

#[repr(C)]
struct ChunkHeader {
    ready: AtomicI32,
    frame_index: AtomicI32,
    chunk_index: AtomicI32,
    total_chunks: AtomicI32,
    agents_in_chunk: AtomicI32,
}

/// Capacity of the data region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataLayout {
    /// Records per chunk.
    pub chunk_capacity: usize,
    /// Chunks per generation.
    pub max_chunks: usize,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            chunk_capacity: MAX_CHUNK_SIZE,
            max_chunks: MAX_CHUNKS_PER_FRAME,
        }
    }
}

impl DataLayout {
    pub fn new(chunk_capacity: usize, max_chunks: usize) -> Self {
        assert!(chunk_capacity > 0, "Chunk capacity must be at least 1");
        assert!(max_chunks > 0, "A generation needs at least one chunk");
        Self {
            chunk_capacity,
            max_chunks,
        }
    }

    /// Bytes per chunk, header included.
    pub fn chunk_stride(&self) -> usize {
        CHUNK_HEADER_SIZE + self.chunk_capacity * RECORD_SIZE
    }

    /// Bytes in the whole region.
    pub fn region_size(&self) -> usize {
        HEADER_SIZE + NUM_BUFFERS * self.max_chunks * self.chunk_stride()
    }

    /// Most records one generation can carry.
    pub fn max_agents(&self) -> usize {
        self.chunk_capacity * self.max_chunks
    }

    /// Chunks needed for `agents` records.
    pub fn chunks_for(&self, agents: usize) -> usize {
        agents.div_ceil(self.chunk_capacity)
    }

    fn chunk_offset(&self, generation: usize, chunk: usize) -> usize {
        debug_assert!(generation < NUM_BUFFERS && chunk < self.max_chunks);
        HEADER_SIZE + (generation * self.max_chunks + chunk) * self.chunk_stride()
    }
}

/// Metadata of one chunk, as last written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkMeta {
    pub ready: bool,
    pub frame_index: i32,
    pub chunk_index: i32,
    pub total_chunks: i32,
    pub agents_in_chunk: i32,
}

/// A consistent snapshot read from the visible generation.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub generation: usize,
    /// `None` for an empty snapshot.
    pub frame_index: Option<i32>,
    pub chunks: Vec<ChunkMeta>,
    pub agents: Vec<AgentData>,
}

/// Attached data region.
pub struct DataChannel {
    region: ShmRegion,
    layout: DataLayout,
}

impl DataChannel {
    /// Create the region, show generation 0 and mark every chunk not ready.
    /// Viewer side.
    pub fn create(root: &Path, name: &str, layout: DataLayout) -> Result<Self, ShmError> {
        let channel = Self {
            region: ShmRegion::create(root, name, layout.region_size())?,
            layout,
        };
        channel.header().current_step.store(0, Ordering::Relaxed);
        channel.header().visible_buffer_index.store(0, Ordering::Relaxed);
        for generation in 0..NUM_BUFFERS {
            for chunk in 0..layout.max_chunks {
                channel.chunk(generation, chunk).ready.store(0, Ordering::Relaxed);
            }
        }
        std::sync::atomic::fence(Ordering::Release);
        Ok(channel)
    }

    /// Attach to a region created by the viewer.
    pub fn attach(root: &Path, name: &str, layout: DataLayout) -> Result<Self, ShmError> {
        Ok(Self {
            region: ShmRegion::open(root, name, layout.region_size())?,
            layout,
        })
    }

    pub fn layout(&self) -> DataLayout {
        self.layout
    }

    fn header(&self) -> &RegionHeader {
        // SAFETY: offset 0 is page aligned and the region holds the header.
        unsafe { self.region.view::<RegionHeader>(0) }
    }

    fn chunk(&self, generation: usize, chunk: usize) -> &ChunkHeader {
        let offset = self.layout.chunk_offset(generation, chunk);
        // SAFETY: offsets are multiples of 4 inside the region sized by the
        // layout; the chunk header is atomics only.
        unsafe { self.region.view::<ChunkHeader>(offset) }
    }

    fn write_records(&self, generation: usize, chunk: usize, records: &[AgentData]) {
        debug_assert!(records.len() <= self.layout.chunk_capacity);
        let offset = self.layout.chunk_offset(generation, chunk) + CHUNK_HEADER_SIZE;
        let bytes: &[u8] = bytemuck::cast_slice(records);
        // SAFETY: the destination lies inside this chunk's record array, and
        // the writer owns the non-visible generation.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.region.as_ptr().add(offset),
                bytes.len(),
            );
        }
    }

    fn read_records(
        &self,
        generation: usize,
        chunk: usize,
        count: usize,
        out: &mut Vec<AgentData>,
    ) {
        let count = count.min(self.layout.chunk_capacity);
        let offset = self.layout.chunk_offset(generation, chunk) + CHUNK_HEADER_SIZE;
        let bytes = &self.region.as_slice()[offset..offset + count * RECORD_SIZE];
        out.extend(
            bytes
                .chunks_exact(RECORD_SIZE)
                .map(bytemuck::pod_read_unaligned::<AgentData>),
        );
    }

    /// Index of the generation readers should use.
    pub fn visible_generation(&self) -> usize {
        (self.header().visible_buffer_index.load(Ordering::Acquire) as usize) & 1
    }

    /// Last published step counter.
    pub fn current_step(&self) -> i32 {
        self.header().current_step.load(Ordering::Acquire)
    }

    /// Publish the step counter. Called after the step's data is published.
    pub fn publish_step(&self, step: i32) {
        self.header().current_step.store(step, Ordering::Release);
    }

    /// Write `agents` into the hidden generation and make it visible.
    ///
    /// Returns the number of chunks written. When the snapshot does not fit,
    /// nothing is written and the visible generation is left alone.
    pub fn publish(&self, agents: &[AgentData], frame_index: i32) -> Result<usize, PublishError> {
        let total_chunks = self.layout.chunks_for(agents.len());
        if total_chunks > self.layout.max_chunks {
            return Err(PublishError::CapacityExceeded {
                agents: agents.len(),
                capacity: self.layout.max_agents(),
            });
        }

        let write_index = 1 - self.visible_generation();

        if total_chunks == 0 {
            // Readers stop at the first chunk that is not ready
            self.chunk(write_index, 0).ready.store(0, Ordering::Release);
        }

        for (i, records) in agents.chunks(self.layout.chunk_capacity).enumerate() {
            let chunk = self.chunk(write_index, i);
            chunk.ready.store(0, Ordering::Release);
            chunk.frame_index.store(frame_index, Ordering::Relaxed);
            chunk.chunk_index.store(i as i32, Ordering::Relaxed);
            chunk.total_chunks.store(total_chunks as i32, Ordering::Relaxed);
            chunk.agents_in_chunk.store(records.len() as i32, Ordering::Relaxed);
            self.write_records(write_index, i, records);
            chunk.ready.store(1, Ordering::Release);
        }

        self.header()
            .visible_buffer_index
            .store(write_index as i32, Ordering::Release);
        trace!(
            agents = agents.len(),
            chunks = total_chunks,
            generation = write_index,
            frame_index,
            "published agent snapshot"
        );
        Ok(total_chunks)
    }

    /// Metadata of one chunk.
    pub fn chunk_meta(&self, generation: usize, chunk: usize) -> ChunkMeta {
        let header = self.chunk(generation, chunk);
        ChunkMeta {
            ready: header.ready.load(Ordering::Acquire) != 0,
            frame_index: header.frame_index.load(Ordering::Relaxed),
            chunk_index: header.chunk_index.load(Ordering::Relaxed),
            total_chunks: header.total_chunks.load(Ordering::Relaxed),
            agents_in_chunk: header.agents_in_chunk.load(Ordering::Relaxed),
        }
    }

    /// Read the visible generation. Viewer side.
    ///
    /// Returns `None` when the read was torn: a chunk was not ready or
    /// belonged to another frame, or the visible index changed meanwhile.
    pub fn read_frame(&self) -> Option<Frame> {
        let generation = self.visible_generation();
        let first = self.chunk_meta(generation, 0);
        let mut frame = Frame {
            generation,
            frame_index: None,
            chunks: Vec::new(),
            agents: Vec::new(),
        };

        if first.ready {
            let total = (first.total_chunks.max(0) as usize).min(self.layout.max_chunks);
            for i in 0..total {
                let meta = self.chunk_meta(generation, i);
                if !meta.ready || meta.frame_index != first.frame_index {
                    return None;
                }
                let count = meta.agents_in_chunk.max(0) as usize;
                self.read_records(generation, i, count, &mut frame.agents);
                frame.chunks.push(meta);
            }
            frame.frame_index = Some(first.frame_index);
        }

        (self.visible_generation() == generation).then_some(frame)
    }
}
