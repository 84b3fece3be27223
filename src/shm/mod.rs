//! Shared-memory channels between the simulator and the viewer.
//!
//! The viewer creates every region; the simulator attaches to them. Three
//! channels exist:
//!
//! | Channel | Region | Sized | Purpose |
//! |---------|--------|-------|---------|
//! | [`CommandChannel`] | `/uglylab_cmd` | fixed | control mailbox + field handshake |
//! | [`DataChannel`] | `/uglylab_shm` | fixed | double-buffered, paged agent snapshots |
//! | [`FieldChannel`] | `/uglylab_grid` | at runtime | serialized field |
//!
//! Regions are files under a shared-memory root, `/dev/shm` by default,
//! which is where `shm_open` keeps named objects on Linux. Coordination is
//! done with individually atomic fields and store ordering only; there are
//! no locks.

pub mod command;
pub mod data;
pub mod field;

pub use command::{Command, CommandBuffer, CommandChannel, FieldRequest, CMD_SHM_NAME};
pub use data::{
    ChunkMeta, DataChannel, DataLayout, Frame, MAX_CHUNKS_PER_FRAME, MAX_CHUNK_SIZE, NUM_BUFFERS,
    SHM_NAME,
};
pub use field::{FieldChannel, GRID_SHM_NAME};

use crate::error::ShmError;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Default directory holding named shared-memory objects.
pub const DEFAULT_SHM_ROOT: &str = "/dev/shm";

/// Path of the object called `name` (e.g. `"/uglylab_cmd"`) under `root`.
pub fn region_path(root: &Path, name: &str) -> PathBuf {
    root.join(name.trim_start_matches('/'))
}

/// One mapped shared-memory object.
///
/// The mapping is released when the region is dropped.
pub struct ShmRegion {
    path: PathBuf,
    map: MmapMut,
    base: NonNull<u8>,
}

// The base pointer points into `map`, which moves with the region.
unsafe impl Send for ShmRegion {}

impl ShmRegion {
    /// Create (or truncate to `len`) the object and map it read-write.
    ///
    /// This is the viewer's side of a channel.
    pub fn create(root: &Path, name: &str, len: usize) -> Result<Self, ShmError> {
        let path = region_path(root, name);
        let file = open_options(true).open(&path).map_err(|source| ShmError::Open {
            path: path.clone(),
            source,
        })?;
        file.set_len(len as u64).map_err(|source| ShmError::Resize {
            path: path.clone(),
            len,
            source,
        })?;
        Self::map(path, &file, len)
    }

    /// Map the first `len` bytes of an existing object.
    ///
    /// Fails with [`ShmError::TooSmall`] when the object is shorter.
    pub fn open(root: &Path, name: &str, len: usize) -> Result<Self, ShmError> {
        let path = region_path(root, name);
        let file = open_options(false).open(&path).map_err(|source| ShmError::Open {
            path: path.clone(),
            source,
        })?;
        let actual = file
            .metadata()
            .map_err(|source| ShmError::Open {
                path: path.clone(),
                source,
            })?
            .len() as usize;
        if actual < len {
            return Err(ShmError::TooSmall {
                path,
                expected: len,
                actual,
            });
        }
        Self::map(path, &file, len)
    }

    fn map(path: PathBuf, file: &File, len: usize) -> Result<Self, ShmError> {
        // SAFETY: the object is shared with the viewer by design; every access
        // to the mapping goes through atomics or byte copies.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(file) }
            .map_err(|source| ShmError::Map {
                path: path.clone(),
                source,
            })?;
        let base = NonNull::new(map.as_mut_ptr()).ok_or_else(|| ShmError::Map {
            path: path.clone(),
            source: std::io::Error::other("mapping returned a null pointer"),
        })?;
        Ok(Self { path, map, base })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Base address of the mapping. Page aligned.
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Reference to a `T` stored at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + size_of::<T>()` must be within the mapping, `offset` must
    /// be aligned for `T`, and `T` must tolerate concurrent modification by
    /// the other process (atomics only).
    pub(crate) unsafe fn view<T>(&self, offset: usize) -> &T {
        debug_assert!(offset + std::mem::size_of::<T>() <= self.len());
        debug_assert_eq!(offset % std::mem::align_of::<T>(), 0);
        &*(self.base.as_ptr().add(offset) as *const T)
    }
}

fn open_options(create: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(create);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }
    options
}
