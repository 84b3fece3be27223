//! Command mailbox and field handshake.
//!
//! The command region holds one pending command plus the field negotiation
//! record. It is a mailbox, not a queue: the viewer stores a command, the
//! simulator clears it back to [`Command::None`] after acting on it, and a
//! command stored before the previous one was cleared replaces it.
//!
//! # Field Handshake
//!
//! ```text
//! simulator                         viewer
//!   | store type, x, y, z, cell size  |
//!   | store grid_requested = true --> |
//!   |                                 | create field region from request
//!   | <-- store grid_ready = true     |
//!   | attach field region             |
//! ```

use super::ShmRegion;
use crate::error::{FieldError, ShmError};
use crate::field::{Field, FieldKind};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Name of the command region.
pub const CMD_SHM_NAME: &str = "/uglylab_cmd";

/// Control commands, with their wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Command {
    /// Nothing pending.
    None = 0,
    /// Step continuously.
    Start = 1,
    /// Stop stepping continuously.
    Stop = 2,
    /// Advance exactly one step.
    Step = 3,
    /// Rebuild the world and publish it as step 0.
    Reset = 4,
    /// Leave the control loop.
    Terminate = 5,
    /// Publish the current state once without counting a step.
    Initialize = 6,
}

impl Command {
    /// Parse a wire value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Command::None),
            1 => Some(Command::Start),
            2 => Some(Command::Stop),
            3 => Some(Command::Step),
            4 => Some(Command::Reset),
            5 => Some(Command::Terminate),
            6 => Some(Command::Initialize),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        self as i32
    }
}

/// Shared layout of the command region.
#[repr(C)]
#[derive(Debug)]
pub struct CommandBuffer {
    pub command: AtomicI32,

    pub grid_requested: AtomicBool,
    pub grid_type: AtomicI32,
    pub grid_x: AtomicI32,
    pub grid_y: AtomicI32,
    pub grid_z: AtomicI32,
    /// `f32` bits.
    pub grid_cell_size: AtomicU32,
    pub grid_ready: AtomicBool,
}

impl CommandBuffer {
    pub const SIZE: usize = std::mem::size_of::<CommandBuffer>();
}

/// Field description published by the simulator, as raw wire values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldRequest {
    pub type_tag: i32,
    pub dimensions: [i32; 3],
    pub cell_size: f32,
}

impl FieldRequest {
    /// Request describing `field`.
    pub fn for_field(field: &dyn Field) -> Self {
        let header = field.header();
        Self {
            type_tag: field.kind().tag(),
            dimensions: [header.x_size, header.y_size, header.z_size],
            cell_size: header.cell_size,
        }
    }

    pub fn kind(&self) -> Result<FieldKind, FieldError> {
        FieldKind::from_tag(self.type_tag)
    }
}

/// Attached command region.
pub struct CommandChannel {
    region: ShmRegion,
}

impl CommandChannel {
    /// Create the region and empty the mailbox. Viewer side.
    pub fn create(root: &Path, name: &str) -> Result<Self, ShmError> {
        let channel = Self {
            region: ShmRegion::create(root, name, CommandBuffer::SIZE)?,
        };
        channel.buffer().command.store(Command::None.raw(), Ordering::Release);
        Ok(channel)
    }

    /// Attach to a region created by the viewer.
    pub fn attach(root: &Path, name: &str) -> Result<Self, ShmError> {
        Ok(Self {
            region: ShmRegion::open(root, name, CommandBuffer::SIZE)?,
        })
    }

    pub fn buffer(&self) -> &CommandBuffer {
        // SAFETY: the region is at least `CommandBuffer::SIZE` bytes, page
        // aligned, and the record is made of atomics only.
        unsafe { self.region.view::<CommandBuffer>(0) }
    }

    /// Raw value of the pending command.
    pub fn pending_raw(&self) -> i32 {
        self.buffer().command.load(Ordering::Acquire)
    }

    /// Pending command, or `None` for a value outside the known set.
    pub fn pending(&self) -> Option<Command> {
        Command::from_raw(self.pending_raw())
    }

    /// Clear the mailbox after acting on `raw`.
    ///
    /// Leaves a different command in place if the viewer stored one while
    /// `raw` was being handled. Returns whether the mailbox was cleared.
    pub fn acknowledge(&self, raw: i32) -> bool {
        self.buffer()
            .command
            .compare_exchange(raw, Command::None.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Store a command, replacing any pending one. Viewer side.
    pub fn send(&self, command: Command) {
        self.buffer().command.store(command.raw(), Ordering::Release);
    }

    pub fn field_requested(&self) -> bool {
        self.buffer().grid_requested.load(Ordering::Acquire)
    }

    /// Publish the field description unless a request already exists.
    ///
    /// The description is stored before the `grid_requested` flag, so a
    /// viewer that sees the flag also sees the description. Returns whether
    /// a request was published.
    pub fn request_field(&self, field: &dyn Field) -> bool {
        if self.field_requested() {
            return false;
        }
        let request = FieldRequest::for_field(field);
        let buffer = self.buffer();
        buffer.grid_type.store(request.type_tag, Ordering::Relaxed);
        buffer.grid_x.store(request.dimensions[0], Ordering::Relaxed);
        buffer.grid_y.store(request.dimensions[1], Ordering::Relaxed);
        buffer.grid_z.store(request.dimensions[2], Ordering::Relaxed);
        buffer
            .grid_cell_size
            .store(request.cell_size.to_bits(), Ordering::Relaxed);
        buffer.grid_requested.store(true, Ordering::Release);
        true
    }

    /// The published request, if any.
    pub fn field_request(&self) -> Option<FieldRequest> {
        if !self.field_requested() {
            return None;
        }
        let buffer = self.buffer();
        Some(FieldRequest {
            type_tag: buffer.grid_type.load(Ordering::Relaxed),
            dimensions: [
                buffer.grid_x.load(Ordering::Relaxed),
                buffer.grid_y.load(Ordering::Relaxed),
                buffer.grid_z.load(Ordering::Relaxed),
            ],
            cell_size: f32::from_bits(buffer.grid_cell_size.load(Ordering::Relaxed)),
        })
    }

    /// Negotiated type tag.
    pub fn field_type_tag(&self) -> i32 {
        self.buffer().grid_type.load(Ordering::Acquire)
    }

    pub fn field_ready(&self) -> bool {
        self.buffer().grid_ready.load(Ordering::Acquire)
    }

    /// Signal that the field region exists. Viewer side.
    pub fn mark_field_ready(&self) {
        self.buffer().grid_ready.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Grid3D;
    use crate::shm::test_support::shm_root;

    #[test]
    fn test_layout_matches_viewer() {
        // int, bool + 3 pad, int, 3 ints, float, bool + 3 pad
        assert_eq!(CommandBuffer::SIZE, 32);
        assert_eq!(std::mem::align_of::<CommandBuffer>(), 4);
    }

    #[test]
    fn test_command_wire_values() {
        assert_eq!(Command::Start.raw(), 1);
        assert_eq!(Command::Initialize.raw(), 6);
        for raw in 0..=6 {
            assert_eq!(Command::from_raw(raw).unwrap().raw(), raw);
        }
        assert_eq!(Command::from_raw(42), None);
    }

    #[test]
    fn test_mailbox_overwrites_pending_command() {
        let root = shm_root("mailbox");
        let viewer = CommandChannel::create(&root, CMD_SHM_NAME).unwrap();
        let sim = CommandChannel::attach(&root, CMD_SHM_NAME).unwrap();

        assert_eq!(sim.pending(), Some(Command::None));
        viewer.send(Command::Step);
        viewer.send(Command::Reset);
        assert_eq!(sim.pending(), Some(Command::Reset));
        assert!(sim.acknowledge(Command::Reset.raw()));
        assert_eq!(viewer.pending(), Some(Command::None));
    }

    #[test]
    fn test_acknowledge_keeps_newer_command() {
        let root = shm_root("ack");
        let viewer = CommandChannel::create(&root, CMD_SHM_NAME).unwrap();
        let sim = CommandChannel::attach(&root, CMD_SHM_NAME).unwrap();

        viewer.send(Command::Step);
        let seen = sim.pending_raw();
        viewer.send(Command::Stop);
        assert!(!sim.acknowledge(seen));
        assert_eq!(sim.pending(), Some(Command::Stop));
    }

    #[test]
    fn test_field_request_published_once() {
        let root = shm_root("request");
        let viewer = CommandChannel::create(&root, CMD_SHM_NAME).unwrap();
        let sim = CommandChannel::attach(&root, CMD_SHM_NAME).unwrap();
        let grid = Grid3D::<f32>::new(4, 5, 6, 0.25);

        assert_eq!(viewer.field_request(), None);
        assert!(sim.request_field(&grid));
        assert!(!sim.request_field(&Grid3D::<i32>::cubic(2, 1.0)));

        let request = viewer.field_request().unwrap();
        assert_eq!(request.kind().unwrap(), FieldKind::Float);
        assert_eq!(request.dimensions, [4, 5, 6]);
        assert_eq!(request.cell_size, 0.25);

        assert!(!sim.field_ready());
        viewer.mark_field_ready();
        assert!(sim.field_ready());
    }
}
