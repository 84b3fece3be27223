//! The field region.
//!
//! Created by the viewer once the simulator has published a field request
//! (see [`super::command`]). Its size depends on the negotiated dimensions
//! and element kind, so the simulator maps the header first, derives the full
//! length from it and maps again.
//!
//! The region is single-buffered. The simulator rewrites it in place every
//! step and a viewer reading concurrently may see cells from two steps.

use super::command::FieldRequest;
use super::ShmRegion;
use crate::error::FieldError;
use crate::field::{Field, FieldElement, FieldHeader, FieldKind, FieldLayout};
use std::path::Path;
use tracing::debug;

/// Name of the field region.
pub const GRID_SHM_NAME: &str = "/uglylab_grid";

/// Attached field region.
pub struct FieldChannel {
    region: ShmRegion,
    layout: FieldLayout,
}

impl FieldChannel {
    /// Create a region sized for `request` and write its header. Viewer side.
    pub fn create(root: &Path, name: &str, request: &FieldRequest) -> Result<Self, FieldError> {
        let kind = request.kind()?;
        let [x_size, y_size, z_size] = request.dimensions;
        let header = FieldHeader {
            x_size,
            y_size,
            z_size,
            cell_size: request.cell_size,
        };
        let layout = FieldLayout::new(header, kind)?;

        let mut region = ShmRegion::create(root, name, layout.total_size())?;
        let bytes = region.as_mut_slice();
        bytes[..FieldHeader::SIZE].copy_from_slice(bytemuck::bytes_of(&header));
        layout.payload_mut(bytes)?.fill(0);

        Ok(Self { region, layout })
    }

    /// Attach to the region created by the viewer.
    ///
    /// `kind` is the negotiated element kind; the dimensions come from the
    /// region's own header.
    pub fn attach(root: &Path, name: &str, kind: FieldKind) -> Result<Self, FieldError> {
        let header = {
            let head = ShmRegion::open(root, name, FieldHeader::SIZE)?;
            FieldHeader::read_from(head.as_slice()).ok_or(FieldError::RegionTooSmall {
                required: FieldHeader::SIZE,
                actual: head.len(),
            })?
        };
        let layout = FieldLayout::new(header, kind)?;
        let region = ShmRegion::open(root, name, layout.total_size())?;
        debug!(
            path = %region.path().display(),
            ?kind,
            x = header.x_size,
            y = header.y_size,
            z = header.z_size,
            bytes = layout.total_size(),
            "mapped field region"
        );
        Ok(Self { region, layout })
    }

    /// Layout fixed at attach time.
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    pub fn kind(&self) -> FieldKind {
        self.layout.kind
    }

    /// Header as currently stored in the region.
    pub fn read_header(&self) -> Option<FieldHeader> {
        FieldHeader::read_from(self.region.as_slice())
    }

    /// Payload bytes, excluding the header.
    pub fn payload(&self) -> Result<&[u8], FieldError> {
        self.layout.payload(self.region.as_slice())
    }

    /// Decode the payload as `T` cells.
    pub fn decode<T: FieldElement>(&self) -> Result<Vec<T>, FieldError> {
        if T::KIND != self.layout.kind {
            return Err(FieldError::KindMismatch {
                expected: T::KIND,
                actual: self.layout.kind,
            });
        }
        Ok(T::decode_cells(self.payload()?))
    }

    /// Check that `field` can be written into this region.
    pub fn check_compatible(&self, field: &dyn Field) -> Result<(), FieldError> {
        if field.kind() != self.layout.kind {
            return Err(FieldError::KindMismatch {
                expected: field.kind(),
                actual: self.layout.kind,
            });
        }
        let header = self.layout.header;
        let actual = [header.x_size, header.y_size, header.z_size];
        let expected = field.dimensions();
        if expected.iter().zip(actual).any(|(e, a)| *e as i64 != a as i64) {
            return Err(FieldError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }

    /// Serialize `field` into the region.
    pub fn publish(&mut self, field: &dyn Field) -> Result<(), FieldError> {
        self.check_compatible(field)?;
        field.serialize_into(self.region.as_mut_slice())
    }
}
