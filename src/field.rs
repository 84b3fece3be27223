//! Uniform 3D fields attached to a world.
//!
//! A field is a dense grid of homogeneous cells with a uniform cell size. The
//! simulation reads and writes it through [`Grid3D`]; the simulator only sees
//! the type-erased [`Field`] trait, which is enough to negotiate the shared
//! region with the viewer and serialize the grid into it every step.
//!
//! # Element Kinds
//!
//! | Kind | Rust type | Bytes per cell | Wire tag |
//! |------|-----------|----------------|----------|
//! | [`FieldKind::Int`] | `i32` | 4 | 0 |
//! | [`FieldKind::Float`] | `f32` | 4 | 1 |
//! | [`FieldKind::Bool`] | `bool` | 1 | 2 |
//!
//! # Shared Layout
//!
//! A serialized field is a 16-byte [`FieldHeader`] followed by `X*Y*Z`
//! elements in x-fastest order:
//!
//! ```text
//! +------+------+------+-----------+---------------------------+
//! | x:i32| y:i32| z:i32| cell: f32 | cells[x + X*(y + Y*z)] ... |
//! +------+------+------+-----------+---------------------------+
//! ```
//!
//! The payload length is implied by the header. [`FieldLayout`] turns a
//! header into an explicit element count and byte length so readers slice
//! the payload instead of walking past the header.
//!
//! # Example
//!
//! ```ignore
//! let mut heat = Grid3D::<f32>::new(32, 32, 8, 0.5);
//! *heat.at_mut(4, 4, 2) = 1.0;
//!
//! let cell = heat.from_world_position(2.1, 2.3, 1.2);
//! heat.for_each_neighbor(4, 4, 2, false, |i, j, k, value| {
//!     println!("({i}, {j}, {k}) = {value}");
//! });
//! ```

use crate::error::FieldError;
use bytemuck::{Pod, Zeroable};
use glam::{IVec3, Vec3};
use std::any::Any;
use std::fmt;

/// Element type discriminant shared with the viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FieldKind {
    /// One `i32` per cell.
    Int = 0,
    /// One `f32` per cell.
    Float = 1,
    /// One byte per cell, 0 or 1.
    Bool = 2,
}

impl FieldKind {
    /// Wire tag stored in the command buffer.
    pub fn tag(self) -> i32 {
        self as i32
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: i32) -> Result<Self, FieldError> {
        match tag {
            0 => Ok(FieldKind::Int),
            1 => Ok(FieldKind::Float),
            2 => Ok(FieldKind::Bool),
            other => Err(FieldError::UnsupportedKind(other)),
        }
    }

    /// Size in bytes of one serialized cell.
    pub fn element_size(self) -> usize {
        match self {
            FieldKind::Int => std::mem::size_of::<i32>(),
            FieldKind::Float => std::mem::size_of::<f32>(),
            FieldKind::Bool => 1,
        }
    }
}

/// Cell types a [`Grid3D`] can hold.
///
/// Implemented for `i32`, `f32` and `bool`; the associated kind is what gets
/// negotiated with the viewer, so it always agrees with the element type.
pub trait FieldElement: Copy + Default + PartialEq + fmt::Debug + Send + 'static {
    /// Discriminant for this element type.
    const KIND: FieldKind;

    /// Write `cells` into `out`, which is exactly
    /// `cells.len() * KIND.element_size()` bytes long.
    fn encode_cells(cells: &[Self], out: &mut [u8]);

    /// Decode a payload produced by [`FieldElement::encode_cells`].
    fn decode_cells(bytes: &[u8]) -> Vec<Self>;
}

impl FieldElement for i32 {
    const KIND: FieldKind = FieldKind::Int;

    fn encode_cells(cells: &[Self], out: &mut [u8]) {
        out.copy_from_slice(bytemuck::cast_slice(cells));
    }

    fn decode_cells(bytes: &[u8]) -> Vec<Self> {
        bytemuck::pod_collect_to_vec(bytes)
    }
}

impl FieldElement for f32 {
    const KIND: FieldKind = FieldKind::Float;

    fn encode_cells(cells: &[Self], out: &mut [u8]) {
        out.copy_from_slice(bytemuck::cast_slice(cells));
    }

    fn decode_cells(bytes: &[u8]) -> Vec<Self> {
        bytemuck::pod_collect_to_vec(bytes)
    }
}

impl FieldElement for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn encode_cells(cells: &[Self], out: &mut [u8]) {
        for (byte, cell) in out.iter_mut().zip(cells) {
            *byte = u8::from(*cell);
        }
    }

    fn decode_cells(bytes: &[u8]) -> Vec<Self> {
        bytes.iter().map(|b| *b != 0).collect()
    }
}

/// Fixed header at the start of the field region.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FieldHeader {
    pub x_size: i32,
    pub y_size: i32,
    pub z_size: i32,
    pub cell_size: f32,
}

impl FieldHeader {
    /// Serialized header size in bytes.
    pub const SIZE: usize = std::mem::size_of::<FieldHeader>();

    /// Build a header for the given dimensions.
    pub fn new(dimensions: [usize; 3], cell_size: f32) -> Self {
        Self {
            x_size: dimensions[0] as i32,
            y_size: dimensions[1] as i32,
            z_size: dimensions[2] as i32,
            cell_size,
        }
    }

    /// Read a header from the start of `bytes`.
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        bytes
            .get(..Self::SIZE)
            .map(bytemuck::pod_read_unaligned::<FieldHeader>)
    }

    /// Dimensions as unsigned sizes, rejecting negative values.
    pub fn dimensions(&self) -> Result<[usize; 3], FieldError> {
        let raw = [self.x_size, self.y_size, self.z_size];
        if raw.iter().any(|d| *d < 0) {
            return Err(FieldError::InvalidDimensions(raw));
        }
        Ok([raw[0] as usize, raw[1] as usize, raw[2] as usize])
    }
}

/// Explicit size description of a serialized field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldLayout {
    pub header: FieldHeader,
    pub kind: FieldKind,
    pub element_count: usize,
    pub byte_len: usize,
}

impl FieldLayout {
    /// Compute the layout implied by `header` for cells of `kind`.
    pub fn new(header: FieldHeader, kind: FieldKind) -> Result<Self, FieldError> {
        let [x, y, z] = header.dimensions()?;
        let overflow = || FieldError::InvalidDimensions([header.x_size, header.y_size, header.z_size]);
        let element_count = x
            .checked_mul(y)
            .and_then(|xy| xy.checked_mul(z))
            .ok_or_else(overflow)?;
        let byte_len = element_count
            .checked_mul(kind.element_size())
            .filter(|len| len.checked_add(FieldHeader::SIZE).is_some())
            .ok_or_else(overflow)?;
        Ok(Self {
            header,
            kind,
            element_count,
            byte_len,
        })
    }

    /// Header plus payload, in bytes.
    pub fn total_size(&self) -> usize {
        FieldHeader::SIZE + self.byte_len
    }

    /// Payload bytes of a region laid out as `self`.
    pub fn payload<'a>(&self, region: &'a [u8]) -> Result<&'a [u8], FieldError> {
        region
            .get(FieldHeader::SIZE..self.total_size())
            .ok_or(FieldError::RegionTooSmall {
                required: self.total_size(),
                actual: region.len(),
            })
    }

    /// Mutable payload bytes of a region laid out as `self`.
    pub fn payload_mut<'a>(&self, region: &'a mut [u8]) -> Result<&'a mut [u8], FieldError> {
        let actual = region.len();
        region
            .get_mut(FieldHeader::SIZE..self.total_size())
            .ok_or(FieldError::RegionTooSmall {
                required: self.total_size(),
                actual,
            })
    }
}

/// Type-erased view of a world's field.
///
/// This is all the simulator needs: dimensions and kind for negotiation, and
/// serialization for publishing. Typed access goes through [`Field::as_any`]
/// and a checked downcast to [`Grid3D`].
pub trait Field: Send {
    /// Cells per axis, `[X, Y, Z]`.
    fn dimensions(&self) -> [usize; 3];

    /// Edge length of one cell in world units.
    fn cell_size(&self) -> f32;

    /// Element discriminant.
    fn kind(&self) -> FieldKind;

    /// Header describing this field.
    fn header(&self) -> FieldHeader {
        FieldHeader::new(self.dimensions(), self.cell_size())
    }

    /// Explicit layout of the serialized form.
    fn layout(&self) -> FieldLayout {
        let [x, y, z] = self.dimensions();
        let element_count = x * y * z;
        FieldLayout {
            header: self.header(),
            kind: self.kind(),
            element_count,
            byte_len: element_count * self.kind().element_size(),
        }
    }

    /// Bytes needed to hold the header and every cell.
    fn required_serialized_size(&self) -> usize {
        self.layout().total_size()
    }

    /// Write the header and a raw copy of every cell into `region`.
    ///
    /// No synchronization happens here; the caller owns the region for the
    /// duration of the call.
    fn serialize_into(&self, region: &mut [u8]) -> Result<(), FieldError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense 3D grid of `T` with a uniform cell size.
///
/// Cell `(i, j, k)` occupies the cube centered at
/// `(i + 0.5, j + 0.5, k + 0.5) * cell_size`. Dimensions are fixed at
/// construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid3D<T: FieldElement> {
    x_size: usize,
    y_size: usize,
    z_size: usize,
    cell_size: f32,
    data: Vec<T>,
}

impl<T: FieldElement> Grid3D<T> {
    /// Create a grid of `x * y * z` default cells.
    ///
    /// # Panics
    ///
    /// Panics if a dimension does not fit the 32-bit wire header or the cell
    /// size is not positive.
    pub fn new(x_size: usize, y_size: usize, z_size: usize, cell_size: f32) -> Self {
        assert!(
            [x_size, y_size, z_size].iter().all(|d| *d <= i32::MAX as usize),
            "Field dimensions must fit in an i32"
        );
        assert!(cell_size > 0.0, "Field cell size must be positive");
        Self {
            x_size,
            y_size,
            z_size,
            cell_size,
            data: vec![T::default(); x_size * y_size * z_size],
        }
    }

    /// Create a cube of `size³` cells.
    pub fn cubic(size: usize, cell_size: f32) -> Self {
        Self::new(size, size, size, cell_size)
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    pub fn z_size(&self) -> usize {
        self.z_size
    }

    /// Total number of cells.
    pub fn total_cells(&self) -> usize {
        self.data.len()
    }

    /// Whether signed cell coordinates lie inside the grid.
    #[inline]
    pub fn in_bounds(&self, i: i64, j: i64, k: i64) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.x_size
            && (j as usize) < self.y_size
            && (k as usize) < self.z_size
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.x_size * (j + self.y_size * k)
    }

    #[inline]
    fn check(&self, i: usize, j: usize, k: usize) {
        assert!(
            i < self.x_size && j < self.y_size && k < self.z_size,
            "cell ({}, {}, {}) out of bounds for field {}x{}x{}",
            i,
            j,
            k,
            self.x_size,
            self.y_size,
            self.z_size
        );
    }

    /// Cell value.
    ///
    /// # Panics
    ///
    /// Panics when the coordinates are out of bounds.
    #[inline]
    pub fn at(&self, i: usize, j: usize, k: usize) -> &T {
        self.check(i, j, k);
        &self.data[self.index(i, j, k)]
    }

    /// Mutable cell value.
    ///
    /// # Panics
    ///
    /// Panics when the coordinates are out of bounds.
    #[inline]
    pub fn at_mut(&mut self, i: usize, j: usize, k: usize) -> &mut T {
        self.check(i, j, k);
        let index = self.index(i, j, k);
        &mut self.data[index]
    }

    /// Cell value, or `None` outside the grid.
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<&T> {
        if i < self.x_size && j < self.y_size && k < self.z_size {
            Some(&self.data[self.index(i, j, k)])
        } else {
            None
        }
    }

    /// Set every cell to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Cells in x-fastest order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// World-space center of cell `(i, j, k)`.
    pub fn to_world_coordinates(&self, i: usize, j: usize, k: usize) -> Vec3 {
        Vec3::new(
            (i as f32 + 0.5) * self.cell_size,
            (j as f32 + 0.5) * self.cell_size,
            (k as f32 + 0.5) * self.cell_size,
        )
    }

    /// Cell containing a world-space point. Not clipped to the grid.
    pub fn from_world_position(&self, x: f32, y: f32, z: f32) -> IVec3 {
        IVec3::new(
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
            (z / self.cell_size).floor() as i32,
        )
    }

    /// Cell containing `position`, if it lies inside the grid.
    pub fn cell_at(&self, position: Vec3) -> Option<(usize, usize, usize)> {
        let cell = self.from_world_position(position.x, position.y, position.z);
        self.in_bounds(cell.x as i64, cell.y as i64, cell.z as i64)
            .then(|| (cell.x as usize, cell.y as usize, cell.z as usize))
    }

    /// Visit the 26 neighbors of `(i, j, k)` that lie inside the grid, and the
    /// cell itself when `include_center` is set.
    pub fn for_each_neighbor<F>(&self, i: usize, j: usize, k: usize, include_center: bool, mut f: F)
    where
        F: FnMut(usize, usize, usize, &T),
    {
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if !include_center && dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let (ni, nj, nk) = (i as i64 + dx, j as i64 + dy, k as i64 + dz);
                    if self.in_bounds(ni, nj, nk) {
                        let (ni, nj, nk) = (ni as usize, nj as usize, nk as usize);
                        f(ni, nj, nk, &self.data[self.index(ni, nj, nk)]);
                    }
                }
            }
        }
    }
}

impl<T: FieldElement> Field for Grid3D<T> {
    fn dimensions(&self) -> [usize; 3] {
        [self.x_size, self.y_size, self.z_size]
    }

    fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn kind(&self) -> FieldKind {
        T::KIND
    }

    fn serialize_into(&self, region: &mut [u8]) -> Result<(), FieldError> {
        let layout = self.layout();
        if region.len() < layout.total_size() {
            return Err(FieldError::RegionTooSmall {
                required: layout.total_size(),
                actual: region.len(),
            });
        }
        region[..FieldHeader::SIZE].copy_from_slice(bytemuck::bytes_of(&layout.header));
        T::encode_cells(&self.data, layout.payload_mut(region)?);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== FieldKind Tests ==========

    #[test]
    fn test_kind_tags_roundtrip() {
        for kind in [FieldKind::Int, FieldKind::Float, FieldKind::Bool] {
            assert_eq!(FieldKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert_eq!(FieldKind::Int.tag(), 0);
        assert_eq!(FieldKind::Float.tag(), 1);
        assert_eq!(FieldKind::Bool.tag(), 2);
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        assert!(matches!(
            FieldKind::from_tag(7),
            Err(FieldError::UnsupportedKind(7))
        ));
    }

    #[test]
    fn test_element_kind_matches_type() {
        assert_eq!(Grid3D::<i32>::cubic(2, 1.0).kind(), FieldKind::Int);
        assert_eq!(Grid3D::<f32>::cubic(2, 1.0).kind(), FieldKind::Float);
        assert_eq!(Grid3D::<bool>::cubic(2, 1.0).kind(), FieldKind::Bool);
    }

    // ========== Grid Access Tests ==========

    #[test]
    fn test_at_uses_x_fastest_order() {
        let mut grid = Grid3D::<i32>::new(3, 4, 5, 1.0);
        *grid.at_mut(1, 2, 3) = 42;
        assert_eq!(*grid.at(1, 2, 3), 42);
        assert_eq!(grid.as_slice()[1 + 3 * (2 + 4 * 3)], 42);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_at_out_of_bounds_panics() {
        let grid = Grid3D::<f32>::cubic(2, 1.0);
        grid.at(2, 0, 0);
    }

    #[test]
    fn test_get_out_of_bounds_is_none() {
        let grid = Grid3D::<f32>::cubic(2, 1.0);
        assert!(grid.get(1, 1, 1).is_some());
        assert!(grid.get(0, 2, 0).is_none());
    }

    #[test]
    fn test_fill() {
        let mut grid = Grid3D::<bool>::new(2, 3, 1, 1.0);
        grid.fill(true);
        assert!(grid.as_slice().iter().all(|c| *c));
        assert_eq!(grid.total_cells(), 6);
    }

    // ========== Coordinate Tests ==========

    #[test]
    fn test_world_coordinate_mapping() {
        let grid = Grid3D::<f32>::cubic(2, 0.5);
        assert_eq!(grid.from_world_position(0.6, 0.9, 0.51), IVec3::new(1, 1, 1));
        assert_eq!(grid.to_world_coordinates(1, 1, 1), Vec3::splat(0.75));
        assert_eq!(grid.from_world_position(-0.1, 0.0, 0.0), IVec3::new(-1, 0, 0));
    }

    #[test]
    fn test_cell_at_clips() {
        let grid = Grid3D::<f32>::cubic(2, 0.5);
        assert_eq!(grid.cell_at(Vec3::new(0.1, 0.6, 0.9)), Some((0, 1, 1)));
        assert_eq!(grid.cell_at(Vec3::new(1.1, 0.0, 0.0)), None);
    }

    // ========== Neighbor Tests ==========

    #[test]
    fn test_neighbors_interior() {
        let grid = Grid3D::<i32>::cubic(3, 1.0);
        let mut count = 0;
        grid.for_each_neighbor(1, 1, 1, false, |_, _, _, _| count += 1);
        assert_eq!(count, 26);

        let mut with_center = 0;
        grid.for_each_neighbor(1, 1, 1, true, |_, _, _, _| with_center += 1);
        assert_eq!(with_center, 27);
    }

    #[test]
    fn test_neighbors_clip_at_corner() {
        let mut grid = Grid3D::<i32>::cubic(3, 1.0);
        *grid.at_mut(1, 1, 1) = 9;
        let mut seen = Vec::new();
        grid.for_each_neighbor(0, 0, 0, false, |i, j, k, v| seen.push((i, j, k, *v)));
        assert_eq!(seen.len(), 7);
        assert!(seen.contains(&(1, 1, 1, 9)));
        assert!(!seen.iter().any(|(i, j, k, _)| (*i, *j, *k) == (0, 0, 0)));
    }

    // ========== Serialization Tests ==========

    #[test]
    fn test_required_size() {
        assert_eq!(Grid3D::<f32>::cubic(2, 1.0).required_serialized_size(), 16 + 8 * 4);
        assert_eq!(Grid3D::<i32>::new(3, 2, 1, 1.0).required_serialized_size(), 16 + 6 * 4);
        assert_eq!(Grid3D::<bool>::new(3, 2, 1, 1.0).required_serialized_size(), 16 + 6);
    }

    #[test]
    fn test_serialize_float_field() {
        let mut grid = Grid3D::<f32>::new(2, 1, 1, 0.25);
        *grid.at_mut(1, 0, 0) = 3.5;
        let mut region = vec![0xAAu8; grid.required_serialized_size()];
        grid.serialize_into(&mut region).unwrap();

        let header = FieldHeader::read_from(&region).unwrap();
        assert_eq!(header, FieldHeader { x_size: 2, y_size: 1, z_size: 1, cell_size: 0.25 });

        let layout = FieldLayout::new(header, FieldKind::Float).unwrap();
        assert_eq!(layout.element_count, 2);
        let cells = f32::decode_cells(layout.payload(&region).unwrap());
        assert_eq!(cells, vec![0.0, 3.5]);
    }

    #[test]
    fn test_int_cells_decode_from_unaligned_payload() {
        let cells = [-3i32, 0, i32::MAX];
        let mut bytes = vec![0u8; 1 + 12];
        i32::encode_cells(&cells, &mut bytes[1..]);
        assert_eq!(i32::decode_cells(&bytes[1..]), cells.to_vec());
    }

    #[test]
    fn test_serialize_bool_field_uses_one_byte_per_cell() {
        let mut grid = Grid3D::<bool>::new(3, 1, 1, 1.0);
        *grid.at_mut(2, 0, 0) = true;
        let mut region = vec![0u8; grid.required_serialized_size() + 4];
        grid.serialize_into(&mut region).unwrap();
        assert_eq!(&region[16..19], &[0, 0, 1]);
        // Bytes past the payload are left alone
        assert_eq!(&region[19..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_serialize_into_short_region_fails() {
        let grid = Grid3D::<i32>::cubic(2, 1.0);
        let mut region = vec![0u8; grid.required_serialized_size() - 1];
        assert!(matches!(
            grid.serialize_into(&mut region),
            Err(FieldError::RegionTooSmall { required: 48, actual: 47 })
        ));
    }

    #[test]
    fn test_negative_header_dimensions_rejected() {
        let header = FieldHeader { x_size: -1, y_size: 2, z_size: 2, cell_size: 1.0 };
        assert!(matches!(
            FieldLayout::new(header, FieldKind::Int),
            Err(FieldError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_overflowing_header_dimensions_rejected() {
        let header = FieldHeader { x_size: i32::MAX, y_size: i32::MAX, z_size: i32::MAX, cell_size: 1.0 };
        assert!(matches!(
            FieldLayout::new(header, FieldKind::Bool),
            Err(FieldError::InvalidDimensions([i32::MAX, i32::MAX, i32::MAX]))
        ));

        // Fits as a cell count but not once scaled to four-byte cells
        let side = 1 << 21;
        let header = FieldHeader { x_size: side, y_size: side, z_size: 1 << 20, cell_size: 1.0 };
        assert!(FieldLayout::new(header, FieldKind::Bool).is_ok());
        assert!(matches!(
            FieldLayout::new(header, FieldKind::Float),
            Err(FieldError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let mut field: Box<dyn Field> = Box::new(Grid3D::<i32>::cubic(2, 1.0));
        assert!(field.as_any().downcast_ref::<Grid3D<f32>>().is_none());
        let grid = field.as_any_mut().downcast_mut::<Grid3D<i32>>().unwrap();
        *grid.at_mut(0, 0, 0) = 5;
        assert_eq!(field.as_any().downcast_ref::<Grid3D<i32>>().unwrap().at(0, 0, 0), &5);
    }
}
