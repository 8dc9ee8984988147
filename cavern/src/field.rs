//! Cubic chunk regions, their dense float fields and the carved voxel masks derived
//! from them. All of them share the same flat layout, X varies fastest, then Z, then Y.

use glam::IVec3;


/// Largest accepted edge length of a chunk region.
pub const MAX_CHUNK_SIZE: usize = 512;


/// Calculate the index in a cubic region of the given edge length.
#[inline]
pub fn calc_index(size: usize, x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < size && y < size && z < size);
    (y * size + z) * size + x
}


/// Minimum corner of a cubic region of `size` voxels per edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkOrigin {
    pub pos: IVec3,
    pub size: usize,
}

impl ChunkOrigin {

    #[inline]
    pub fn new(pos: IVec3, size: usize) -> Self {
        Self { pos, size }
    }

    /// Origin of the segment starting at `y_base` in column `cx`/`cz`.
    #[inline]
    pub fn of_segment(cx: i32, cz: i32, y_base: i32, size: usize) -> Self {
        let s = size as i32;
        Self::new(IVec3::new(cx * s, y_base, cz * s), size)
    }

    #[inline]
    pub fn volume(self) -> usize {
        self.size * self.size * self.size
    }

    /// World position of a local voxel.
    #[inline]
    pub fn world(self, x: usize, y: usize, z: usize) -> IVec3 {
        self.pos + IVec3::new(x as i32, y as i32, z as i32)
    }

    /// Local coordinates of a world position, if it lies in this region.
    pub fn local(self, pos: IVec3) -> Option<(usize, usize, usize)> {
        let rel = pos - self.pos;
        let size = self.size as i32;
        if rel.cmpge(IVec3::ZERO).all() && rel.cmplt(IVec3::splat(size)).all() {
            Some((rel.x as usize, rel.y as usize, rel.z as usize))
        } else {
            None
        }
    }

}


/// A dense field of solidity scores, lower is more cave-like.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityField {
    size: usize,
    values: Vec<f32>,
}

impl DensityField {

    /// A fully solid field, every value is `1.0`.
    pub fn solid(size: usize) -> Self {
        Self { size, values: vec![1.0; size * size * size] }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[calc_index(self.size, x, y, z)]
    }

    /// Set a value, clamped to `[-1, 1]`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        self.values[calc_index(self.size, x, y, z)] = value.clamp(-1.0, 1.0);
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Add to a value, the result is clamped to `[-1, 1]`.
    #[inline]
    pub fn add(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let index = calc_index(self.size, x, y, z);
        self.values[index] = (self.values[index] + value).clamp(-1.0, 1.0);
    }

    /// Element-wise minimum with another field of the same size.
    pub fn min_with(&mut self, other: &DensityField) {
        debug_assert_eq!(self.size, other.size);
        for (dst, &src) in self.values.iter_mut().zip(&other.values) {
            *dst = dst.min(src);
        }
    }

}


/// Per-voxel carved state of a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelCaveMask {
    size: usize,
    carved: Vec<bool>,
}

impl VoxelCaveMask {

    pub fn new(size: usize) -> Self {
        Self { size, carved: vec![false; size * size * size] }
    }

    /// Carve every voxel whose density is strictly below the threshold.
    pub fn from_field(field: &DensityField, threshold: f32) -> Self {
        Self {
            size: field.size,
            carved: field.values.iter().map(|&v| v < threshold).collect(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> bool {
        self.carved[calc_index(self.size, x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, carved: bool) {
        self.carved[calc_index(self.size, x, y, z)] = carved;
    }

    /// Same as [`Self::get`] with signed coordinates, out of bounds is never carved.
    pub fn get_signed(&self, pos: IVec3) -> bool {
        let size = self.size as i32;
        if pos.cmpge(IVec3::ZERO).all() && pos.cmplt(IVec3::splat(size)).all() {
            self.get(pos.x as usize, pos.y as usize, pos.z as usize)
        } else {
            false
        }
    }

    /// Merge the carved voxels of another mask into this one.
    pub fn union_with(&mut self, other: &VoxelCaveMask) {
        debug_assert_eq!(self.size, other.size);
        for (dst, &src) in self.carved.iter_mut().zip(&other.carved) {
            *dst |= src;
        }
    }

    pub fn count(&self) -> usize {
        self.carved.iter().filter(|&&c| c).count()
    }

    /// Iterate over local coordinates of carved voxels, in index order.
    pub fn iter_carved(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let size = self.size;
        self.carved.iter()
            .enumerate()
            .filter(|&(_, &c)| c)
            .map(move |(i, _)| (i % size, i / (size * size), (i / size) % size))
    }

}
