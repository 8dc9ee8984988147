//! Precomputed primary noise fields of a chunk column.

use std::collections::HashMap;
use std::fmt;

use crate::noise::{DensityFieldSampler, NoiseError, NoiseGrid, NoiseKind};
use crate::field::ChunkOrigin;


/// Key of a field in a bundle, displayed as `<Kind>_<yBase>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleKey {
    pub kind: NoiseKind,
    pub y_base: i32,
}

impl BundleKey {

    #[inline]
    pub fn new(kind: NoiseKind, y_base: i32) -> Self {
        Self { kind, y_base }
    }

}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.y_base)
    }
}


/// The primary fields of every style that passed its gate in each segment of a column.
/// The presence of a key records the gate decision itself, a style whose key is absent
/// does not run when the bundle is used.
#[derive(Debug, Clone, Default)]
pub struct ColumnBundle {
    cx: i32,
    cz: i32,
    maps: HashMap<BundleKey, NoiseGrid>,
}

impl ColumnBundle {

    pub fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz, maps: HashMap::new() }
    }

    #[inline]
    pub fn chunk(&self) -> (i32, i32) {
        (self.cx, self.cz)
    }

    #[inline]
    pub fn get(&self, key: BundleKey) -> Option<&NoiseGrid> {
        self.maps.get(&key)
    }

    #[inline]
    pub fn contains(&self, key: BundleKey) -> bool {
        self.maps.contains_key(&key)
    }

    pub fn insert(&mut self, key: BundleKey, grid: NoiseGrid) {
        self.maps.insert(key, grid);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Keys of the bundle, sorted.
    pub fn keys(&self) -> Vec<BundleKey> {
        let mut keys: Vec<_> = self.maps.keys().copied().collect();
        keys.sort();
        keys
    }

}


/// Scales used to sample the primary field of a style, `(xz, y)`. Styles shaped in 2D
/// use a zero Y scale.
pub fn primary_scale(kind: NoiseKind) -> (f32, f32) {
    match kind {
        NoiseKind::SurfaceRiver
        | NoiseKind::UndergroundRiver
        | NoiseKind::LavaRiver
        | NoiseKind::Canyon
        | NoiseKind::Spaghetti2D => (1.0, 0.0),
        NoiseKind::VeinGap => (0.8, 0.4),
        NoiseKind::Pillar => (15.0, 0.3),
        _ => (1.0, 1.0),
    }
}

/// Sample the primary field of a style, the same way whether it ends up cached or not.
pub fn sample_primary(sampler: &DensityFieldSampler, kind: NoiseKind, origin: ChunkOrigin) -> Result<NoiseGrid, NoiseError> {
    let (xz_scale, y_scale) = primary_scale(kind);
    sampler.sample_grid(kind, origin, xz_scale, y_scale, 0)
}
