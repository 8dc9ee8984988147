//! Deferred voxel writes of one column generation pass.

use glam::IVec3;
use indexmap::IndexMap;

use crate::host::{BlockId, VoxelSink, AIR};


/// Coalesces writes by position, the last write to a position wins. Changes are handed
/// to the sink in first-write order when the buffer is applied, which consumes it.
#[derive(Debug, Default)]
pub struct BlockChangeBuffer {
    changes: IndexMap<IVec3, BlockId>,
}

impl BlockChangeBuffer {

    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write, replacing any previous one at the same position.
    #[inline]
    pub fn set(&mut self, pos: IVec3, block: BlockId) {
        self.changes.insert(pos, block);
    }

    #[inline]
    pub fn get(&self, pos: IVec3) -> Option<BlockId> {
        self.changes.get(&pos).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of staged positions that will become air.
    pub fn carved_count(&self) -> usize {
        self.changes.values().filter(|&&block| block == AIR).count()
    }

    /// Write every staged change to the sink and commit it, returning the number of
    /// carved voxels written.
    pub fn apply(self, sink: &mut dyn VoxelSink) -> usize {
        let carved = self.carved_count();
        for (pos, block) in self.changes {
            sink.set_voxel(pos, block);
        }
        sink.commit();
        carved
    }

}
