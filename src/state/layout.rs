//! Block layout of the filter's tangent-space vector.
//!
//! The estimator state, its covariance matrix and the process-noise vector
//! are all indexed through a [`StateLayout`]: an ordered list of named blocks,
//! each made of `count` elements of `element_dim` tangent dimensions. Offsets
//! are resolved once by [`LayoutBuilder::build`] and never change afterwards,
//! so the total dimension and every block offset come from the same table.
//!
//! Filter layout for `n_cam` cameras and `n_max` feature slots:
//!
//! ```text
//! pos  (3)          position of the body in the world frame
//! vel  (3)          body velocity, body frame
//! acb  (3)          accelerometer bias
//! gyb  (3)          gyroscope bias
//! att  (3)          body-to-world attitude (rotation vector increment)
//! vep  (3 x n_cam)  body-to-camera translation
//! vea  (3 x n_cam)  body-to-camera rotation
//! dep  (1 x n_max)  depth parameter
//! nor  (2 x n_max)  bearing vector
//! ```

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Named block of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Position,
    Velocity,
    AccelBias,
    GyroBias,
    Attitude,
    ExtrinsicTranslation,
    ExtrinsicRotation,
    Depth,
    Bearing,
}

impl BlockKind {
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Position => "pos",
            BlockKind::Velocity => "vel",
            BlockKind::AccelBias => "acb",
            BlockKind::GyroBias => "gyb",
            BlockKind::Attitude => "att",
            BlockKind::ExtrinsicTranslation => "vep",
            BlockKind::ExtrinsicRotation => "vea",
            BlockKind::Depth => "dep",
            BlockKind::Bearing => "nor",
        }
    }

    fn out_of_range(self, index: usize, count: usize) -> StateError {
        match self {
            BlockKind::ExtrinsicTranslation | BlockKind::ExtrinsicRotation => {
                StateError::CameraOutOfRange {
                    camera: index,
                    num_cameras: count,
                }
            }
            _ => StateError::SlotOutOfRange {
                slot: index,
                capacity: count,
            },
        }
    }
}

/// One resolved block: `count` elements of `element_dim` starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub kind: BlockKind,
    pub element_dim: usize,
    pub count: usize,
    pub offset: usize,
}

impl BlockSpec {
    /// Total tangent dimension of the block.
    pub fn dim(&self) -> usize {
        self.element_dim * self.count
    }

    /// Offset of element `index`.
    pub fn element_offset(&self, index: usize) -> Result<usize> {
        if index >= self.count {
            return Err(self.kind.out_of_range(index, self.count));
        }
        Ok(self.offset + index * self.element_dim)
    }
}

/// Accumulates blocks in order and resolves their offsets.
#[derive(Debug, Default)]
pub struct LayoutBuilder {
    blocks: Vec<BlockSpec>,
    next_offset: usize,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block of `count` elements with `element_dim` dimensions each.
    pub fn block(mut self, kind: BlockKind, element_dim: usize, count: usize) -> Self {
        self.blocks.push(BlockSpec {
            kind,
            element_dim,
            count,
            offset: self.next_offset,
        });
        self.next_offset += element_dim * count;
        self
    }

    pub fn build(self) -> Result<StateLayout> {
        for (i, block) in self.blocks.iter().enumerate() {
            if self.blocks[..i].iter().any(|b| b.kind == block.kind) {
                return Err(StateError::InvalidConfig(format!(
                    "layout block '{}' declared twice",
                    block.kind.name()
                )));
            }
        }
        Ok(self.resolve())
    }

    /// Finish without checking for duplicate blocks.
    pub(crate) fn resolve(self) -> StateLayout {
        StateLayout {
            blocks: self.blocks,
            dimension: self.next_offset,
        }
    }
}

/// Resolved offset table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLayout {
    blocks: Vec<BlockSpec>,
    dimension: usize,
}

impl StateLayout {
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::new()
    }

    /// Layout of the estimator state for `n_cam` cameras and `n_max` slots.
    pub fn filter(n_cam: usize, n_max: usize) -> Self {
        Self::kinematic_blocks(n_cam, n_max).resolve()
    }

    /// Shared block shapes of the state and its process noise.
    pub(crate) fn kinematic_blocks(n_cam: usize, n_max: usize) -> LayoutBuilder {
        Self::builder()
            .block(BlockKind::Position, 3, 1)
            .block(BlockKind::Velocity, 3, 1)
            .block(BlockKind::AccelBias, 3, 1)
            .block(BlockKind::GyroBias, 3, 1)
            .block(BlockKind::Attitude, 3, 1)
            .block(BlockKind::ExtrinsicTranslation, 3, n_cam)
            .block(BlockKind::ExtrinsicRotation, 3, n_cam)
            .block(BlockKind::Depth, 1, n_max)
            .block(BlockKind::Bearing, 2, n_max)
    }

    /// Total tangent dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn blocks(&self) -> &[BlockSpec] {
        &self.blocks
    }

    pub fn block(&self, kind: BlockKind) -> Result<&BlockSpec> {
        self.blocks
            .iter()
            .find(|b| b.kind == kind)
            .ok_or_else(|| {
                StateError::InvalidConfig(format!("layout has no block '{}'", kind.name()))
            })
    }

    /// Number of elements in a block, zero if the block is absent.
    pub fn count(&self, kind: BlockKind) -> usize {
        self.block(kind).map(|b| b.count).unwrap_or(0)
    }

    /// Offset of element `index` of block `kind`.
    pub fn offset(&self, kind: BlockKind, index: usize) -> Result<usize> {
        self.block(kind)?.element_offset(index)
    }

    /// One line per block, e.g. `dep[21..23] 1x2`.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            let _ = writeln!(
                out,
                "{}[{}..{}] {}x{}",
                block.kind.name(),
                block.offset,
                block.offset + block.dim(),
                block.element_dim,
                block.count
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_layout_offsets() {
        let layout = StateLayout::filter(1, 2);

        assert_eq!(layout.dimension(), 15 + 3 + 3 + 2 + 4);
        assert_eq!(layout.offset(BlockKind::Position, 0).unwrap(), 0);
        assert_eq!(layout.offset(BlockKind::Attitude, 0).unwrap(), 12);
        assert_eq!(layout.offset(BlockKind::ExtrinsicTranslation, 0).unwrap(), 15);
        assert_eq!(layout.offset(BlockKind::ExtrinsicRotation, 0).unwrap(), 18);
        assert_eq!(layout.offset(BlockKind::Depth, 0).unwrap(), 21);
        assert_eq!(layout.offset(BlockKind::Depth, 1).unwrap(), 22);
        assert_eq!(layout.offset(BlockKind::Bearing, 0).unwrap(), 23);
        assert_eq!(layout.offset(BlockKind::Bearing, 1).unwrap(), 25);
    }

    #[test]
    fn test_dimension_is_sum_of_blocks() {
        for (n_cam, n_max) in [(1, 1), (2, 25), (4, 0)] {
            let layout = StateLayout::filter(n_cam, n_max);
            let sum: usize = layout.blocks().iter().map(BlockSpec::dim).sum();
            assert_eq!(layout.dimension(), sum);
            assert_eq!(layout.dimension(), 15 + 6 * n_cam + 3 * n_max);
        }
    }

    #[test]
    fn test_out_of_range_errors() {
        let layout = StateLayout::filter(2, 3);
        assert_eq!(
            layout.offset(BlockKind::Depth, 3),
            Err(StateError::SlotOutOfRange { slot: 3, capacity: 3 })
        );
        assert_eq!(
            layout.offset(BlockKind::ExtrinsicRotation, 2),
            Err(StateError::CameraOutOfRange { camera: 2, num_cameras: 2 })
        );
    }

    #[test]
    fn test_duplicate_block_rejected() {
        let result = StateLayout::builder()
            .block(BlockKind::Position, 3, 1)
            .block(BlockKind::Position, 3, 1)
            .build();
        assert!(matches!(result, Err(StateError::InvalidConfig(_))));
    }

    #[test]
    fn test_describe_lists_every_block() {
        let text = StateLayout::filter(1, 1).describe();
        assert_eq!(text.lines().count(), 9);
        assert!(text.contains("nor[22..24] 2x1"));
    }
}
