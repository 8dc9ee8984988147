//! Noise-driven cave carving for voxel worlds.
//!
//! Columns of cubic segments are carved by blending several cave styles, each one built
//! from pooled noise generators. Noise fields of the columns around tracked positions
//! are precomputed in background and cached close to where they will be needed.

pub mod util;

pub mod noise;
pub mod field;
pub mod host;
pub mod config;
pub mod buffer;

pub mod carve;
pub mod precalc;
pub mod column;

pub use column::{CaveGenerator, Collaborators, GenerateOptions};
pub use config::{CaveConfig, CavernSettings, ConfigHandle, GateMode, StyleToggle};
pub use carve::{CarveError, ColumnReport, SegmentReport};
pub use precalc::{CaveMapPrecalculator, PrecalcStats, PrecomputeError};
