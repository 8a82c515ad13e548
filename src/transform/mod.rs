//! Per-frame geometry and per-tile pixel work: aspect adaptation, grid partitioning, and
//! normalization to canonical emoji artifacts.

pub mod adapt;
mod background;
mod filters;
pub mod normalize;
pub mod partition;
mod resample;
