#![forbid(unsafe_code)]
//! Split an image or video into a grid of 512×512 emoji tiles.
//!
//! A job decodes the source, samples key frames for video, adapts each frame to the grid's aspect
//! ratio, partitions it into exact tiles, and normalizes every tile into a canonical PNG. Results
//! are cached by content fingerprint so identical requests compute once.

mod foundation;

pub mod cache;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod transform;

pub use cache::disk::{DiskStore, EntryMeta};
pub use cache::fingerprint::{Fingerprint, job_fingerprint, source_digest};
pub use cache::store::{
    ArtifactCache, ArtifactSet, CacheEntry, CacheLimits, CacheLookup, CacheStats, FrameArtifacts,
};
pub use config::{
    BackgroundConfig, BackgroundKey, CacheConfig, NormalizerConfig, PipelineConfig, SamplerConfig,
    SamplingStrategy,
};
pub use foundation::core::{
    AdaptationMethod, Channels, EMOJI_SIZE, GRID_MAX, GRID_MIN, GridSpec, QualityLevel,
    RasterFrame, Rgba8,
};
pub use foundation::error::{ErrorKind, GridmojiError, GridmojiResult};
pub use media::decode::{DecodedMedia, MediaKind, decode, sniff};
pub use media::sample::{SampledFrame, sample};
pub use media::video::{FfmpegVideo, FrameSource, InMemoryVideo, VideoSource, is_ffmpeg_on_path};
pub use pipeline::export::{PackManifest, safe_filename, write_pack, write_pack_archive};
pub use pipeline::job::{JobOptions, JobRequest, JobStage};
pub use pipeline::runner::{JobOutput, Pipeline};
pub use transform::adapt::adapt;
pub use transform::normalize::{EmojiArtifact, normalize};
pub use transform::partition::{Tile, TileRect, partition};
