//! Pipeline configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a valid config. A handful of
//! operational knobs can be overridden from `GRIDMOJI_*` environment variables.

use std::{path::Path, path::PathBuf, time::Duration};

use anyhow::Context as _;

use crate::foundation::core::Rgba8;
use crate::foundation::error::{GridmojiError, GridmojiResult};

/// Top-level configuration for a [`Pipeline`](crate::Pipeline).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Whole-job deadline in milliseconds, unless a request overrides it.
    pub timeout_ms: u64,
    /// Threads in the normalization pool. `None` uses rayon's default.
    pub worker_threads: Option<usize>,
    /// Jobs allowed to run at once; further jobs wait for a slot.
    pub max_concurrent_jobs: usize,
    /// Border fill for [`AdaptationMethod::Pad`](crate::AdaptationMethod::Pad).
    pub pad_color: Rgba8,
    /// Video key-frame sampling.
    pub sampler: SamplerConfig,
    /// Per-cell normalization.
    pub normalizer: NormalizerConfig,
    /// Artifact cache.
    pub cache: CacheConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            worker_threads: None,
            max_concurrent_jobs: 4,
            pad_color: Rgba8::WHITE,
            sampler: SamplerConfig::default(),
            normalizer: NormalizerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Frame selection strategy for video sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Evenly spaced timestamps.
    Uniform,
    /// Inter-frame difference driven, back-filled with uniform samples.
    SceneChange,
}

/// Configuration for [`sample`](crate::sample).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Selection strategy.
    pub strategy: SamplingStrategy,
    /// Upper bound on emitted frames.
    pub max_frames: u32,
    /// Uniform samples per second of source duration (before the cap).
    pub uniform_rate_hz: f64,
    /// Per-channel absolute difference above which a pixel counts as changed.
    pub pixel_threshold: u8,
    /// Fraction of changed pixels (vs. the last selected frame) that starts a new scene.
    pub sensitivity: f64,
    /// Selections closer than this (seconds) to the previous one are merged into it.
    pub min_spacing_sec: f64,
    /// Fewer detected scenes than this triggers uniform back-fill.
    pub min_scenes: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::Uniform,
            max_frames: 20,
            uniform_rate_hz: 2.0,
            pixel_threshold: 30,
            sensitivity: 0.25,
            min_spacing_sec: 0.5,
            min_scenes: 3,
        }
    }
}

/// Which background color the removal heuristic keys out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundKey {
    /// Median color of the tile border.
    Border,
    /// Near-white pixels.
    White,
    /// Near-black pixels.
    Black,
}

/// Background-removal heuristic parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundConfig {
    /// Key color source.
    pub key: BackgroundKey,
    /// Color distance at or below which a pixel is fully transparent.
    pub tolerance: u8,
    /// Width of the linear alpha ramp above `tolerance`.
    pub feather: u8,
    /// For [`BackgroundKey::Border`]: give up (no alpha) if the border's mean distance from its
    /// median exceeds this.
    pub max_border_spread: u8,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            key: BackgroundKey::Border,
            tolerance: 40,
            feather: 24,
            max_border_spread: 48,
        }
    }
}

/// Configuration for [`normalize`](crate::normalize).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Gaussian sigma for noise reduction at Medium/High.
    pub denoise_sigma: f32,
    /// CLAHE clip limit (multiple of the uniform bin height).
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid size per axis.
    pub clahe_tiles: u32,
    /// Unsharp-mask amount applied after resize at High.
    pub sharpen_amount: f32,
    /// Background-removal parameters (used only when a job enables removal).
    pub background: BackgroundConfig,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            denoise_sigma: 0.8,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            sharpen_amount: 0.5,
            background: BackgroundConfig::default(),
        }
    }
}

/// Configuration for the [`ArtifactCache`](crate::ArtifactCache).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Entry lifetime measured from creation.
    pub ttl_secs: u64,
    /// Background sweep period. `None` leaves eviction to lazy checks on access.
    pub sweep_interval_secs: Option<u64>,
    /// Write-through persistence directory.
    pub persist_dir: Option<PathBuf>,
    /// In-memory entry limit. The oldest entries are evicted first.
    pub max_entries: Option<usize>,
    /// In-memory limit on encoded PNG bytes.
    pub max_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            sweep_interval_secs: Some(300),
            persist_dir: None,
            max_entries: Some(256),
            max_bytes: Some(1 << 30),
        }
    }
}

impl CacheConfig {
    /// Entry lifetime as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl PipelineConfig {
    /// Default whole-job deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse a config from a JSON string and validate it.
    pub fn from_json_str(s: &str) -> GridmojiResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| GridmojiError::configuration(format!("invalid config json: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse, and validate a config file.
    pub fn from_json_file(path: &Path) -> GridmojiResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json_str(&raw)
    }

    /// Apply `GRIDMOJI_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> GridmojiResult<()> {
        self.apply_overrides_from(|k| std::env::var(k).ok())
    }

    /// Apply `GRIDMOJI_*` overrides from an arbitrary lookup.
    ///
    /// Recognized keys: `GRIDMOJI_TIMEOUT_SECS`, `GRIDMOJI_WORKER_THREADS`,
    /// `GRIDMOJI_CACHE_TTL_SECS`, `GRIDMOJI_CACHE_DIR`, `GRIDMOJI_CACHE_MAX_ENTRIES`.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> GridmojiResult<()> {
        fn parse<T: std::str::FromStr>(key: &str, v: &str) -> GridmojiResult<T> {
            v.trim().parse::<T>().map_err(|_| {
                GridmojiError::configuration(format!("invalid value '{v}' for {key}"))
            })
        }

        if let Some(v) = lookup("GRIDMOJI_TIMEOUT_SECS") {
            let secs: u64 = parse("GRIDMOJI_TIMEOUT_SECS", &v)?;
            self.timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(v) = lookup("GRIDMOJI_WORKER_THREADS") {
            self.worker_threads = Some(parse("GRIDMOJI_WORKER_THREADS", &v)?);
        }
        if let Some(v) = lookup("GRIDMOJI_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse("GRIDMOJI_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("GRIDMOJI_CACHE_DIR")
            && !v.trim().is_empty()
        {
            self.cache.persist_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("GRIDMOJI_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = Some(parse("GRIDMOJI_CACHE_MAX_ENTRIES", &v)?);
        }
        self.validate()
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> GridmojiResult<()> {
        if self.timeout_ms == 0 {
            return Err(GridmojiError::configuration("timeout_ms must be > 0"));
        }
        if let Some(n) = self.worker_threads
            && n == 0
        {
            return Err(GridmojiError::configuration(
                "worker_threads must be >= 1 when set",
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(GridmojiError::configuration(
                "max_concurrent_jobs must be >= 1",
            ));
        }

        let s = &self.sampler;
        if s.max_frames == 0 {
            return Err(GridmojiError::configuration("sampler.max_frames must be >= 1"));
        }
        if !s.uniform_rate_hz.is_finite() || s.uniform_rate_hz <= 0.0 {
            return Err(GridmojiError::configuration(
                "sampler.uniform_rate_hz must be finite and > 0",
            ));
        }
        if !(0.0..=1.0).contains(&s.sensitivity) {
            return Err(GridmojiError::configuration(
                "sampler.sensitivity must be in [0, 1]",
            ));
        }
        if !s.min_spacing_sec.is_finite() || s.min_spacing_sec < 0.0 {
            return Err(GridmojiError::configuration(
                "sampler.min_spacing_sec must be finite and >= 0",
            ));
        }

        let n = &self.normalizer;
        if !n.denoise_sigma.is_finite() || n.denoise_sigma <= 0.0 {
            return Err(GridmojiError::configuration(
                "normalizer.denoise_sigma must be finite and > 0",
            ));
        }
        if !n.clahe_clip_limit.is_finite() || n.clahe_clip_limit < 1.0 {
            return Err(GridmojiError::configuration(
                "normalizer.clahe_clip_limit must be >= 1",
            ));
        }
        if n.clahe_tiles == 0 || n.clahe_tiles > 64 {
            return Err(GridmojiError::configuration(
                "normalizer.clahe_tiles must be in [1, 64]",
            ));
        }
        if !n.sharpen_amount.is_finite() || n.sharpen_amount < 0.0 {
            return Err(GridmojiError::configuration(
                "normalizer.sharpen_amount must be finite and >= 0",
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(GridmojiError::configuration("cache.ttl_secs must be > 0"));
        }
        if self.cache.sweep_interval_secs == Some(0) {
            return Err(GridmojiError::configuration(
                "cache.sweep_interval_secs must be > 0 when set",
            ));
        }
        if self.cache.max_entries == Some(0) {
            return Err(GridmojiError::configuration(
                "cache.max_entries must be >= 1 when set",
            ));
        }
        if self.cache.max_bytes == Some(0) {
            return Err(GridmojiError::configuration(
                "cache.max_bytes must be >= 1 when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
