use std::fmt;
use std::str::FromStr;

use xxhash_rust::xxh3::{Xxh3, xxh3_128_with_seed};

use crate::config::{
    BackgroundConfig, BackgroundKey, NormalizerConfig, PipelineConfig, SamplerConfig,
    SamplingStrategy,
};
use crate::foundation::error::GridmojiError;
use crate::media::decode::{MediaKind, sniff};
use crate::pipeline::job::JobOptions;

const XXH3_SEED: u64 = 0x6d0f_27a3_91c4_5eb7;

/// Bumped whenever the hashed layout changes so stale persisted entries stop matching.
const LAYOUT_VERSION: u8 = 1;

/// 128-bit content address of a job's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    pub hi: u64,
    pub lo: u64,
}

impl Fingerprint {
    /// Lowercase 32-digit hex, used as the on-disk directory name.
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.hi, self.lo)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = GridmojiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || GridmojiError::processing(format!("invalid fingerprint '{s}'"));
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(bad());
        }
        let hi = u64::from_str_radix(&s[..16], 16).map_err(|_| bad())?;
        let lo = u64::from_str_radix(&s[16..], 16).map_err(|_| bad())?;
        Ok(Self { hi, lo })
    }
}

/// Digest of the raw source bytes.
pub fn source_digest(bytes: &[u8]) -> Fingerprint {
    split(xxh3_128_with_seed(bytes, XXH3_SEED))
}

/// Fingerprint of everything that determines a job's artifacts.
///
/// Covers the source digest, the job options, and each config value that changes output pixels.
/// Sampler settings only participate for video sources.
pub fn job_fingerprint(source: &[u8], opts: &JobOptions, cfg: &PipelineConfig) -> Fingerprint {
    let mut h = StableHasher::new();
    h.write_u8(LAYOUT_VERSION);

    let digest = source_digest(source);
    h.write_u64(digest.hi);
    h.write_u64(digest.lo);

    h.write_u32(opts.grid.x());
    h.write_u32(opts.grid.y());
    h.write_str(opts.method.as_str());
    h.write_str(opts.quality.as_str());
    h.write_bool(opts.remove_background);

    let pad = cfg.pad_color;
    h.write_bytes(&[pad.r, pad.g, pad.b, pad.a]);
    write_normalizer(&mut h, &cfg.normalizer);

    let is_video = sniff(source) == Some(MediaKind::Video);
    h.write_bool(is_video);
    if is_video {
        write_sampler(&mut h, &cfg.sampler);
    }
    h.finish()
}

fn write_normalizer(h: &mut StableHasher, n: &NormalizerConfig) {
    h.write_f32(n.denoise_sigma);
    h.write_f32(n.clahe_clip_limit);
    h.write_u32(n.clahe_tiles);
    h.write_f32(n.sharpen_amount);
    write_background(h, &n.background);
}

fn write_background(h: &mut StableHasher, b: &BackgroundConfig) {
    h.write_str(match b.key {
        BackgroundKey::Border => "border",
        BackgroundKey::White => "white",
        BackgroundKey::Black => "black",
    });
    h.write_bytes(&[b.tolerance, b.feather, b.max_border_spread]);
}

fn write_sampler(h: &mut StableHasher, s: &SamplerConfig) {
    h.write_str(match s.strategy {
        SamplingStrategy::Uniform => "uniform",
        SamplingStrategy::SceneChange => "scene_change",
    });
    h.write_u32(s.max_frames);
    h.write_f64(s.uniform_rate_hz);
    h.write_u8(s.pixel_threshold);
    h.write_f64(s.sensitivity);
    h.write_f64(s.min_spacing_sec);
    h.write_u32(s.min_scenes);
}

fn split(v: u128) -> Fingerprint {
    Fingerprint {
        hi: (v >> 64) as u64,
        lo: v as u64,
    }
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> Fingerprint {
        split(self.inner.digest128())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/fingerprint.rs"]
mod tests;
