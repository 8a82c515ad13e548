use crate::config::{SamplerConfig, SamplingStrategy};
use crate::foundation::core::RasterFrame;
use crate::foundation::error::{GridmojiError, GridmojiResult};
use crate::media::video::FrameSource;

/// Scene-change candidates are a uniform pre-sample capped at this many frames.
const MAX_SCENE_CANDIDATES: u64 = 150;

/// A frame picked for tiling.
#[derive(Clone, Debug, PartialEq)]
pub struct SampledFrame {
    pub frame: RasterFrame,
    pub timestamp_sec: f64,
    /// Difference against the previously selected frame; `None` for the first frame and for
    /// uniform or back-filled picks.
    pub scene_score: Option<f64>,
}

/// Pick a bounded set of representative frames, ordered by timestamp.
#[tracing::instrument(skip(source, cfg), fields(strategy = ?cfg.strategy, max_frames = cfg.max_frames))]
pub fn sample(source: &dyn FrameSource, cfg: &SamplerConfig) -> GridmojiResult<Vec<SampledFrame>> {
    let info = source.info();
    if info.frame_count == 0 {
        return Err(GridmojiError::processing("video has zero frames"));
    }
    if !info.duration_sec.is_finite() || info.duration_sec <= 0.0 {
        return Err(GridmojiError::processing(format!(
            "video has invalid duration {}s",
            info.duration_sec
        )));
    }

    let out = match cfg.strategy {
        SamplingStrategy::Uniform => sample_uniform(source, cfg)?,
        SamplingStrategy::SceneChange => sample_scene_change(source, cfg)?,
    };
    tracing::debug!(selected = out.len(), "frames sampled");
    Ok(out)
}

/// `N = clamp(ceil(duration * rate), 1, min(max_frames, frame_count))`.
fn uniform_count(duration: f64, rate: f64, max_frames: u32, frame_count: u64) -> usize {
    let cap = u64::from(max_frames.max(1)).min(frame_count).max(1);
    let want = (duration * rate).ceil();
    let want = if want.is_finite() && want >= 1.0 {
        want as u64
    } else {
        1
    };
    want.clamp(1, cap) as usize
}

/// `t_i = i * duration / n`, all inside `[0, duration)`.
fn uniform_timestamps(duration: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 * duration / n as f64).collect()
}

fn sample_uniform(
    source: &dyn FrameSource,
    cfg: &SamplerConfig,
) -> GridmojiResult<Vec<SampledFrame>> {
    let info = source.info();
    let n = uniform_count(
        info.duration_sec,
        cfg.uniform_rate_hz,
        cfg.max_frames,
        info.frame_count,
    );
    uniform_timestamps(info.duration_sec, n)
        .into_iter()
        .map(|t| {
            Ok(SampledFrame {
                frame: source.frame_at(t)?,
                timestamp_sec: t,
                scene_score: None,
            })
        })
        .collect()
}

fn sample_scene_change(
    source: &dyn FrameSource,
    cfg: &SamplerConfig,
) -> GridmojiResult<Vec<SampledFrame>> {
    let info = source.info();
    let max_frames = cfg.max_frames.max(1) as usize;
    let candidates = (u64::from(cfg.max_frames.max(1)) * 3)
        .min(MAX_SCENE_CANDIDATES)
        .min(info.frame_count)
        .max(1) as usize;

    let mut selected: Vec<SampledFrame> = Vec::new();
    for t in uniform_timestamps(info.duration_sec, candidates) {
        let frame = source.frame_at(t)?;
        let scene_score = match selected.last() {
            None => None,
            Some(prev) => {
                let score = diff_fraction(&prev.frame, &frame, cfg.pixel_threshold);
                if score <= cfg.sensitivity {
                    continue;
                }
                if t - prev.timestamp_sec < cfg.min_spacing_sec {
                    tracing::trace!(t, score, "scene change merged into previous selection");
                    continue;
                }
                Some(score)
            }
        };
        selected.push(SampledFrame {
            frame,
            timestamp_sec: t,
            scene_score,
        });
    }

    let scenes = selected.len();
    let floor = (cfg.min_scenes as usize)
        .min(max_frames)
        .min(usize::try_from(info.frame_count).unwrap_or(usize::MAX));
    if scenes < floor {
        backfill_uniform(source, cfg, &mut selected, floor)?;
        tracing::debug!(
            scenes,
            backfilled = selected.len() - scenes,
            "too few scene changes, back-filled uniformly"
        );
    }

    if selected.len() > max_frames {
        selected = thin_evenly(selected, max_frames);
    }
    Ok(selected)
}

/// Add uniform picks until `target` frames exist, preferring timestamps clear of existing ones.
fn backfill_uniform(
    source: &dyn FrameSource,
    cfg: &SamplerConfig,
    selected: &mut Vec<SampledFrame>,
    target: usize,
) -> GridmojiResult<()> {
    let info = source.info();
    let grid = uniform_timestamps(info.duration_sec, target);
    let clear = |sel: &[SampledFrame], t: f64, spacing: f64| {
        sel.iter()
            .all(|s| (s.timestamp_sec - t).abs() >= spacing.max(1e-9))
    };

    for spacing in [cfg.min_spacing_sec, 0.0] {
        for &t in &grid {
            if selected.len() >= target {
                break;
            }
            if clear(selected.as_slice(), t, spacing) {
                selected.push(SampledFrame {
                    frame: source.frame_at(t)?,
                    timestamp_sec: t,
                    scene_score: None,
                });
            }
        }
    }
    selected.sort_by(|a, b| a.timestamp_sec.total_cmp(&b.timestamp_sec));
    Ok(())
}

fn thin_evenly(frames: Vec<SampledFrame>, cap: usize) -> Vec<SampledFrame> {
    let len = frames.len();
    let keep = (0..cap).map(|i| i * len / cap).collect::<Vec<_>>();
    frames
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.binary_search(i).is_ok())
        .map(|(_, f)| f)
        .collect()
}

/// Fraction of pixels whose largest color-channel difference exceeds `threshold`.
fn diff_fraction(a: &RasterFrame, b: &RasterFrame, threshold: u8) -> f64 {
    if (a.width, a.height) != (b.width, b.height) || a.is_degenerate() {
        return 1.0;
    }
    let changed = a
        .data
        .chunks_exact(a.bpp())
        .zip(b.data.chunks_exact(b.bpp()))
        .filter(|(pa, pb)| (0..3).any(|c| pa[c].abs_diff(pb[c]) > threshold))
        .count();
    changed as f64 / (a.width as f64 * a.height as f64)
}

#[cfg(test)]
#[path = "../../tests/unit/media/sample.rs"]
mod tests;
