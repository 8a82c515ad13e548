use std::path::{Path, PathBuf};

use crate::foundation::core::{Channels, RasterFrame};
use crate::foundation::error::{GridmojiError, GridmojiResult};

/// Read-only metadata of a decoded video stream.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct VideoSource {
    pub duration_sec: f64,
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

/// Random access to the frames of a video.
pub trait FrameSource: Send + Sync {
    fn info(&self) -> &VideoSource;

    /// Frame displayed at `t` seconds, tagged with that timestamp.
    fn frame_at(&self, t: f64) -> GridmojiResult<RasterFrame>;
}

/// Pre-decoded frames at a constant rate.
#[derive(Clone, Debug)]
pub struct InMemoryVideo {
    info: VideoSource,
    frames: Vec<RasterFrame>,
}

impl InMemoryVideo {
    pub fn new(fps: f64, frames: Vec<RasterFrame>) -> GridmojiResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(GridmojiError::processing(format!("invalid frame rate {fps}")));
        }
        let (width, height) = frames.first().map_or((0, 0), |f| (f.width, f.height));
        if frames
            .iter()
            .any(|f| (f.width, f.height) != (width, height))
        {
            return Err(GridmojiError::processing(
                "video frames must share one resolution",
            ));
        }
        let info = VideoSource {
            duration_sec: frames.len() as f64 / fps,
            fps,
            frame_count: frames.len() as u64,
            width,
            height,
        };
        Ok(Self { info, frames })
    }
}

impl FrameSource for InMemoryVideo {
    fn info(&self) -> &VideoSource {
        &self.info
    }

    fn frame_at(&self, t: f64) -> GridmojiResult<RasterFrame> {
        let last = self
            .frames
            .len()
            .checked_sub(1)
            .ok_or_else(|| GridmojiError::processing("video has no frames"))?;
        let idx = ((t.max(0.0) * self.info.fps).floor() as usize).min(last);
        Ok(self.frames[idx].clone().with_timestamp(Some(t)))
    }
}

/// Video decoded on demand by the system `ffmpeg`/`ffprobe` binaries.
#[derive(Debug)]
pub struct FfmpegVideo {
    path: PathBuf,
    info: VideoSource,
    _spill: TempFileGuard,
}

impl FfmpegVideo {
    /// Probe a video file on disk.
    pub fn open(path: &Path) -> GridmojiResult<Self> {
        let info = probe_video(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            info,
            _spill: TempFileGuard(None),
        })
    }

    /// Spill an in-memory container to a temp file and probe it. The file is removed on drop.
    pub fn from_bytes(bytes: &[u8]) -> GridmojiResult<Self> {
        let path = std::env::temp_dir().join(format!(
            "gridmoji_src_{}_{}.bin",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        let guard = TempFileGuard(Some(path.clone()));
        std::fs::write(&path, bytes).map_err(|e| {
            GridmojiError::processing(format!(
                "failed to spill video to '{}': {e}",
                path.display()
            ))
        })?;
        let info = probe_video(&path)?;
        Ok(Self {
            path,
            info,
            _spill: guard,
        })
    }
}

impl FrameSource for FfmpegVideo {
    fn info(&self) -> &VideoSource {
        &self.info
    }

    fn frame_at(&self, t: f64) -> GridmojiResult<RasterFrame> {
        let data = decode_frame_rgb8(&self.path, &self.info, t)?;
        Ok(RasterFrame::new(self.info.width, self.info.height, Channels::Rgb8, data)?
            .with_timestamp(Some(t)))
    }
}

#[derive(Debug)]
struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Whether `ffmpeg` can be spawned.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(feature = "media-ffmpeg")]
fn probe_video(source_path: &Path) -> GridmojiResult<VideoSource> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        nb_frames: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| GridmojiError::processing(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(GridmojiError::processing(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| GridmojiError::processing(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| GridmojiError::processing("no video stream found"))?;
    let width = stream
        .width
        .ok_or_else(|| GridmojiError::processing("missing video width from ffprobe"))?;
    let height = stream
        .height
        .ok_or_else(|| GridmojiError::processing("missing video height from ffprobe"))?;
    let fps = parse_ff_ratio(stream.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| GridmojiError::processing("invalid video r_frame_rate"))?;
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| (duration_sec * fps).round().max(0.0) as u64);

    Ok(VideoSource {
        duration_sec,
        fps,
        frame_count,
        width,
        height,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn probe_video(_source_path: &Path) -> GridmojiResult<VideoSource> {
    Err(GridmojiError::processing(
        "video input requires the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn decode_frame_rgb8(path: &Path, info: &VideoSource, t: f64) -> GridmojiResult<Vec<u8>> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{:.6}", t.max(0.0))])
        .arg("-i")
        .arg(path)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "pipe:1",
        ])
        .output()
        .map_err(|e| GridmojiError::processing(format!("failed to run ffmpeg: {e}")))?;
    if !out.status.success() {
        return Err(GridmojiError::processing(format!(
            "ffmpeg frame decode failed for '{}' at {t:.3}s: {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected = info.width as usize * info.height as usize * 3;
    if expected == 0 {
        return Err(GridmojiError::processing(
            "decoded video frame size is zero (invalid source dimensions)",
        ));
    }
    if out.stdout.len() < expected {
        return Err(GridmojiError::processing(format!(
            "ffmpeg returned {} bytes at {t:.3}s, expected {expected}",
            out.stdout.len()
        )));
    }
    let mut data = out.stdout;
    data.truncate(expected);
    Ok(data)
}

#[cfg(not(feature = "media-ffmpeg"))]
fn decode_frame_rgb8(_path: &Path, _info: &VideoSource, _t: f64) -> GridmojiResult<Vec<u8>> {
    Err(GridmojiError::processing(
        "video input requires the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn parse_ff_ratio(s: &str) -> Option<f64> {
    let (a, b) = s.split_once('/')?;
    let a = a.parse::<u32>().ok()?;
    let b = b.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some(f64::from(a) / f64::from(b))
}

#[cfg(test)]
#[path = "../../tests/unit/media/video.rs"]
mod tests;
