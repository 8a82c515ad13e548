use std::{fmt, str::FromStr};

use crate::foundation::error::{GridmojiError, GridmojiResult};

/// Smallest accepted grid dimension.
pub const GRID_MIN: u32 = 1;
/// Largest accepted grid dimension.
pub const GRID_MAX: u32 = 20;
/// Canonical edge length of every emitted artifact, in pixels.
pub const EMOJI_SIZE: u32 = 512;

/// Tile-count configuration `(x columns, y rows)` for one job.
///
/// Only constructible through [`GridSpec::new`] (or its `FromStr`/serde front-ends), so a value of
/// this type always satisfies `1 <= x, y <= 20`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "GridSpecRepr", into = "GridSpecRepr")]
pub struct GridSpec {
    x: u32,
    y: u32,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct GridSpecRepr {
    x: u32,
    y: u32,
}

impl TryFrom<GridSpecRepr> for GridSpec {
    type Error = GridmojiError;

    fn try_from(r: GridSpecRepr) -> Result<Self, Self::Error> {
        Self::new(r.x, r.y)
    }
}

impl From<GridSpec> for GridSpecRepr {
    fn from(g: GridSpec) -> Self {
        Self { x: g.x, y: g.y }
    }
}

impl GridSpec {
    /// Create a validated grid spec.
    pub fn new(x: u32, y: u32) -> GridmojiResult<Self> {
        if !(GRID_MIN..=GRID_MAX).contains(&x) || !(GRID_MIN..=GRID_MAX).contains(&y) {
            return Err(GridmojiError::configuration(format!(
                "grid {x}x{y} out of range: each dimension must be in [{GRID_MIN}, {GRID_MAX}]"
            )));
        }
        Ok(Self { x, y })
    }

    /// Number of columns.
    pub fn x(self) -> u32 {
        self.x
    }

    /// Number of rows.
    pub fn y(self) -> u32 {
        self.y
    }

    /// Total number of cells.
    pub fn cells(self) -> usize {
        self.x as usize * self.y as usize
    }

    /// Target aspect ratio `x / y`.
    pub fn ratio(self) -> f64 {
        f64::from(self.x) / f64::from(self.y)
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

impl FromStr for GridSpec {
    type Err = GridmojiError;

    /// Parse `"XxY"` (also accepts `X` as separator or `*`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (a, b) = lower
            .split_once(['x', '*'])
            .ok_or_else(|| GridmojiError::configuration(format!("invalid grid '{s}', want XxY")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| GridmojiError::configuration(format!("invalid grid '{s}', want XxY")))
        };
        Self::new(parse(a)?, parse(b)?)
    }
}

/// How a frame's aspect ratio is reshaped to the grid ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptationMethod {
    /// Add fill-colored borders.
    Pad,
    /// Resample one dimension non-uniformly.
    Stretch,
    /// Center-crop the over-long dimension.
    Crop,
}

impl AdaptationMethod {
    /// Stable tag used in fingerprints and manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pad => "pad",
            Self::Stretch => "stretch",
            Self::Crop => "crop",
        }
    }
}

impl fmt::Display for AdaptationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdaptationMethod {
    type Err = GridmojiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pad" => Ok(Self::Pad),
            "stretch" => Ok(Self::Stretch),
            "crop" => Ok(Self::Crop),
            other => Err(GridmojiError::configuration(format!(
                "unknown adaptation method '{other}', expected one of: pad, stretch, crop"
            ))),
        }
    }
}

/// Controls whether enhancement filters run during normalization.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    /// Resize only.
    Low,
    /// Denoise + local contrast before resize.
    Medium,
    /// Medium plus post-resize sharpening.
    High,
}

impl QualityLevel {
    /// Stable tag used in fingerprints and manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Whether denoise and local contrast run for this level.
    pub fn enhances(self) -> bool {
        !matches!(self, Self::Low)
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = GridmojiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(GridmojiError::configuration(format!(
                "unknown quality level '{other}', expected one of: low, medium, high"
            ))),
        }
    }
}

/// Pixel layout of a [`RasterFrame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Channels {
    /// 3 bytes per pixel.
    Rgb8,
    /// 4 bytes per pixel, straight alpha.
    Rgba8,
}

impl Channels {
    /// Bytes per pixel.
    pub fn count(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Opaque white, the default pad fill.
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    /// Opaque color from RGB.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Pixel bytes for the given layout (alpha dropped for RGB).
    pub fn pixel(self, channels: Channels) -> [u8; 4] {
        match channels {
            Channels::Rgb8 => [self.r, self.g, self.b, 0],
            Channels::Rgba8 => [self.r, self.g, self.b, self.a],
        }
    }
}

impl Default for Rgba8 {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Decoded raster pixels, row-major and tightly packed.
///
/// Each pipeline stage consumes frames by reference and produces new ones; frames are never
/// mutated after being handed on.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub channels: Channels,
    /// Pixel bytes, `width * height * channels.count()` long.
    pub data: Vec<u8>,
    /// Source timestamp in seconds (video only).
    pub timestamp_sec: Option<f64>,
}

impl RasterFrame {
    /// Create a frame, validating the buffer length.
    pub fn new(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> GridmojiResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(channels.count()))
            .ok_or_else(|| GridmojiError::processing("frame buffer size overflow"))?;
        if data.len() != expected {
            return Err(GridmojiError::processing(format!(
                "frame buffer has {} bytes, expected {expected} for {width}x{height} {channels:?}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
            timestamp_sec: None,
        })
    }

    /// Frame filled with a single color.
    pub fn filled(width: u32, height: u32, channels: Channels, color: Rgba8) -> Self {
        let bpp = channels.count();
        let px = color.pixel(channels);
        let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&px[..bpp]);
        }
        Self {
            width,
            height,
            channels,
            data,
            timestamp_sec: None,
        }
    }

    /// Attach a source timestamp.
    pub fn with_timestamp(mut self, timestamp_sec: Option<f64>) -> Self {
        self.timestamp_sec = timestamp_sec;
        self
    }

    /// Bytes per pixel.
    pub fn bpp(&self) -> usize {
        self.channels.count()
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.bpp()
    }

    /// `true` when either dimension is zero.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel bytes at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.bpp();
        let off = y as usize * self.stride() + x as usize * bpp;
        &self.data[off..off + bpp]
    }

    /// Copy the rectangle `[x, x+w) x [y, y+h)` into a new frame.
    ///
    /// The caller guarantees the rectangle lies inside the frame.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Self {
        let bpp = self.bpp();
        let stride = self.stride();
        let row_len = w as usize * bpp;
        let mut data = Vec::with_capacity(row_len * h as usize);
        for row in y..y + h {
            let off = row as usize * stride + x as usize * bpp;
            data.extend_from_slice(&self.data[off..off + row_len]);
        }
        Self {
            width: w,
            height: h,
            channels: self.channels,
            data,
            timestamp_sec: self.timestamp_sec,
        }
    }

    /// Convert to straight-alpha RGBA8, adding opaque alpha when needed.
    pub fn to_rgba8(&self) -> Self {
        match self.channels {
            Channels::Rgba8 => self.clone(),
            Channels::Rgb8 => {
                let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
                for px in self.data.chunks_exact(3) {
                    data.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                Self {
                    width: self.width,
                    height: self.height,
                    channels: Channels::Rgba8,
                    data,
                    timestamp_sec: self.timestamp_sec,
                }
            }
        }
    }

    pub(crate) fn into_rgba_image(self) -> GridmojiResult<image::RgbaImage> {
        let rgba = self.to_rgba8();
        image::RgbaImage::from_raw(rgba.width, rgba.height, rgba.data)
            .ok_or_else(|| GridmojiError::processing("rgba buffer does not match dimensions"))
    }

    pub(crate) fn from_rgba_image(img: image::RgbaImage, channels: Channels) -> Self {
        let (width, height) = img.dimensions();
        let raw = img.into_raw();
        let data = match channels {
            Channels::Rgba8 => raw,
            Channels::Rgb8 => raw
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };
        Self {
            width,
            height,
            channels,
            data,
            timestamp_sec: None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
