use std::io::Cursor;
use std::sync::Arc;

use image::ImageEncoder;
use image::codecs::png::PngEncoder;

use crate::config::NormalizerConfig;
use crate::foundation::core::{Channels, EMOJI_SIZE, QualityLevel, RasterFrame};
use crate::foundation::error::{GridmojiError, GridmojiResult};
use crate::transform::{background, filters, resample};

const SHARPEN_SIGMA: f32 = 1.0;

/// One finished emoji: a PNG at the canonical 512x512 size.
///
/// The encoded bytes are shared, so cloning an artifact (or a whole cache entry) never copies
/// pixel data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmojiArtifact {
    /// Always [`EMOJI_SIZE`].
    pub width: u32,
    /// Always [`EMOJI_SIZE`].
    pub height: u32,
    /// Whether the PNG carries an alpha channel.
    pub has_alpha: bool,
    /// Lossless PNG encoding.
    pub png: Arc<[u8]>,
}

impl EmojiArtifact {
    /// Encode a canonical-size frame as PNG.
    pub fn encode(frame: &RasterFrame) -> GridmojiResult<Self> {
        if (frame.width, frame.height) != (EMOJI_SIZE, EMOJI_SIZE) {
            return Err(GridmojiError::processing(format!(
                "artifact must be {EMOJI_SIZE}x{EMOJI_SIZE}, got {}x{}",
                frame.width, frame.height
            )));
        }
        let color = match frame.channels {
            Channels::Rgb8 => image::ExtendedColorType::Rgb8,
            Channels::Rgba8 => image::ExtendedColorType::Rgba8,
        };
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(&frame.data, frame.width, frame.height, color)
            .map_err(|e| GridmojiError::processing(format!("png encode failed: {e}")))?;
        Ok(Self {
            width: frame.width,
            height: frame.height,
            has_alpha: frame.channels == Channels::Rgba8,
            png: Arc::from(buf),
        })
    }

    /// Wrap previously encoded PNG bytes, checking the header for the canonical size.
    pub fn from_png(bytes: Vec<u8>) -> GridmojiResult<Self> {
        let (width, height, has_alpha) = {
            let reader = image::ImageReader::with_format(
                Cursor::new(bytes.as_slice()),
                image::ImageFormat::Png,
            );
            let decoder = reader
                .into_decoder()
                .map_err(|e| GridmojiError::processing(format!("png header unreadable: {e}")))?;
            let (w, h) = image::ImageDecoder::dimensions(&decoder);
            (w, h, image::ImageDecoder::color_type(&decoder).has_alpha())
        };
        if (width, height) != (EMOJI_SIZE, EMOJI_SIZE) {
            return Err(GridmojiError::processing(format!(
                "stored artifact is {width}x{height}, expected {EMOJI_SIZE}x{EMOJI_SIZE}"
            )));
        }
        Ok(Self {
            width,
            height,
            has_alpha,
            png: Arc::from(bytes),
        })
    }

    /// Decode back into a frame.
    pub fn decode(&self) -> GridmojiResult<RasterFrame> {
        let img = image::load_from_memory_with_format(&self.png, image::ImageFormat::Png)
            .map_err(|e| GridmojiError::processing(format!("png decode failed: {e}")))?;
        let channels = if self.has_alpha {
            Channels::Rgba8
        } else {
            Channels::Rgb8
        };
        Ok(RasterFrame::from_rgba_image(img.to_rgba8(), channels))
    }

    /// Encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        self.png.len()
    }
}

/// Turn one tile into a canonical emoji artifact.
///
/// `Medium` and `High` denoise and equalize local contrast before resizing; `High` also sharpens
/// afterwards. Background removal only ever adds alpha and never fails the tile.
pub fn normalize(
    tile: &RasterFrame,
    quality: QualityLevel,
    remove_background: bool,
    cfg: &NormalizerConfig,
) -> GridmojiResult<EmojiArtifact> {
    if tile.is_degenerate() {
        return Err(GridmojiError::dimension(format!(
            "tile is {}x{}",
            tile.width, tile.height
        )));
    }

    let mut frame = if quality.enhances() {
        let denoised = filters::gaussian_blur(tile, cfg.denoise_sigma)?;
        filters::clahe(&denoised, cfg.clahe_clip_limit, cfg.clahe_tiles)
    } else {
        tile.clone()
    };

    frame = resize_to_canonical(&frame)?;

    if quality == QualityLevel::High {
        frame = filters::unsharp_mask(&frame, SHARPEN_SIGMA, cfg.sharpen_amount)?;
    }

    if remove_background {
        match background::alpha_mask(&frame, &cfg.background) {
            Some(mask) => frame = apply_alpha(&frame, &mask),
            None => tracing::debug!("background removal skipped for tile"),
        }
    }

    EmojiArtifact::encode(&frame)
}

/// Lanczos3 when growing, area averaging when shrinking. Mixed tiles shrink first.
fn resize_to_canonical(frame: &RasterFrame) -> GridmojiResult<RasterFrame> {
    let (w, h) = (frame.width, frame.height);
    if w >= EMOJI_SIZE && h >= EMOJI_SIZE {
        return resample::resize_area(frame, EMOJI_SIZE, EMOJI_SIZE);
    }
    if w <= EMOJI_SIZE && h <= EMOJI_SIZE {
        return resample::resize_lanczos(frame, EMOJI_SIZE, EMOJI_SIZE);
    }
    let reduced = resample::resize_area(frame, w.min(EMOJI_SIZE), h.min(EMOJI_SIZE))?;
    resample::resize_lanczos(&reduced, EMOJI_SIZE, EMOJI_SIZE)
}

fn apply_alpha(frame: &RasterFrame, mask: &[u8]) -> RasterFrame {
    let mut out = frame.to_rgba8();
    for (px, &a) in out.data.chunks_exact_mut(4).zip(mask) {
        px[3] = px[3].min(a);
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/transform/normalize.rs"]
mod tests;
