use crate::foundation::core::{Channels, RasterFrame};
use crate::foundation::error::{GridmojiError, GridmojiResult};
use crate::media::video::{FfmpegVideo, FrameSource};

/// Container family recognized from leading magic bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// A decoded source: one still frame, or a random-access video.
pub enum DecodedMedia {
    Image(RasterFrame),
    Video(Box<dyn FrameSource>),
}

impl std::fmt::Debug for DecodedMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(frame) => f
                .debug_struct("Image")
                .field("width", &frame.width)
                .field("height", &frame.height)
                .field("channels", &frame.channels)
                .finish(),
            Self::Video(v) => f.debug_tuple("Video").field(v.info()).finish(),
        }
    }
}

/// Classify a buffer without decoding it.
pub fn sniff(bytes: &[u8]) -> Option<MediaKind> {
    if image::guess_format(bytes).is_ok() {
        return Some(MediaKind::Image);
    }
    let iso_bmff = bytes.len() >= 12 && &bytes[4..8] == b"ftyp";
    let ebml = bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]);
    let avi = bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"AVI ";
    if iso_bmff || ebml || avi {
        return Some(MediaKind::Video);
    }
    None
}

/// Decode a media buffer into pixels (images) or a frame source (video).
///
/// Images keep an alpha channel when the source has one. Video goes through ffmpeg and needs the
/// `media-ffmpeg` feature.
#[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
pub fn decode(bytes: &[u8]) -> GridmojiResult<DecodedMedia> {
    match sniff(bytes) {
        Some(MediaKind::Image) => decode_image(bytes).map(DecodedMedia::Image),
        Some(MediaKind::Video) => {
            let video = FfmpegVideo::from_bytes(bytes)?;
            tracing::debug!(info = ?video.info(), "video probed");
            Ok(DecodedMedia::Video(Box::new(video)))
        }
        None => Err(GridmojiError::processing(
            "unrecognized media format (expected an image or a video container)",
        )),
    }
}

fn decode_image(bytes: &[u8]) -> GridmojiResult<RasterFrame> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| GridmojiError::processing(format!("image decode failed: {e}")))?;
    let frame = if img.color().has_alpha() {
        let rgba = img.into_rgba8();
        let (w, h) = rgba.dimensions();
        RasterFrame::new(w, h, Channels::Rgba8, rgba.into_raw())?
    } else {
        let rgb = img.into_rgb8();
        let (w, h) = rgb.dimensions();
        RasterFrame::new(w, h, Channels::Rgb8, rgb.into_raw())?
    };
    tracing::debug!(
        width = frame.width,
        height = frame.height,
        channels = ?frame.channels,
        "image decoded"
    );
    Ok(frame)
}

#[cfg(test)]
#[path = "../../tests/unit/media/decode.rs"]
mod tests;
