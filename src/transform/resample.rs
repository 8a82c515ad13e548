use image::imageops::{self, FilterType};

use crate::foundation::core::{Channels, RasterFrame};
use crate::foundation::error::{GridmojiError, GridmojiResult};

/// Lanczos3 resample to exactly `w x h`. Preserves the channel layout.
pub(crate) fn resize_lanczos(frame: &RasterFrame, w: u32, h: u32) -> GridmojiResult<RasterFrame> {
    if w == 0 || h == 0 || frame.is_degenerate() {
        return Err(GridmojiError::dimension(format!(
            "cannot resample {}x{} to {w}x{h}",
            frame.width, frame.height
        )));
    }
    if (frame.width, frame.height) == (w, h) {
        return Ok(frame.clone());
    }

    let data = match frame.channels {
        Channels::Rgb8 => {
            let img = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
                .ok_or_else(|| GridmojiError::processing("rgb buffer does not match dimensions"))?;
            imageops::resize(&img, w, h, FilterType::Lanczos3).into_raw()
        }
        Channels::Rgba8 => {
            let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
                .ok_or_else(|| GridmojiError::processing("rgba buffer does not match dimensions"))?;
            imageops::resize(&img, w, h, FilterType::Lanczos3).into_raw()
        }
    };

    Ok(RasterFrame::new(w, h, frame.channels, data)?.with_timestamp(frame.timestamp_sec))
}

/// Area-averaging downscale to exactly `w x h`.
///
/// Each destination pixel is the coverage-weighted mean of the source pixels under its footprint.
/// Both target dimensions must be `<=` the source dimensions.
pub(crate) fn resize_area(frame: &RasterFrame, w: u32, h: u32) -> GridmojiResult<RasterFrame> {
    if w == 0 || h == 0 || w > frame.width || h > frame.height {
        return Err(GridmojiError::processing(format!(
            "area resize only shrinks: {}x{} -> {w}x{h}",
            frame.width, frame.height
        )));
    }
    if (frame.width, frame.height) == (w, h) {
        return Ok(frame.clone());
    }

    let bpp = frame.bpp();
    let src_w = frame.width as usize;
    let src_h = frame.height as usize;
    let (dst_w, dst_h) = (w as usize, h as usize);

    let xw = area_weights(src_w, dst_w);
    let yw = area_weights(src_h, dst_h);

    let mut tmp = vec![0f32; dst_w * src_h * bpp];
    for y in 0..src_h {
        let row = &frame.data[y * src_w * bpp..(y + 1) * src_w * bpp];
        for (ox, taps) in xw.iter().enumerate() {
            let out = &mut tmp[(y * dst_w + ox) * bpp..(y * dst_w + ox + 1) * bpp];
            for &(sx, wt) in taps {
                for c in 0..bpp {
                    out[c] += wt * f32::from(row[sx * bpp + c]);
                }
            }
        }
    }

    let mut data = vec![0u8; dst_w * dst_h * bpp];
    for (oy, taps) in yw.iter().enumerate() {
        for x in 0..dst_w {
            let mut acc = [0f32; 4];
            for &(sy, wt) in taps {
                let px = &tmp[(sy * dst_w + x) * bpp..(sy * dst_w + x + 1) * bpp];
                for c in 0..bpp {
                    acc[c] += wt * px[c];
                }
            }
            let out = &mut data[(oy * dst_w + x) * bpp..(oy * dst_w + x + 1) * bpp];
            for c in 0..bpp {
                out[c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Ok(RasterFrame::new(w, h, frame.channels, data)?.with_timestamp(frame.timestamp_sec))
}

/// Per destination index: `(source index, normalized coverage weight)` taps.
fn area_weights(src: usize, dst: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|o| {
            let start = o as f64 * scale;
            let end = (o as f64 + 1.0) * scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src);
            let mut taps = Vec::with_capacity(last - first);
            for s in first..last {
                let lo = start.max(s as f64);
                let hi = end.min(s as f64 + 1.0);
                let cover = hi - lo;
                if cover > 1e-9 {
                    taps.push((s, (cover / scale) as f32));
                }
            }
            taps
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/transform/resample.rs"]
mod tests;
