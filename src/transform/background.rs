use crate::config::{BackgroundConfig, BackgroundKey};
use crate::foundation::core::RasterFrame;

/// Derive a per-pixel alpha mask that keys out the background.
///
/// Best-effort: returns `None` (leave the image opaque) when no usable key color exists or the mask
/// would erase the whole tile.
pub(crate) fn alpha_mask(frame: &RasterFrame, cfg: &BackgroundConfig) -> Option<Vec<u8>> {
    if frame.is_degenerate() {
        return None;
    }
    let key = match cfg.key {
        BackgroundKey::White => [255, 255, 255],
        BackgroundKey::Black => [0, 0, 0],
        BackgroundKey::Border => border_key(frame, cfg.max_border_spread)?,
    };

    let tol = f32::from(cfg.tolerance);
    let feather = f32::from(cfg.feather).max(1.0);
    let mask = frame
        .data
        .chunks_exact(frame.bpp())
        .map(|px| {
            let d = distance(px, key);
            if d <= tol {
                0
            } else if d >= tol + feather {
                255
            } else {
                (((d - tol) / feather) * 255.0).round() as u8
            }
        })
        .collect::<Vec<u8>>();

    if mask.iter().all(|&a| a == 0) {
        tracing::warn!(
            width = frame.width,
            height = frame.height,
            "background key matched every pixel, leaving tile opaque"
        );
        return None;
    }
    Some(mask)
}

fn distance(px: &[u8], key: [u8; 3]) -> f32 {
    let dr = f32::from(px[0]) - f32::from(key[0]);
    let dg = f32::from(px[1]) - f32::from(key[1]);
    let db = f32::from(px[2]) - f32::from(key[2]);
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Per-channel median of the one-pixel border, if the border is uniform enough to act as a key.
fn border_key(frame: &RasterFrame, max_spread: u8) -> Option<[u8; 3]> {
    let (w, h) = (frame.width, frame.height);
    let mut border = Vec::with_capacity(2 * (w + h) as usize);
    for x in 0..w {
        border.push(frame.pixel(x, 0));
        if h > 1 {
            border.push(frame.pixel(x, h - 1));
        }
    }
    for y in 1..h.saturating_sub(1) {
        border.push(frame.pixel(0, y));
        if w > 1 {
            border.push(frame.pixel(w - 1, y));
        }
    }

    let median = |c: usize| {
        let mut v = border.iter().map(|p| p[c]).collect::<Vec<_>>();
        v.sort_unstable();
        v[v.len() / 2]
    };
    let key = [median(0), median(1), median(2)];

    let spread = border.iter().map(|p| distance(p, key)).sum::<f32>() / border.len() as f32;
    if spread > f32::from(max_spread) {
        tracing::debug!(spread, max_spread, "border too varied for a background key");
        return None;
    }
    Some(key)
}

#[cfg(test)]
#[path = "../../tests/unit/transform/background.rs"]
mod tests;
