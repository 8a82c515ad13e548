//! Enhancement filters used by the cell normalizer.

use crate::foundation::core::RasterFrame;
use crate::foundation::error::{GridmojiError, GridmojiResult};

/// Separable Gaussian blur over every channel, edges clamped.
pub(crate) fn gaussian_blur(frame: &RasterFrame, sigma: f32) -> GridmojiResult<RasterFrame> {
    let radius = (sigma * 3.0).ceil().max(1.0) as u32;
    let kernel = gaussian_kernel_q16(radius, sigma)?;
    if frame.is_degenerate() {
        return Ok(frame.clone());
    }

    let mut tmp = vec![0u8; frame.data.len()];
    let mut out = vec![0u8; frame.data.len()];
    horizontal_pass(&frame.data, &mut tmp, frame.width, frame.height, frame.bpp(), &kernel);
    vertical_pass(&tmp, &mut out, frame.width, frame.height, frame.bpp(), &kernel);

    Ok(RasterFrame {
        data: out,
        ..frame.clone()
    })
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> GridmojiResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(GridmojiError::configuration("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let weights_f = (-r..=r)
        .map(|i| (-(f64::from(i) * f64::from(i)) / denom).exp())
        .collect::<Vec<_>>();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(GridmojiError::processing("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = ((wf / sum) * 65536.0).round() as i64;
        let q = q.clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Fold quantization error into the center tap so the kernel sums to exactly 1.0 in Q16.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, bpp: usize, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    for y in 0..height as i32 {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                let idx = ((y * w + sx) as usize) * bpp;
                for c in 0..bpp {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * bpp;
            for c in 0..bpp {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, bpp: usize, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                let idx = ((sy * w + x) as usize) * bpp;
                for c in 0..bpp {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * bpp;
            for c in 0..bpp {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}

fn luma(px: &[u8]) -> u8 {
    let y = 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
    y.round().clamp(0.0, 255.0) as u8
}

/// Contrast-limited adaptive histogram equalization on luma.
///
/// The frame is divided into `tiles x tiles` regions (fewer when the frame is smaller than that).
/// Each region gets a clipped-histogram equalization LUT, and every pixel's new luma is bilinearly
/// interpolated between the LUTs of the four nearest region centers. The luma change is applied
/// additively to R, G and B; alpha is untouched.
pub(crate) fn clahe(frame: &RasterFrame, clip_limit: f32, tiles: u32) -> RasterFrame {
    if frame.is_degenerate() {
        return frame.clone();
    }
    let w = frame.width as usize;
    let h = frame.height as usize;
    let tx = (tiles.max(1) as usize).min(w);
    let ty = (tiles.max(1) as usize).min(h);
    let bpp = frame.bpp();

    let lum = frame.data.chunks_exact(bpp).map(luma).collect::<Vec<_>>();

    let x_edges = (0..=tx).map(|i| i * w / tx).collect::<Vec<_>>();
    let y_edges = (0..=ty).map(|i| i * h / ty).collect::<Vec<_>>();

    let mut luts = Vec::with_capacity(tx * ty);
    for j in 0..ty {
        for i in 0..tx {
            let mut hist = [0u32; 256];
            for y in y_edges[j]..y_edges[j + 1] {
                for x in x_edges[i]..x_edges[i + 1] {
                    hist[lum[y * w + x] as usize] += 1;
                }
            }
            let area = ((x_edges[i + 1] - x_edges[i]) * (y_edges[j + 1] - y_edges[j])) as u32;
            luts.push(clipped_equalization_lut(&mut hist, area, clip_limit));
        }
    }

    let centers = |edges: &[usize]| {
        edges
            .windows(2)
            .map(|e| (e[0] + e[1]) as f32 / 2.0 - 0.5)
            .collect::<Vec<f32>>()
    };
    let cx = centers(&x_edges);
    let cy = centers(&y_edges);

    // Index of the region center at or left of `p`, and the blend weight toward the next one.
    let locate = |c: &[f32], p: f32| -> (usize, usize, f32) {
        if p <= c[0] {
            return (0, 0, 0.0);
        }
        let last = c.len() - 1;
        if p >= c[last] {
            return (last, last, 0.0);
        }
        let i = c.iter().rposition(|&v| v <= p).unwrap_or(0);
        let t = (p - c[i]) / (c[i + 1] - c[i]);
        (i, i + 1, t)
    };

    let mut out = frame.clone();
    for y in 0..h {
        let (j0, j1, ty_w) = locate(&cy, y as f32);
        for x in 0..w {
            let (i0, i1, tx_w) = locate(&cx, x as f32);
            let v = lum[y * w + x] as usize;
            let a = f32::from(luts[j0 * tx + i0][v]);
            let b = f32::from(luts[j0 * tx + i1][v]);
            let c = f32::from(luts[j1 * tx + i0][v]);
            let d = f32::from(luts[j1 * tx + i1][v]);
            let top = a + (b - a) * tx_w;
            let bottom = c + (d - c) * tx_w;
            let mapped = top + (bottom - top) * ty_w;
            let delta = mapped - v as f32;

            let off = (y * w + x) * bpp;
            for ch in 0..3 {
                let nv = f32::from(frame.data[off + ch]) + delta;
                out.data[off + ch] = nv.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

fn clipped_equalization_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0).ceil() as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let mut rest = excess % 256;
    for bin in hist.iter_mut() {
        *bin += share;
        if rest > 0 {
            *bin += 1;
            rest -= 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    let total = u64::from(area.max(1));
    for (v, &count) in hist.iter().enumerate() {
        cdf += u64::from(count);
        lut[v] = ((cdf * 255 + total / 2) / total).min(255) as u8;
    }
    lut
}

/// Unsharp mask: `src + amount * (src - blur(src))` on color channels.
pub(crate) fn unsharp_mask(
    frame: &RasterFrame,
    sigma: f32,
    amount: f32,
) -> GridmojiResult<RasterFrame> {
    if amount <= 0.0 {
        return Ok(frame.clone());
    }
    let blurred = gaussian_blur(frame, sigma)?;
    let bpp = frame.bpp();
    let mut out = frame.clone();
    for ((o, s), b) in out
        .data
        .chunks_exact_mut(bpp)
        .zip(frame.data.chunks_exact(bpp))
        .zip(blurred.data.chunks_exact(bpp))
    {
        for c in 0..3 {
            let v = f32::from(s[c]) + amount * (f32::from(s[c]) - f32::from(b[c]));
            o[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/transform/filters.rs"]
mod tests;
