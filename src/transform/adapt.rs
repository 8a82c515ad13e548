use crate::foundation::core::{AdaptationMethod, GridSpec, RasterFrame, Rgba8};
use crate::foundation::error::{GridmojiError, GridmojiResult};
use crate::transform::resample::resize_lanczos;

/// Border widths added by [`AdaptationMethod::Pad`] (or removed by an equivalent crop).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Borders {
    /// Columns added on the left.
    pub left: u32,
    /// Columns added on the right (absorbs the odd remainder).
    pub right: u32,
    /// Rows added on top.
    pub top: u32,
    /// Rows added at the bottom (absorbs the odd remainder).
    pub bottom: u32,
}

impl Borders {
    /// `true` when no border is added.
    pub fn is_empty(self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

/// `round(num / den)` on non-negative integers.
fn div_round(num: u64, den: u64) -> u64 {
    (2 * num + den) / (2 * den)
}

/// `round(w / h * 1000) == round(x / y * 1000)`.
pub fn matches_grid_ratio(width: u32, height: u32, grid: GridSpec) -> bool {
    if height == 0 {
        return false;
    }
    let current = (f64::from(width) / f64::from(height) * 1000.0).round();
    let target = (grid.ratio() * 1000.0).round();
    current == target
}

/// Width that matches the grid ratio for a fixed height.
fn width_for_height(height: u32, grid: GridSpec) -> u32 {
    div_round(u64::from(height) * u64::from(grid.x()), u64::from(grid.y())).max(1) as u32
}

/// Height that matches the grid ratio for a fixed width.
fn height_for_width(width: u32, grid: GridSpec) -> u32 {
    div_round(u64::from(width) * u64::from(grid.y()), u64::from(grid.x())).max(1) as u32
}

/// `true` when `w/h < x/y`, compared exactly in integers.
fn narrower_than(width: u32, height: u32, grid: GridSpec) -> bool {
    u64::from(width) * u64::from(grid.y()) < u64::from(height) * u64::from(grid.x())
}

/// Border geometry [`AdaptationMethod::Pad`] would apply to a `width x height` frame.
pub fn pad_borders(width: u32, height: u32, grid: GridSpec) -> Borders {
    if width == 0 || height == 0 || matches_grid_ratio(width, height, grid) {
        return Borders::default();
    }
    if narrower_than(width, height, grid) {
        let total = width_for_height(height, grid).saturating_sub(width);
        let left = total / 2;
        Borders {
            left,
            right: total - left,
            ..Borders::default()
        }
    } else {
        let total = height_for_width(width, grid).saturating_sub(height);
        let top = total / 2;
        Borders {
            top,
            bottom: total - top,
            ..Borders::default()
        }
    }
}

/// Reshape `frame` so its aspect ratio matches `grid`.
///
/// Returns a new frame; the input is never modified. When the ratio already matches (see
/// [`matches_grid_ratio`]) the output equals the input for every method.
#[tracing::instrument(
    skip(frame, fill),
    fields(width = frame.width, height = frame.height, grid = %grid)
)]
pub fn adapt(
    frame: &RasterFrame,
    grid: GridSpec,
    method: AdaptationMethod,
    fill: Rgba8,
) -> GridmojiResult<RasterFrame> {
    if frame.is_degenerate() {
        return Err(GridmojiError::dimension(format!(
            "cannot adapt a {}x{} frame",
            frame.width, frame.height
        )));
    }
    if matches_grid_ratio(frame.width, frame.height, grid) {
        return Ok(frame.clone());
    }

    let out = match method {
        AdaptationMethod::Pad => pad(frame, grid, fill),
        AdaptationMethod::Stretch => stretch(frame, grid)?,
        AdaptationMethod::Crop => crop_center(frame, grid),
    };
    tracing::debug!(
        method = %method,
        out_width = out.width,
        out_height = out.height,
        "adapted frame"
    );
    Ok(out)
}

fn pad(frame: &RasterFrame, grid: GridSpec, fill: Rgba8) -> RasterFrame {
    let b = pad_borders(frame.width, frame.height, grid);
    if b.is_empty() {
        return frame.clone();
    }
    let new_w = frame.width + b.left + b.right;
    let new_h = frame.height + b.top + b.bottom;
    let mut out = RasterFrame::filled(new_w, new_h, frame.channels, fill)
        .with_timestamp(frame.timestamp_sec);

    let src_stride = frame.stride();
    let dst_stride = out.stride();
    let x_off = b.left as usize * frame.bpp();
    for row in 0..frame.height as usize {
        let src = &frame.data[row * src_stride..(row + 1) * src_stride];
        let dst_off = (row + b.top as usize) * dst_stride + x_off;
        out.data[dst_off..dst_off + src_stride].copy_from_slice(src);
    }
    out
}

fn stretch(frame: &RasterFrame, grid: GridSpec) -> GridmojiResult<RasterFrame> {
    let (w, h) = if narrower_than(frame.width, frame.height, grid) {
        (width_for_height(frame.height, grid), frame.height)
    } else {
        (frame.width, height_for_width(frame.width, grid))
    };
    resize_lanczos(frame, w, h)
}

fn crop_center(frame: &RasterFrame, grid: GridSpec) -> RasterFrame {
    if narrower_than(frame.width, frame.height, grid) {
        let new_h = height_for_width(frame.width, grid).min(frame.height);
        let top = (frame.height - new_h) / 2;
        frame.crop(0, top, frame.width, new_h)
    } else {
        let new_w = width_for_height(frame.height, grid).min(frame.width);
        let left = (frame.width - new_w) / 2;
        frame.crop(left, 0, new_w, frame.height)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/adapt.rs"]
mod tests;
