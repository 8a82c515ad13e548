use crate::foundation::core::{GridSpec, RasterFrame};
use crate::foundation::error::{GridmojiError, GridmojiResult};

/// Pixel rectangle of a tile in adapted-frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileRect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels (>= 1).
    pub width: u32,
    /// Height in pixels (>= 1).
    pub height: u32,
}

/// One grid cell's pixels plus its position.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    /// Row index, `0 <= row < grid.y`.
    pub row: u32,
    /// Column index, `0 <= col < grid.x`.
    pub col: u32,
    /// Region this tile covers in the adapted frame.
    pub rect: TileRect,
    /// Extracted pixels.
    pub frame: RasterFrame,
}

impl Tile {
    /// Row-major index of this tile within its grid.
    pub fn index(&self, grid: GridSpec) -> usize {
        self.row as usize * grid.x() as usize + self.col as usize
    }
}

/// Cumulative-rounded cell boundaries: `round(i * total / count)` for `i in 0..=count`.
///
/// Boundaries are strictly increasing when `total >= count`, start at `0`, and end at `total`.
pub fn boundaries(total: u32, count: u32) -> Vec<u32> {
    let (t, c) = (u64::from(total), u64::from(count));
    (0..=c).map(|i| ((2 * i * t + c) / (2 * c)) as u32).collect()
}

/// Compute the tile rectangles for a `width x height` frame, row-major.
pub fn tile_rects(width: u32, height: u32, grid: GridSpec) -> GridmojiResult<Vec<TileRect>> {
    if width < grid.x() || height < grid.y() {
        return Err(GridmojiError::dimension(format!(
            "adapted frame {width}x{height} is smaller than grid {grid}; need at least one pixel per cell"
        )));
    }
    let xs = boundaries(width, grid.x());
    let ys = boundaries(height, grid.y());

    let mut rects = Vec::with_capacity(grid.cells());
    for row in ys.windows(2) {
        for col in xs.windows(2) {
            rects.push(TileRect {
                x: col[0],
                y: row[0],
                width: col[1] - col[0],
                height: row[1] - row[0],
            });
        }
    }
    Ok(rects)
}

/// Split an adapted frame into exactly `grid.x * grid.y` tiles in row-major order.
///
/// The tiles cover the frame with no gap and no overlap.
#[tracing::instrument(
    skip(adapted),
    fields(width = adapted.width, height = adapted.height, grid = %grid)
)]
pub fn partition(adapted: &RasterFrame, grid: GridSpec) -> GridmojiResult<Vec<Tile>> {
    let rects = tile_rects(adapted.width, adapted.height, grid)?;
    let cols = grid.x();
    let tiles = rects
        .into_iter()
        .enumerate()
        .map(|(i, rect)| Tile {
            row: i as u32 / cols,
            col: i as u32 % cols,
            frame: adapted.crop(rect.x, rect.y, rect.width, rect.height),
            rect,
        })
        .collect::<Vec<_>>();
    tracing::debug!(tiles = tiles.len(), "partitioned frame");
    Ok(tiles)
}

#[cfg(test)]
#[path = "../../tests/unit/transform/partition.rs"]
mod tests;
