use super::*;
use crate::foundation::core::{Channels, Rgba8};
use crate::foundation::error::ErrorKind;

#[test]
fn boundaries_use_cumulative_rounding() {
    assert_eq!(boundaries(10, 3), vec![0, 3, 7, 10]);
    assert_eq!(boundaries(1080, 2), vec![0, 540, 1080]);
    assert_eq!(boundaries(5, 5), vec![0, 1, 2, 3, 4, 5]);
    // Truncated per-cell width (100/7 = 14) would drift to 98; cumulative rounding ends at 100.
    assert_eq!(*boundaries(100, 7).last().unwrap(), 100);
}

#[test]
fn tiles_cover_frame_exactly_for_every_grid() {
    let sizes = [(20u32, 20u32), (37, 23), (512, 97), (41, 400)];
    for (w, h) in sizes {
        for x in 1..=20 {
            for y in 1..=20 {
                let g = GridSpec::new(x, y).unwrap();
                let rects = tile_rects(w, h, g).unwrap();
                assert_eq!(rects.len(), (x * y) as usize);

                let mut hits = vec![0u8; (w * h) as usize];
                for r in &rects {
                    assert!(r.width >= 1 && r.height >= 1);
                    for py in r.y..r.y + r.height {
                        for px in r.x..r.x + r.width {
                            hits[(py * w + px) as usize] += 1;
                        }
                    }
                }
                assert!(hits.iter().all(|&c| c == 1), "{w}x{h} grid {g}");
            }
        }
    }
}

#[test]
fn partition_is_row_major_with_positions() {
    let mut data = Vec::new();
    for y in 0..4u8 {
        for x in 0..6u8 {
            data.extend_from_slice(&[x, y, 0]);
        }
    }
    let frame = RasterFrame::new(6, 4, Channels::Rgb8, data).unwrap();
    let g = GridSpec::new(3, 2).unwrap();
    let tiles = partition(&frame, g).unwrap();
    assert_eq!(tiles.len(), 6);
    for (i, t) in tiles.iter().enumerate() {
        assert_eq!(t.index(g), i);
        assert_eq!((t.row, t.col), (i as u32 / 3, i as u32 % 3));
        assert_eq!((t.frame.width, t.frame.height), (2, 2));
        assert_eq!(t.frame.pixel(0, 0), &[t.col as u8 * 2, t.row as u8 * 2, 0]);
    }
}

#[test]
fn square_frame_splits_into_equal_tiles() {
    let frame = RasterFrame::filled(1080, 1080, Channels::Rgb8, Rgba8::WHITE);
    let tiles = partition(&frame, GridSpec::new(2, 2).unwrap()).unwrap();
    assert!(
        tiles
            .iter()
            .all(|t| (t.frame.width, t.frame.height) == (540, 540))
    );
}

#[test]
fn undersized_frame_is_dimension_error() {
    let frame = RasterFrame::filled(4, 30, Channels::Rgb8, Rgba8::WHITE);
    let err = partition(&frame, GridSpec::new(5, 1).unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dimension);
    let err = partition(&frame, GridSpec::new(1, 20).unwrap());
    assert!(err.is_ok());
}
