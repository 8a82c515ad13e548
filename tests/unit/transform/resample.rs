use super::*;
use crate::foundation::core::Rgba8;

#[test]
fn area_weights_sum_to_one() {
    for (src, dst) in [(10, 3), (7, 7), (1000, 512), (5, 1)] {
        for taps in area_weights(src, dst) {
            let sum: f32 = taps.iter().map(|(_, w)| *w).sum();
            assert!((sum - 1.0).abs() < 1e-4, "{src}->{dst}: {sum}");
        }
    }
}

#[test]
fn area_halving_averages_pairs() {
    let data = vec![0u8, 0, 0, 200, 200, 200, 100, 100, 100, 100, 100, 100];
    let f = RasterFrame::new(4, 1, Channels::Rgb8, data).unwrap();
    let out = resize_area(&f, 2, 1).unwrap();
    assert_eq!(out.data, vec![100, 100, 100, 100, 100, 100]);
}

#[test]
fn area_rejects_upscale() {
    let f = RasterFrame::filled(2, 2, Channels::Rgb8, Rgba8::WHITE);
    assert!(resize_area(&f, 3, 2).is_err());
}

#[test]
fn constant_image_stays_constant_under_both_filters() {
    let f = RasterFrame::filled(9, 5, Channels::Rgba8, Rgba8::rgb(40, 80, 120));
    let up = resize_lanczos(&f, 31, 17).unwrap();
    assert!(up.data.chunks_exact(4).all(|p| p == [40, 80, 120, 255]));
    let down = resize_area(&f, 4, 2).unwrap();
    assert!(down.data.chunks_exact(4).all(|p| p == [40, 80, 120, 255]));
}

#[test]
fn lanczos_preserves_layout_and_timestamp() {
    let f = RasterFrame::filled(3, 3, Channels::Rgb8, Rgba8::WHITE).with_timestamp(Some(1.5));
    let out = resize_lanczos(&f, 6, 4).unwrap();
    assert_eq!((out.width, out.height, out.channels), (6, 4, Channels::Rgb8));
    assert_eq!(out.timestamp_sec, Some(1.5));
}
