use super::*;
use crate::foundation::core::Rgba8;

fn solid(v: u8) -> RasterFrame {
    RasterFrame::filled(4, 2, Channels::Rgb8, Rgba8::rgb(v, v, v))
}

#[test]
fn in_memory_video_reports_metadata() {
    let v = InMemoryVideo::new(4.0, (0..10).map(solid).collect()).unwrap();
    let info = v.info();
    assert_eq!(info.frame_count, 10);
    assert!((info.duration_sec - 2.5).abs() < 1e-12);
    assert_eq!((info.width, info.height), (4, 2));
}

#[test]
fn frame_at_maps_time_to_index_and_clamps() {
    let v = InMemoryVideo::new(4.0, (0..10).map(solid).collect()).unwrap();
    let f = v.frame_at(0.6).unwrap();
    assert_eq!(f.data[0], 2);
    assert_eq!(f.timestamp_sec, Some(0.6));
    assert_eq!(v.frame_at(99.0).unwrap().data[0], 9);
    assert_eq!(v.frame_at(-1.0).unwrap().data[0], 0);
}

#[test]
fn empty_video_has_zero_frames_and_cannot_be_read() {
    let v = InMemoryVideo::new(30.0, Vec::new()).unwrap();
    assert_eq!(v.info().frame_count, 0);
    assert!(v.frame_at(0.0).is_err());
}

#[test]
fn rejects_bad_rate_and_mixed_resolutions() {
    assert!(InMemoryVideo::new(0.0, vec![solid(1)]).is_err());
    assert!(InMemoryVideo::new(f64::NAN, vec![solid(1)]).is_err());
    let odd = RasterFrame::filled(3, 3, Channels::Rgb8, Rgba8::WHITE);
    assert!(InMemoryVideo::new(10.0, vec![solid(1), odd]).is_err());
}

#[cfg(not(feature = "media-ffmpeg"))]
#[test]
fn ffmpeg_video_needs_feature() {
    let err = FfmpegVideo::from_bytes(b"not a video").unwrap_err();
    assert!(err.to_string().contains("media-ffmpeg"));
}
