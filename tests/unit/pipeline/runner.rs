use std::io::Cursor;

use super::*;
use crate::foundation::core::{AdaptationMethod, GridSpec, QualityLevel};
use crate::foundation::error::ErrorKind;

fn png(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    });
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn quiet_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.cache.sweep_interval_secs = None;
    cfg.worker_threads = Some(2);
    cfg
}

#[test]
fn zero_worker_threads_is_rejected() {
    let err = build_thread_pool(Some(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(build_thread_pool(Some(1)).is_ok());
}

#[test]
fn slots_bound_concurrency_and_time_out() {
    let slots = JobSlots::new(1);
    let held = slots
        .acquire(Instant::now() + Duration::from_secs(5))
        .unwrap();
    let err = slots
        .acquire(Instant::now() + Duration::from_millis(20))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    drop(held);
    assert!(
        slots
            .acquire(Instant::now() + Duration::from_millis(20))
            .is_ok()
    );
}

#[test]
fn closed_slots_refuse_work() {
    let slots = JobSlots::new(2);
    slots.close_and_drain();
    let err = slots
        .acquire(Instant::now() + Duration::from_secs(1))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Processing);
}

#[test]
fn image_job_walks_every_stage_in_order() {
    let pipeline = Pipeline::new(quiet_config()).unwrap();
    let opts = JobOptions::new(
        GridSpec::new(2, 1).unwrap(),
        AdaptationMethod::Stretch,
        QualityLevel::Low,
    );
    let out = pipeline.run(&JobRequest::new(png(40, 30), opts)).unwrap();
    assert!(!out.cache_hit);
    assert_eq!(
        out.stages,
        vec![
            JobStage::Validating,
            JobStage::Decoding,
            JobStage::Adapting,
            JobStage::Partitioning,
            JobStage::Normalizing,
            JobStage::CacheWriting,
            JobStage::Complete,
        ]
    );
    assert_eq!(out.artifacts().artifact_count(), 2);
}

#[test]
fn expired_deadline_fails_without_caching() {
    let pipeline = Pipeline::new(quiet_config()).unwrap();
    let opts = JobOptions::new(
        GridSpec::new(2, 2).unwrap(),
        AdaptationMethod::Pad,
        QualityLevel::High,
    );
    let req = JobRequest::new(png(64, 64), opts).with_timeout(Duration::ZERO);
    let err = pipeline.run(&req).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(pipeline.cache().stats().entries, 0);
}

#[test]
fn empty_source_is_processing_error() {
    let pipeline = Pipeline::new(quiet_config()).unwrap();
    let opts = JobOptions::new(
        GridSpec::new(1, 1).unwrap(),
        AdaptationMethod::Pad,
        QualityLevel::Low,
    );
    let err = pipeline.run(&JobRequest::new(Vec::new(), opts)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Processing);
}

#[test]
fn shutdown_refuses_new_jobs() {
    let pipeline = Pipeline::new(quiet_config()).unwrap();
    pipeline.shutdown();
    let opts = JobOptions::new(
        GridSpec::new(1, 1).unwrap(),
        AdaptationMethod::Pad,
        QualityLevel::Low,
    );
    assert!(pipeline.run(&JobRequest::new(png(8, 8), opts)).is_err());
}

#[test]
fn video_frames_keep_timestamp_and_tile_order() {
    use crate::foundation::core::{Channels, Rgba8};
    use crate::media::video::InMemoryVideo;

    let frames = (0..20u8)
        .map(|i| RasterFrame::filled(24, 16, Channels::Rgb8, Rgba8::rgb(i * 10, 0, 0)))
        .collect::<Vec<_>>();
    let video = InMemoryVideo::new(10.0, frames).unwrap();
    let pipeline = Pipeline::new(quiet_config()).unwrap();
    let opts = JobOptions::new(
        GridSpec::new(2, 1).unwrap(),
        AdaptationMethod::Pad,
        QualityLevel::Low,
    );

    let mut tracker = JobTracker::new(Duration::from_secs(60));
    tracker.enter(JobStage::Decoding).unwrap();
    let set = pipeline
        .compute_video(&video, &opts, &mut tracker)
        .unwrap();
    assert_eq!(tracker.stage(), JobStage::Normalizing);

    let ArtifactSet::Video { frames } = &set else {
        panic!("expected video artifacts");
    };
    // 2s at 2 Hz.
    let ts = frames.iter().map(|f| f.timestamp_sec).collect::<Vec<_>>();
    assert_eq!(ts, vec![0.0, 0.5, 1.0, 1.5]);
    for f in frames {
        assert_eq!(f.tiles.len(), 2);
    }
    assert_eq!(set.artifact_count(), 8);
}
