use super::*;
use crate::foundation::core::{AdaptationMethod, GridSpec, QualityLevel, Rgba8};

fn opts() -> JobOptions {
    JobOptions {
        grid: GridSpec::new(3, 2).unwrap(),
        method: AdaptationMethod::Pad,
        quality: QualityLevel::Medium,
        remove_background: false,
    }
}

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n rest of the image";
const MP4_MAGIC: &[u8] = b"\0\0\0\x20ftypisom rest of the video";

#[test]
fn identical_inputs_share_a_fingerprint() {
    let cfg = PipelineConfig::default();
    assert_eq!(
        job_fingerprint(PNG_MAGIC, &opts(), &cfg),
        job_fingerprint(PNG_MAGIC, &opts(), &cfg)
    );
}

#[test]
fn every_option_changes_the_fingerprint() {
    let cfg = PipelineConfig::default();
    let base = job_fingerprint(PNG_MAGIC, &opts(), &cfg);
    let variants = [
        JobOptions {
            grid: GridSpec::new(2, 3).unwrap(),
            ..opts()
        },
        JobOptions {
            method: AdaptationMethod::Crop,
            ..opts()
        },
        JobOptions {
            quality: QualityLevel::High,
            ..opts()
        },
        JobOptions {
            remove_background: true,
            ..opts()
        },
    ];
    for v in variants {
        assert_ne!(job_fingerprint(PNG_MAGIC, &v, &cfg), base, "{v:?}");
    }
    assert_ne!(job_fingerprint(b"\x89PNG\r\n\x1a\n other", &opts(), &cfg), base);
}

#[test]
fn output_affecting_config_changes_the_fingerprint() {
    let cfg = PipelineConfig::default();
    let base = job_fingerprint(PNG_MAGIC, &opts(), &cfg);

    let mut pad = cfg.clone();
    pad.pad_color = Rgba8::rgb(0, 0, 0);
    assert_ne!(job_fingerprint(PNG_MAGIC, &opts(), &pad), base);

    let mut bg = cfg.clone();
    bg.normalizer.background.tolerance += 1;
    assert_ne!(job_fingerprint(PNG_MAGIC, &opts(), &bg), base);

    let mut timeout = cfg.clone();
    timeout.timeout_ms = 5;
    assert_eq!(job_fingerprint(PNG_MAGIC, &opts(), &timeout), base);
}

#[test]
fn sampler_only_matters_for_video() {
    let cfg = PipelineConfig::default();
    let mut sampler = cfg.clone();
    sampler.sampler.max_frames = 3;

    assert_eq!(
        job_fingerprint(PNG_MAGIC, &opts(), &cfg),
        job_fingerprint(PNG_MAGIC, &opts(), &sampler)
    );
    assert_ne!(
        job_fingerprint(MP4_MAGIC, &opts(), &cfg),
        job_fingerprint(MP4_MAGIC, &opts(), &sampler)
    );
}

#[test]
fn hex_round_trips_and_rejects_garbage() {
    let fp = source_digest(b"hello");
    let hex = fp.to_hex();
    assert_eq!(hex.len(), 32);
    assert_eq!(hex.parse::<Fingerprint>().unwrap(), fp);
    assert!("xyz".parse::<Fingerprint>().is_err());
    assert!("g".repeat(32).parse::<Fingerprint>().is_err());
}
