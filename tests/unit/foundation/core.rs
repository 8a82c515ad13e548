use super::*;
use crate::foundation::error::ErrorKind;

#[test]
fn grid_spec_accepts_full_range() {
    for x in 1..=20 {
        for y in [1, 7, 20] {
            let g = GridSpec::new(x, y).unwrap();
            assert_eq!(g.cells(), (x * y) as usize);
        }
    }
}

#[test]
fn grid_spec_rejects_out_of_range_as_configuration() {
    for (x, y) in [(0, 1), (1, 0), (21, 1), (25, 3), (3, 21)] {
        let err = GridSpec::new(x, y).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}

#[test]
fn grid_spec_parses_from_str() {
    assert_eq!("3x2".parse::<GridSpec>().unwrap(), GridSpec::new(3, 2).unwrap());
    assert_eq!(" 4X4 ".parse::<GridSpec>().unwrap(), GridSpec::new(4, 4).unwrap());
    assert_eq!("5*1".parse::<GridSpec>().unwrap(), GridSpec::new(5, 1).unwrap());
    assert!("3".parse::<GridSpec>().is_err());
    assert!("ax2".parse::<GridSpec>().is_err());
    assert!("25x1".parse::<GridSpec>().is_err());
}

#[test]
fn grid_spec_serde_validates() {
    let g: GridSpec = serde_json::from_str(r#"{"x":3,"y":2}"#).unwrap();
    assert_eq!((g.x(), g.y()), (3, 2));
    assert!(serde_json::from_str::<GridSpec>(r#"{"x":25,"y":2}"#).is_err());
    assert_eq!(serde_json::to_string(&g).unwrap(), r#"{"x":3,"y":2}"#);
}

#[test]
fn method_and_quality_parse_exhaustively() {
    assert_eq!("PAD".parse::<AdaptationMethod>().unwrap(), AdaptationMethod::Pad);
    assert_eq!(
        "stretch".parse::<AdaptationMethod>().unwrap(),
        AdaptationMethod::Stretch
    );
    assert_eq!("crop".parse::<AdaptationMethod>().unwrap(), AdaptationMethod::Crop);
    let err = "fit".parse::<AdaptationMethod>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    assert_eq!("high".parse::<QualityLevel>().unwrap(), QualityLevel::High);
    assert!("ultra".parse::<QualityLevel>().is_err());
    assert!(!QualityLevel::Low.enhances());
    assert!(QualityLevel::Medium.enhances());
    assert!(serde_json::from_str::<AdaptationMethod>(r#""zoom""#).is_err());
}

#[test]
fn raster_frame_validates_length() {
    assert!(RasterFrame::new(2, 2, Channels::Rgb8, vec![0; 12]).is_ok());
    assert!(RasterFrame::new(2, 2, Channels::Rgba8, vec![0; 12]).is_err());
}

#[test]
fn crop_copies_expected_region() {
    let data: Vec<u8> = (0..4 * 3 * 3).map(|v| v as u8).collect();
    let f = RasterFrame::new(4, 3, Channels::Rgb8, data).unwrap();
    let c = f.crop(1, 1, 2, 2);
    assert_eq!((c.width, c.height), (2, 2));
    assert_eq!(c.pixel(0, 0), f.pixel(1, 1));
    assert_eq!(c.pixel(1, 1), f.pixel(2, 2));
}

#[test]
fn rgba_round_trip_through_image_buffer() {
    let f = RasterFrame::filled(3, 2, Channels::Rgb8, Rgba8::rgb(10, 20, 30));
    let img = f.clone().into_rgba_image().unwrap();
    assert_eq!(img.get_pixel(2, 1).0, [10, 20, 30, 255]);
    let back = RasterFrame::from_rgba_image(img, Channels::Rgb8);
    assert_eq!(back, f);
}
