//! Both engines, same requests, same output geometry.
//!
//! Every request in the grid runs through the software and the accelerated
//! engine from identical source bytes; the encoded results must agree on
//! dimensions and content type.

use iiif_engine::config::IiifConfig;
use iiif_engine::imaging::{
    Dimensions, EncodeOptions, EngineKind, Format, Image, TransformError, Transformation, codec,
};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frame, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

const REQUESTS: &[&str] = &[
    "full/max/0/default.jpg",
    "full/full/0/color.png",
    "square/max/0/default.png",
    "0,0,100,100/50,50/0/default.jpg",
    "10,20,150,90/max/0/default.png",
    "pct:10,10,50,50/max/0/default.png",
    "full/150,/0/default.png",
    "full/,50/0/default.png",
    "full/pct:25/0/default.webp",
    "full/!120,120/0/default.png",
    "full/^600,/0/default.png",
    "full/^pct:150/0/default.png",
    "full/max/90/default.png",
    "full/max/180/default.png",
    "full/max/270/default.png",
    "full/max/!0/default.png",
    "full/max/!90/gray.png",
    "full/max/45/default.png",
    "full/max/30/default.png",
    "0,0,120,80/60,/!200/bitonal.png",
    "full/100,/0/gray.jpg",
    "full/100,/0/bitonal.tif",
    "full/100,/0/dither.png",
    "full/64,/0/primitive:1,3,128.png",
    "full/80,/0/default.gif",
    "full/64,/0/primitive:2,3,128.gif",
];

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    }))
}

fn encode(img: &DynamicImage, format: Format) -> Vec<u8> {
    codec::encode_still(img, format, &EncodeOptions::default()).unwrap()
}

fn config(engine: EngineKind) -> IiifConfig {
    let mut config = IiifConfig::default();
    config.graphics.engine = engine;
    config
}

/// Transform `body` and return the encoded result with its content type.
fn run(engine: EngineKind, body: &[u8], request: &str) -> Result<(Vec<u8>, String), TransformError> {
    let mut image = Image::from_bytes(&config(engine), "src", body).unwrap();
    let transformation = Transformation::from_path(request)?;
    image.transform(&transformation)?;
    let out = image.body()?;
    Ok((out, image.content_type().to_string()))
}

fn animated_gif(frames: u8, width: u32, height: u32) -> Vec<u8> {
    let frames = (0..frames)
        .map(|i| Frame::new(RgbaImage::from_pixel(width, height, Rgba([i * 60, 0, 0, 255]))))
        .collect();
    codec::encode_frames(frames).unwrap()
}

fn gif_frame_count(body: &[u8]) -> usize {
    GifDecoder::new(Cursor::new(body))
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap()
        .len()
}

// =========================================================================
// Parity grid
// =========================================================================

#[test]
fn engines_agree_on_dimensions_and_content_type() {
    let source = encode(&gradient(300, 200), Format::Png);

    for request in REQUESTS {
        let (sw_body, sw_type) = run(EngineKind::Software, &source, request)
            .unwrap_or_else(|e| panic!("software failed on {request}: {e}"));
        let (acc_body, acc_type) = run(EngineKind::Accelerated, &source, request)
            .unwrap_or_else(|e| panic!("accelerated failed on {request}: {e}"));

        assert_eq!(sw_type, acc_type, "content type differs for {request}");
        assert_eq!(
            codec::dimensions_of(&sw_body).unwrap(),
            codec::dimensions_of(&acc_body).unwrap(),
            "dimensions differ for {request}"
        );
    }
}

#[test]
fn engines_agree_on_errors() {
    let source = encode(&gradient(300, 200), Format::Png);
    for request in [
        "400,0,10,10/max/0/default.png",
        "full/0,/0/default.png",
        "full/max/0/primitive:9,3,128.png",
        "full/max/0/primitive:1,3,999.png",
        "full/max/0/default.bmp",
        "full/max/0/default.svg",
        "full/^pct:1e12/0/default.png",
        "full/^70000,/0/default.png",
        "full/max/default.png",
        "full/max/0/default",
    ] {
        let sw = run(EngineKind::Software, &source, request);
        let acc = run(EngineKind::Accelerated, &source, request);
        assert!(sw.is_err() && acc.is_err(), "{request} should fail on both");
        assert_eq!(
            std::mem::discriminant(&sw.unwrap_err()),
            std::mem::discriminant(&acc.unwrap_err()),
            "error kind differs for {request}"
        );
    }
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn identity_request_on_jpeg() {
    let source = encode(&gradient(300, 200), Format::Jpeg);
    for engine in EngineKind::ALL {
        let (body, content_type) = run(engine, &source, "full/max/0/default.jpg").unwrap();
        assert_eq!(content_type, "image/jpeg");
        assert_eq!(codec::dimensions_of(&body).unwrap(), Dimensions::new(300, 200));
    }
}

#[test]
fn oversized_upscale_fails_without_allocating() {
    let source = encode(&gradient(10, 10), Format::Png);
    for engine in EngineKind::ALL {
        for request in ["full/^pct:1e12/0/default.png", "full/^70000,/0/default.png"] {
            assert!(
                matches!(run(engine, &source, request), Err(TransformError::InvalidSize(_))),
                "{engine}: {request}"
            );
        }
    }
}

#[test]
fn whole_image_region_returns_source_bytes_on_accelerated() {
    let source = encode(&gradient(300, 200), Format::Jpeg);
    for request in [
        "0,0,300,200/max/0/default.jpg",
        "pct:0,0,100,100/max/0/default.jpg",
        "0,0,9999,9999/max/0/default.jpg",
        "full/300,/0/default.jpg",
        "full/600,/0/default.jpg",
    ] {
        let (body, _) = run(EngineKind::Accelerated, &source, request).unwrap();
        assert_eq!(body, source, "{request} should not re-encode");
    }
}

#[test]
fn crop_then_exact_size() {
    let source = encode(&gradient(300, 200), Format::Jpeg);
    for engine in EngineKind::ALL {
        let (body, _) = run(engine, &source, "0,0,100,100/50,50/0/default.jpg").unwrap();
        assert_eq!(codec::dimensions_of(&body).unwrap(), Dimensions::new(50, 50));
    }
}

#[test]
fn bitonal_has_exactly_two_levels() {
    let source = encode(&gradient(120, 80), Format::Png);
    for engine in EngineKind::ALL {
        let (body, _) = run(engine, &source, "full/max/0/bitonal.png").unwrap();
        let (img, _) = codec::decode_still(&body).unwrap();
        let luma = img.to_luma8();
        assert!(
            luma.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255),
            "{engine}: bitonal output has intermediate values"
        );
        assert!(luma.pixels().any(|p| p.0[0] == 0));
        assert!(luma.pixels().any(|p| p.0[0] == 255));
    }
}

#[test]
fn dither_has_exactly_two_levels() {
    let source = encode(&gradient(64, 64), Format::Png);
    for engine in EngineKind::ALL {
        let (body, _) = run(engine, &source, "full/max/0/dither.png").unwrap();
        let (img, _) = codec::decode_still(&body).unwrap();
        assert!(img.to_luma8().pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}

#[test]
fn gif_target_decodes_as_gif() {
    let source = encode(&gradient(60, 40), Format::Png);
    for engine in EngineKind::ALL {
        let (body, content_type) = run(engine, &source, "full/30,/0/default.gif").unwrap();
        assert_eq!(content_type, "image/gif");
        assert_eq!(codec::sniff(&body).unwrap(), Format::Gif);
        assert_eq!(codec::dimensions_of(&body).unwrap(), Dimensions::new(30, 20));
    }
}

#[test]
fn animated_primitive_output_has_multiple_frames() {
    let source = encode(&gradient(40, 40), Format::Png);
    for engine in EngineKind::ALL {
        let (body, content_type) =
            run(engine, &source, "full/max/0/primitive:1,4,128.gif").unwrap();
        assert_eq!(content_type, "image/gif");
        assert!(gif_frame_count(&body) > 1, "{engine}: expected an animation");
    }
}

#[test]
fn animated_source_stays_animated_on_software() {
    let source = animated_gif(3, 40, 30);
    let (body, _) = run(EngineKind::Software, &source, "full/20,/0/default.gif").unwrap();
    assert_eq!(gif_frame_count(&body), 3);
    assert_eq!(codec::dimensions_of(&body).unwrap(), Dimensions::new(20, 15));
}

#[test]
fn animated_source_to_still_format() {
    let source = animated_gif(3, 40, 30);
    for engine in EngineKind::ALL {
        let (body, content_type) = run(engine, &source, "full/max/0/default.png").unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(codec::dimensions_of(&body).unwrap(), Dimensions::new(40, 30));
    }
}

#[test]
fn conversion_chain_keeps_dimensions() {
    for engine in EngineKind::ALL {
        let mut image =
            Image::from_bytes(&config(engine), "src", &encode(&gradient(90, 70), Format::Jpeg))
                .unwrap();
        for format in ["png", "webp", "jpg"] {
            let request = format!("full/max/0/default.{format}");
            image
                .transform(&Transformation::from_path(&request).unwrap())
                .unwrap();
            let body = image.body().unwrap();
            image.update(&body).unwrap();
        }
        assert_eq!(image.format(), "jpg");
        assert_eq!(image.dimensions().unwrap(), Dimensions::new(90, 70));
    }
}

#[test]
fn jpeg_quality_setting_changes_output_size() {
    let source = encode(&gradient(200, 200), Format::Png);
    let request = Transformation::from_path("full/max/0/default.jpg").unwrap();

    let size_at = |quality: u32| {
        let mut config = IiifConfig::default();
        config.images.jpeg_quality = quality;
        let mut image = Image::from_bytes(&config, "src", &source).unwrap();
        image.transform(&request).unwrap();
        image.body().unwrap().len()
    };

    assert!(size_at(20) < size_at(95));
}
