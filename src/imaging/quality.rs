//! Custom quality pass: `dither` and `primitive:<mode>,<iterations>,<alpha>`.
//!
//! Runs after the standard pipeline steps, through the [`ImageEngine`] raster
//! hooks only, so both engines share it unchanged.

use super::backend::{ImageEngine, TransformError};
use super::codec;
use super::dither;
use super::format::Format;
use super::params::PrimitiveParams;
use super::primitive;
use super::transformation::Quality;
use image::{DynamicImage, Frame};
use tracing::debug;

/// What the custom pass did that later steps need to know about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CustomQualityResult {
    /// The payload is already the final animated encoding.
    pub is_animated_output: bool,
}

/// Apply the custom quality named by `quality`, if any.
///
/// `target` is the resolved output format; an animated target switches the
/// primitive stylization to its per-frame variant.
pub fn apply_custom_quality(
    engine: &mut dyn ImageEngine,
    quality: &Quality,
    target: Format,
    max_iterations: i64,
) -> Result<CustomQualityResult, TransformError> {
    match quality {
        Quality::Dither => {
            debug!("dithering");
            engine.map_raster(&mut |img: DynamicImage| {
                DynamicImage::ImageLuma8(dither::dither(&img))
            })?;
            Ok(CustomQualityResult::default())
        }
        Quality::Primitive(raw) => {
            let params = PrimitiveParams::parse(raw, max_iterations)?;
            let img = engine.raster()?;
            debug!(?params, animated = target.is_animated(), "primitive stylization");

            if target.is_animated() {
                let frames = primitive::render_frames(&img, &params)
                    .into_iter()
                    .map(|frame| Frame::new(DynamicImage::ImageRgb8(frame).to_rgba8()))
                    .collect();
                let body = codec::encode_frames(frames)?;
                engine.update(&body)?;
                return Ok(CustomQualityResult {
                    is_animated_output: true,
                });
            }

            engine.replace_raster(primitive::render(&img, &params))?;
            Ok(CustomQualityResult::default())
        }
        Quality::Default | Quality::Color | Quality::Gray | Quality::Bitonal => {
            Ok(CustomQualityResult::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockEngine, RecordedOp};

    #[test]
    fn standard_qualities_do_nothing() {
        for quality in [Quality::Default, Quality::Color, Quality::Gray, Quality::Bitonal] {
            let mut engine = MockEngine::new(10, 10, Format::Png);
            let result = apply_custom_quality(&mut engine, &quality, Format::Png, 0).unwrap();
            assert!(!result.is_animated_output);
            assert!(engine.get_operations().is_empty());
        }
    }

    #[test]
    fn dither_maps_the_raster() {
        let mut engine = MockEngine::new(10, 10, Format::Png);
        let result = apply_custom_quality(&mut engine, &Quality::Dither, Format::Png, 0).unwrap();
        assert!(!result.is_animated_output);
        assert_eq!(engine.get_operations(), vec![RecordedOp::MapRaster]);
    }

    #[test]
    fn primitive_still_replaces_the_raster() {
        let mut engine = MockEngine::new(16, 16, Format::Png);
        let quality = Quality::Primitive("2,3,128".into());
        let result = apply_custom_quality(&mut engine, &quality, Format::Png, 10).unwrap();
        assert!(!result.is_animated_output);
        assert_eq!(engine.get_operations(), vec![RecordedOp::ReplaceRaster]);
    }

    #[test]
    fn primitive_animated_updates_payload() {
        let mut engine = MockEngine::new(16, 16, Format::Png);
        let quality = Quality::Primitive("4,3,0".into());
        let result = apply_custom_quality(&mut engine, &quality, Format::Gif, 0).unwrap();
        assert!(result.is_animated_output);
        assert_eq!(engine.get_operations(), vec![RecordedOp::Update]);
        assert_eq!(engine.format(), Format::Gif);
    }

    #[test]
    fn primitive_limits_are_enforced_before_touching_pixels() {
        let mut engine = MockEngine::new(16, 16, Format::Png);
        let over = Quality::Primitive("1,11,128".into());
        assert!(matches!(
            apply_custom_quality(&mut engine, &over, Format::Png, 10),
            Err(TransformError::InvalidQualityParameter(_))
        ));
        let alpha = Quality::Primitive("1,5,300".into());
        assert!(matches!(
            apply_custom_quality(&mut engine, &alpha, Format::Png, 10),
            Err(TransformError::InvalidQualityParameter(_))
        ));
        assert!(engine.get_operations().is_empty());
    }

    #[test]
    fn primitive_accepts_boundaries() {
        let mut engine = MockEngine::new(8, 8, Format::Png);
        let quality = Quality::Primitive("1,10,255".into());
        assert!(apply_custom_quality(&mut engine, &quality, Format::Png, 10).is_ok());
    }
}
