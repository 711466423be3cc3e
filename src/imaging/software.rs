//! Software engine: every operation works on a fully decoded raster.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode / encode | [`codec`](super::codec) (`image` crate) |
//! | Crop | `DynamicImage::crop_imm` |
//! | Resize | `DynamicImage::resize_exact` with `Triangle` (bilinear) |
//! | Flip | `DynamicImage::fliph` |
//! | Rotate | `rotate90/180/270`, bilinear inverse mapping for other angles |
//! | Gray | `DynamicImage::grayscale` |
//! | Bitonal | luma threshold |
//!
//! Animated GIF sources keep every frame; each operation is applied per
//! frame.

use super::backend::{
    DecodeError, Dimensions, EncodeError, EngineKind, ImageEngine, RasterFilter, TransformError,
};
use super::calculations::{right_angle, rotated_bounds, target_dimensions};
use super::codec;
use super::format::Format;
use super::params::EncodeOptions;
use super::transformation::{RegionInstruction, SizeInstruction};
use image::imageops::FilterType;
use image::{DynamicImage, Frame, GrayImage, Rgba, RgbaImage};
use tracing::debug;

/// Decoded payload.
enum Raster {
    Still(DynamicImage),
    /// Two or more full-canvas RGBA frames.
    Animated(Vec<Frame>),
}

pub struct SoftwareEngine {
    raster: Raster,
    format: Format,
    options: EncodeOptions,
}

impl SoftwareEngine {
    /// Decode `body` into a new engine.
    pub fn from_bytes(body: &[u8], options: EncodeOptions) -> Result<Self, DecodeError> {
        let (raster, format) = decode(body)?;
        Ok(Self {
            raster,
            format,
            options,
        })
    }

    /// Wrap an already decoded raster, tagged as `format`.
    pub fn from_raster(raster: DynamicImage, format: Format, options: EncodeOptions) -> Self {
        Self {
            raster: Raster::Still(raster),
            format,
            options,
        }
    }

    pub fn frame_count(&self) -> usize {
        match &self.raster {
            Raster::Still(_) => 1,
            Raster::Animated(frames) => frames.len(),
        }
    }

    /// Apply `op` to the still raster or to every frame.
    fn apply<F>(&mut self, mut op: F) -> Result<(), TransformError>
    where
        F: FnMut(DynamicImage) -> Result<DynamicImage, TransformError>,
    {
        self.raster = match std::mem::replace(&mut self.raster, Raster::Animated(Vec::new())) {
            Raster::Still(img) => Raster::Still(op(img)?),
            Raster::Animated(frames) => {
                let frames = frames
                    .into_iter()
                    .map(|frame| {
                        let (left, top, delay) = (frame.left(), frame.top(), frame.delay());
                        let img = op(DynamicImage::ImageRgba8(frame.into_buffer()))?;
                        Ok(Frame::from_parts(img.to_rgba8(), left, top, delay))
                    })
                    .collect::<Result<Vec<_>, TransformError>>()?;
                Raster::Animated(frames)
            }
        };
        Ok(())
    }
}

fn decode(body: &[u8]) -> Result<(Raster, Format), DecodeError> {
    let format = codec::sniff(body)?;
    if format == Format::Gif {
        let mut frames = codec::decode_frames(body)?;
        if frames.len() > 1 {
            debug!(frames = frames.len(), "decoded animated gif");
            return Ok((Raster::Animated(frames), format));
        }
        if let Some(frame) = frames.pop() {
            return Ok((
                Raster::Still(DynamicImage::ImageRgba8(frame.into_buffer())),
                format,
            ));
        }
    }
    let (img, format) = codec::decode_still(body)?;
    Ok((Raster::Still(img), format))
}

impl ImageEngine for SoftwareEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Software
    }

    fn format(&self) -> Format {
        self.format
    }

    fn dimensions(&self) -> Result<Dimensions, DecodeError> {
        match &self.raster {
            Raster::Still(img) => Ok(Dimensions::new(img.width(), img.height())),
            Raster::Animated(frames) => frames
                .first()
                .map(|f| {
                    let (w, h) = f.buffer().dimensions();
                    Dimensions::new(w, h)
                })
                .ok_or_else(|| DecodeError::Malformed {
                    format: self.format.tag().to_string(),
                    reason: "animation has no frames".into(),
                }),
        }
    }

    fn update(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        let (raster, format) = decode(body)?;
        self.raster = raster;
        self.format = format;
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        match &self.raster {
            Raster::Still(img) => codec::encode_still(img, self.format, &self.options),
            Raster::Animated(frames) if self.format == Format::Gif => {
                codec::encode_frames(frames.clone())
            }
            Raster::Animated(frames) => match frames.first() {
                Some(first) => codec::encode_still(
                    &DynamicImage::ImageRgba8(first.buffer().clone()),
                    self.format,
                    &self.options,
                ),
                None => Err(EncodeError::Failed {
                    format: self.format.tag().to_string(),
                    reason: "animation has no frames".into(),
                }),
            },
        }
    }

    fn crop(&mut self, region: &RegionInstruction) -> Result<(), TransformError> {
        let dims = self.dimensions()?;
        if region.width == 0
            || region.height == 0
            || region.x.saturating_add(region.width) > dims.width
            || region.y.saturating_add(region.height) > dims.height
        {
            return Err(TransformError::InvalidRegion(format!(
                "{}x{}+{}+{} does not fit a {dims} image",
                region.width, region.height, region.x, region.y
            )));
        }
        let r = *region;
        self.apply(|img| Ok(img.crop_imm(r.x, r.y, r.width, r.height)))
    }

    fn resize(&mut self, size: &SizeInstruction) -> Result<(), TransformError> {
        let current = self.dimensions()?;
        let target = target_dimensions(current, size);
        if target == current {
            return Ok(());
        }
        self.apply(|img| Ok(img.resize_exact(target.width, target.height, FilterType::Triangle)))
    }

    fn flip_horizontal(&mut self) -> Result<(), TransformError> {
        self.apply(|img| Ok(img.fliph()))
    }

    fn rotate(&mut self, angle: f64) -> Result<(), TransformError> {
        let dims = self.dimensions()?;
        let bounds = rotated_bounds(dims, angle).ok_or_else(|| {
            TransformError::RotationFailure(format!("cannot rotate a {dims} image by {angle}"))
        })?;
        match right_angle(angle) {
            Some(90) => self.apply(|img| Ok(img.rotate90())),
            Some(180) => self.apply(|img| Ok(img.rotate180())),
            Some(_) => self.apply(|img| Ok(img.rotate270())),
            None if bounds == dims => Ok(()),
            None => self.apply(|img| Ok(rotate_bilinear(&img, angle, bounds))),
        }
    }

    fn desaturate(&mut self) -> Result<(), TransformError> {
        self.apply(|img| Ok(img.grayscale()))
    }

    fn threshold(&mut self, cut: u8) -> Result<(), TransformError> {
        self.apply(|img| Ok(DynamicImage::ImageLuma8(threshold_luma(&img, cut))))
    }

    fn convert(&mut self, format: Format) -> Result<(), TransformError> {
        if format == self.format {
            return Ok(());
        }
        let raster = match std::mem::replace(&mut self.raster, Raster::Animated(Vec::new())) {
            Raster::Animated(frames) if format == Format::Gif => Raster::Animated(frames),
            Raster::Animated(frames) => {
                let first = frames.into_iter().next().ok_or_else(|| {
                    TransformError::ProcessingFailed("animation has no frames".into())
                })?;
                let img = DynamicImage::ImageRgba8(first.into_buffer());
                Raster::Still(codec::round_trip(&img, format, &self.options)?)
            }
            Raster::Still(img) => Raster::Still(codec::round_trip(&img, format, &self.options)?),
        };
        self.raster = raster;
        self.format = format;
        Ok(())
    }

    fn raster(&mut self) -> Result<DynamicImage, TransformError> {
        match &self.raster {
            Raster::Still(img) => Ok(img.clone()),
            Raster::Animated(frames) => frames
                .first()
                .map(|f| DynamicImage::ImageRgba8(f.buffer().clone()))
                .ok_or_else(|| TransformError::ProcessingFailed("animation has no frames".into())),
        }
    }

    fn replace_raster(&mut self, raster: DynamicImage) -> Result<(), TransformError> {
        self.raster = Raster::Still(raster);
        Ok(())
    }

    fn map_raster(&mut self, filter: RasterFilter<'_>) -> Result<(), TransformError> {
        self.apply(|img| Ok(filter(img)))
    }
}

/// Two-tone luma: at or above `cut` is white, below is black.
pub(crate) fn threshold_luma(img: &DynamicImage, cut: u8) -> GrayImage {
    let mut luma = img.to_luma8();
    for pixel in luma.pixels_mut() {
        pixel.0[0] = if pixel.0[0] >= cut { 255 } else { 0 };
    }
    luma
}

/// Rotate clockwise by `angle` degrees onto a `bounds` canvas.
///
/// Inverse mapping: each output pixel centre is rotated back into source
/// space and sampled bilinearly. Samples outside the source are transparent.
fn rotate_bilinear(img: &DynamicImage, angle: f64, bounds: Dimensions) -> DynamicImage {
    let src = img.to_rgba8();
    let (sw, sh) = (src.width() as f64, src.height() as f64);
    let (sin, cos) = angle.to_radians().sin_cos();
    let (half_ow, half_oh) = (bounds.width as f64 / 2.0, bounds.height as f64 / 2.0);

    let out = RgbaImage::from_fn(bounds.width, bounds.height, |ox, oy| {
        let dx = ox as f64 + 0.5 - half_ow;
        let dy = oy as f64 + 0.5 - half_oh;
        let sx = dx * cos + dy * sin + sw / 2.0 - 0.5;
        let sy = -dx * sin + dy * cos + sh / 2.0 - 0.5;
        sample_bilinear(&src, sx, sy)
    });
    DynamicImage::ImageRgba8(out)
}

fn sample_bilinear(src: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let (x0, y0) = (x.floor() as i64, y.floor() as i64);
    let (fx, fy) = (x - x0 as f64, y - y0 as f64);

    let texel = |px: i64, py: i64| -> [f64; 4] {
        if px < 0 || py < 0 || px >= w || py >= h {
            return [0.0; 4];
        }
        let p = src.get_pixel(px as u32, py as u32).0;
        [p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64]
    };

    let (a, b) = (texel(x0, y0), texel(x0 + 1, y0));
    let (c, d) = (texel(x0, y0 + 1), texel(x0 + 1, y0 + 1));
    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = a[i] + (b[i] - a[i]) * fx;
        let bottom = c[i] + (d[i] - c[i]) * fx;
        out[i] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn engine(width: u32, height: u32) -> SoftwareEngine {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255])
        });
        SoftwareEngine::from_raster(
            DynamicImage::ImageRgba8(img),
            Format::Png,
            EncodeOptions::default(),
        )
    }

    fn animated_gif(frames: u8, width: u32, height: u32) -> Vec<u8> {
        let frames = (0..frames)
            .map(|i| Frame::new(RgbaImage::from_pixel(width, height, Rgba([i * 60, 0, 0, 255]))))
            .collect();
        codec::encode_frames(frames).unwrap()
    }

    #[test]
    fn crop_changes_dimensions() {
        let mut e = engine(300, 200);
        e.crop(&RegionInstruction {
            x: 10,
            y: 10,
            width: 100,
            height: 50,
        })
        .unwrap();
        assert_eq!(e.dimensions().unwrap(), Dimensions::new(100, 50));
    }

    #[test]
    fn crop_outside_bounds_is_invalid_region() {
        let mut e = engine(30, 20);
        let err = e.crop(&RegionInstruction {
            x: 25,
            y: 0,
            width: 10,
            height: 10,
        });
        assert!(matches!(err, Err(TransformError::InvalidRegion(_))));
    }

    #[test]
    fn resize_respects_no_enlarge() {
        let mut e = engine(300, 200);
        e.resize(&SizeInstruction {
            width: 600,
            height: 400,
            enlarge: false,
            force: false,
        })
        .unwrap();
        assert_eq!(e.dimensions().unwrap(), Dimensions::new(300, 200));
    }

    #[test]
    fn resize_forced_is_exact() {
        let mut e = engine(300, 200);
        e.resize(&SizeInstruction {
            width: 50,
            height: 50,
            enlarge: false,
            force: true,
        })
        .unwrap();
        assert_eq!(e.dimensions().unwrap(), Dimensions::new(50, 50));
    }

    #[test]
    fn rotate_grows_canvas_to_bounds() {
        let mut e = engine(100, 100);
        e.rotate(45.0).unwrap();
        assert_eq!(e.dimensions().unwrap(), Dimensions::new(142, 142));

        let mut e = engine(300, 200);
        e.rotate(90.0).unwrap();
        assert_eq!(e.dimensions().unwrap(), Dimensions::new(200, 300));
    }

    #[test]
    fn rotated_corners_are_transparent() {
        let mut e = engine(40, 40);
        e.rotate(45.0).unwrap();
        let img = e.raster().unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        let (cx, cy) = (img.width() / 2, img.height() / 2);
        assert_eq!(img.get_pixel(cx, cy).0[3], 255);
    }

    #[test]
    fn quarter_turn_moves_top_left_to_top_right() {
        let mut img = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let mut e = SoftwareEngine::from_raster(
            DynamicImage::ImageRgba8(img),
            Format::Png,
            EncodeOptions::default(),
        );
        e.rotate(90.0).unwrap();
        let out = e.raster().unwrap().to_rgba8();
        assert_eq!(out.get_pixel(1, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn threshold_produces_two_levels() {
        let gradient = GrayImage::from_fn(256, 4, |x, _| Luma([x as u8]));
        let mut e = SoftwareEngine::from_raster(
            DynamicImage::ImageLuma8(gradient),
            Format::Png,
            EncodeOptions::default(),
        );
        e.threshold(160).unwrap();
        let out = e.raster().unwrap().to_luma8();
        assert_eq!(out.get_pixel(159, 0).0[0], 0);
        assert_eq!(out.get_pixel(160, 0).0[0], 255);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn convert_updates_format_with_payload() {
        let mut e = engine(20, 10);
        e.convert(Format::Jpeg).unwrap();
        assert_eq!(e.format(), Format::Jpeg);
        assert!(!e.raster().unwrap().color().has_alpha());
        let body = e.encode().unwrap();
        assert_eq!(codec::sniff(&body).unwrap(), Format::Jpeg);
    }

    #[test]
    fn animated_gif_keeps_frames_through_operations() {
        let mut e = SoftwareEngine::from_bytes(&animated_gif(3, 40, 20), EncodeOptions::default())
            .unwrap();
        assert_eq!(e.format(), Format::Gif);
        assert_eq!(e.frame_count(), 3);

        e.resize(&SizeInstruction {
            width: 20,
            height: 10,
            enlarge: false,
            force: true,
        })
        .unwrap();
        assert_eq!(e.frame_count(), 3);
        assert_eq!(e.dimensions().unwrap(), Dimensions::new(20, 10));

        let decoded = codec::decode_frames(&e.encode().unwrap()).unwrap();
        assert_eq!(decoded.len(), 3);
    }

    #[test]
    fn animated_to_still_keeps_first_frame() {
        let mut e = SoftwareEngine::from_bytes(&animated_gif(2, 8, 8), EncodeOptions::default())
            .unwrap();
        e.convert(Format::Png).unwrap();
        assert_eq!(e.frame_count(), 1);
        assert_eq!(e.format(), Format::Png);
    }

    #[test]
    fn update_replaces_payload_and_format() {
        let mut e = engine(10, 10);
        e.update(&animated_gif(2, 5, 6)).unwrap();
        assert_eq!(e.format(), Format::Gif);
        assert_eq!(e.dimensions().unwrap(), Dimensions::new(5, 6));
    }

    #[test]
    fn update_with_garbage_fails() {
        let mut e = engine(10, 10);
        assert!(e.update(b"nope").is_err());
        assert_eq!(e.format(), Format::Png);
    }
}
