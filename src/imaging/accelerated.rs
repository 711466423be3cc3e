//! Accelerated engine: an encoded buffer plus one batched processing call.
//!
//! Primitive operations are not applied as they arrive. They are staged into
//! a [`ProcessOptions`] batch and executed together by
//! [`commit`](ImageEngine::commit): one decode, one SIMD crop+resize, flip,
//! rotate, interpretation and one encode. Between operations the payload
//! stays encoded, so [`format`](ImageEngine::format) is always sniffed from
//! real bytes.
//!
//! ## Crate mapping
//!
//! | Stage | Crate / function |
//! |---|---|
//! | Crop + resize | `fast_image_resize` (`Convolution(Bilinear)`, crop box in `ResizeOptions`) |
//! | Flip | `DynamicImage::fliph` |
//! | Rotate | `rotate90/180/270`, `imageproc::geometric_transformations::warp_into` otherwise |
//! | Gray / bitonal | `DynamicImage::grayscale` / luma threshold |
//! | Encode | [`codec`](super::codec) |
//!
//! The batch cannot produce animated output: a GIF target is staged as PNG
//! and packaged afterwards by [`ImageEngine::reconcile_animated`].

use super::backend::{
    DecodeError, Dimensions, EncodeError, EngineKind, ImageEngine, RasterFilter, TransformError,
};
use super::calculations::{right_angle, rotated_bounds, target_dimensions};
use super::codec;
use super::format::Format;
use super::params::EncodeOptions;
use super::software::{SoftwareEngine, threshold_luma};
use super::transformation::{RegionInstruction, SizeInstruction};
use fast_image_resize as fr;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, info};

/// Canonical order of the stages inside one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Crop,
    Resize,
    Flip,
    Rotate,
    Interpretation,
    Output,
}

/// Colour interpretation applied after geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interpretation {
    #[default]
    Color,
    Gray,
    /// Two-tone at the given luma cut.
    Bitonal(u8),
}

/// One batch of staged operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOptions {
    pub crop: Option<RegionInstruction>,
    /// Resolved output size after the crop.
    pub resize: Option<Dimensions>,
    pub flip: bool,
    /// Clockwise degrees; `0.0` means no rotation.
    pub rotate: f64,
    pub interpretation: Interpretation,
    pub output: Option<Format>,
    last: Option<Stage>,
}

impl ProcessOptions {
    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    /// Dimensions after applying the batch to an image of size `base`.
    fn project(&self, base: Dimensions) -> Dimensions {
        let mut dims = base;
        if let Some(region) = self.crop {
            dims = Dimensions::new(region.width, region.height);
        }
        if let Some(size) = self.resize {
            dims = size;
        }
        if self.rotate != 0.0 {
            dims = rotated_bounds(dims, self.rotate).unwrap_or(dims);
        }
        dims
    }
}

/// Formats the batch can encode directly; anything animated lands as PNG.
fn native_output(format: Format) -> Format {
    if format.is_animated() {
        Format::Png
    } else {
        format
    }
}

pub struct AcceleratedEngine {
    buffer: Vec<u8>,
    format: Format,
    options: EncodeOptions,
    pending: ProcessOptions,
}

impl AcceleratedEngine {
    /// Wrap encoded `body`. Only the header is inspected.
    pub fn from_bytes(body: &[u8], options: EncodeOptions) -> Result<Self, DecodeError> {
        let format = codec::sniff(body)?;
        codec::dimensions_of(body)?;
        Ok(Self {
            buffer: body.to_vec(),
            format,
            options,
            pending: ProcessOptions::default(),
        })
    }

    /// Operations staged but not yet committed.
    pub fn pending(&self) -> &ProcessOptions {
        &self.pending
    }

    /// Flush the batch first when `stage` would run out of canonical order.
    fn stage(&mut self, stage: Stage) -> Result<(), TransformError> {
        if self.pending.last.is_some_and(|last| stage <= last) {
            self.commit()?;
        }
        self.pending.last = Some(stage);
        Ok(())
    }

    /// Execute `batch` against the current buffer.
    fn run(&self, batch: &ProcessOptions) -> Result<(Vec<u8>, Format), TransformError> {
        let (img, _) = codec::decode_still(&self.buffer)?;
        let img = process(img, batch)?;
        let output = native_output(batch.output.unwrap_or(self.format));
        let body = codec::encode_still(&img, output, &self.options)?;
        Ok((body, output))
    }

    fn store_raster(&mut self, raster: &DynamicImage) -> Result<(), TransformError> {
        let output = native_output(self.format);
        self.buffer = codec::encode_still(raster, output, &self.options)?;
        self.format = output;
        Ok(())
    }
}

impl ImageEngine for AcceleratedEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Accelerated
    }

    fn format(&self) -> Format {
        match (self.pending.is_empty(), self.pending.output) {
            (true, _) => self.format,
            (false, Some(output)) => native_output(output),
            (false, None) => native_output(self.format),
        }
    }

    fn dimensions(&self) -> Result<Dimensions, DecodeError> {
        let base = codec::dimensions_of(&self.buffer)?;
        Ok(self.pending.project(base))
    }

    fn update(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        let format = codec::sniff(body)?;
        codec::dimensions_of(body)?;
        self.buffer = body.to_vec();
        self.format = format;
        self.pending = ProcessOptions::default();
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.pending.is_empty() {
            return Ok(self.buffer.clone());
        }
        self.run(&self.pending)
            .map(|(body, _)| body)
            .map_err(|e| EncodeError::Failed {
                format: self.format().tag().to_string(),
                reason: e.to_string(),
            })
    }

    fn crop(&mut self, region: &RegionInstruction) -> Result<(), TransformError> {
        self.stage(Stage::Crop)?;
        let dims = self.dimensions()?;
        if region.width == 0
            || region.height == 0
            || region.x.saturating_add(region.width) > dims.width
            || region.y.saturating_add(region.height) > dims.height
        {
            self.pending.last = None;
            return Err(TransformError::InvalidRegion(format!(
                "{}x{}+{}+{} does not fit a {dims} image",
                region.width, region.height, region.x, region.y
            )));
        }
        self.pending.crop = Some(*region);
        Ok(())
    }

    fn resize(&mut self, size: &SizeInstruction) -> Result<(), TransformError> {
        let current = self.dimensions()?;
        let target = target_dimensions(current, size);
        if target == current {
            return Ok(());
        }
        self.stage(Stage::Resize)?;
        self.pending.resize = Some(target);
        Ok(())
    }

    fn flip_horizontal(&mut self) -> Result<(), TransformError> {
        self.stage(Stage::Flip)?;
        self.pending.flip = true;
        Ok(())
    }

    fn rotate(&mut self, angle: f64) -> Result<(), TransformError> {
        self.stage(Stage::Rotate)?;
        let dims = self.dimensions()?;
        if rotated_bounds(dims, angle).is_none() {
            return Err(TransformError::RotationFailure(format!(
                "cannot rotate a {dims} image by {angle}"
            )));
        }
        self.pending.rotate = angle;
        Ok(())
    }

    fn desaturate(&mut self) -> Result<(), TransformError> {
        self.stage(Stage::Interpretation)?;
        self.pending.interpretation = Interpretation::Gray;
        Ok(())
    }

    fn threshold(&mut self, cut: u8) -> Result<(), TransformError> {
        self.stage(Stage::Interpretation)?;
        self.pending.interpretation = Interpretation::Bitonal(cut);
        Ok(())
    }

    fn convert(&mut self, format: Format) -> Result<(), TransformError> {
        if format.image_format().is_none() {
            return Err(TransformError::UnsupportedFormat(format.tag().to_string()));
        }
        self.stage(Stage::Output)?;
        self.pending.output = Some(format);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), TransformError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        debug!(?batch, "processing batch");
        let (body, format) = self.run(&batch)?;
        self.buffer = body;
        self.format = format;
        Ok(())
    }

    fn raster(&mut self) -> Result<DynamicImage, TransformError> {
        self.commit()?;
        let (img, _) = codec::decode_still(&self.buffer)?;
        Ok(img)
    }

    fn replace_raster(&mut self, raster: DynamicImage) -> Result<(), TransformError> {
        self.commit()?;
        self.store_raster(&raster)
    }

    fn map_raster(&mut self, filter: RasterFilter<'_>) -> Result<(), TransformError> {
        let img = self.raster()?;
        let img = filter(img);
        self.store_raster(&img)
    }

    fn reconcile_animated(&mut self, target: Format) -> Result<(), TransformError> {
        self.commit()?;
        if self.format == target {
            return Ok(());
        }
        info!(from = %self.format, to = %target, "reconciling through software engine");
        let mut software = SoftwareEngine::from_bytes(&self.buffer, self.options)?;
        software.convert(target)?;
        let body = software.encode()?;
        self.buffer = body;
        self.format = target;
        Ok(())
    }
}

/// Apply every stage of `batch` to a decoded image.
fn process(img: DynamicImage, batch: &ProcessOptions) -> Result<DynamicImage, TransformError> {
    let mut img = match (batch.crop, batch.resize) {
        (crop, Some(size)) => resample(&img, crop, size)?,
        (Some(r), None) => img.crop_imm(r.x, r.y, r.width, r.height),
        (None, None) => img,
    };

    if batch.flip {
        img = img.fliph();
    }

    if batch.rotate != 0.0 {
        img = match right_angle(batch.rotate) {
            Some(90) => img.rotate90(),
            Some(180) => img.rotate180(),
            Some(_) => img.rotate270(),
            None => warp_rotate(&img, batch.rotate)?,
        };
    }

    Ok(match batch.interpretation {
        Interpretation::Color => img,
        Interpretation::Gray => img.grayscale(),
        Interpretation::Bitonal(cut) => DynamicImage::ImageLuma8(threshold_luma(&img, cut)),
    })
}

/// Crop and resize in one `fast_image_resize` pass.
fn resample(
    img: &DynamicImage,
    crop: Option<RegionInstruction>,
    size: Dimensions,
) -> Result<DynamicImage, TransformError> {
    let had_alpha = img.color().has_alpha();
    let src = img.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
            .map_err(|e| TransformError::ProcessingFailed(format!("resize source: {e}")))?;
    let mut dst_image = fr::images::Image::new(size.width, size.height, fr::PixelType::U8x4);

    let mut options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
    if let Some(r) = crop {
        options = options.crop(r.x as f64, r.y as f64, r.width as f64, r.height as f64);
    }

    fr::Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| TransformError::ProcessingFailed(format!("resize: {e}")))?;

    let rgba = RgbaImage::from_raw(size.width, size.height, dst_image.into_vec())
        .ok_or_else(|| TransformError::ProcessingFailed("resize buffer size mismatch".into()))?;
    let out = DynamicImage::ImageRgba8(rgba);
    Ok(if had_alpha {
        out
    } else {
        DynamicImage::ImageRgb8(out.to_rgb8())
    })
}

/// Rotate clockwise about the centre onto the rotated bounding box.
fn warp_rotate(img: &DynamicImage, angle: f64) -> Result<DynamicImage, TransformError> {
    let (width, height) = (img.width(), img.height());
    let bounds = rotated_bounds(Dimensions::new(width, height), angle).ok_or_else(|| {
        TransformError::RotationFailure(format!("cannot rotate a {width}x{height} image"))
    })?;

    let projection = Projection::translate(bounds.width as f32 / 2.0, bounds.height as f32 / 2.0)
        * Projection::rotate(angle.to_radians() as f32)
        * Projection::translate(-(width as f32) / 2.0, -(height as f32) / 2.0);

    let src = img.to_rgba8();
    let mut out = RgbaImage::new(bounds.width, bounds.height);
    warp_into(
        &src,
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
        &mut out,
    );
    Ok(DynamicImage::ImageRgba8(out))
}
