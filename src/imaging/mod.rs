//! IIIF image transformation: two engines, one pipeline.
//!
//! | Operation | Software engine | Accelerated engine |
//! |---|---|---|
//! | **Decode** | `image` (all GIF frames kept) | header only; decoded at commit |
//! | **Crop** | `crop_imm` | staged; `fast_image_resize` crop box |
//! | **Resize** | `resize_exact` (Triangle) | staged; `fast_image_resize` bilinear |
//! | **Rotate** | exact right angles, bilinear otherwise | exact right angles, `imageproc` warp |
//! | **Gray / bitonal** | luma, luma threshold | staged interpretation |
//! | **Dither / primitive** | raster hooks, shared | raster hooks, shared |
//!
//! The module is split into:
//! - **Calculations**: pure dimension math (unit testable)
//! - **Transformation**: parsing and resolving the four request parameters
//! - **Backend**: the [`ImageEngine`] trait and the error taxonomy
//! - **Engines**: [`SoftwareEngine`], [`AcceleratedEngine`]
//! - **Pipeline**: the ordered [`transform`] and the custom quality pass
//! - **Image**: [`Image`], the per-request handle tying it together

mod accelerated;
mod backend;
pub mod calculations;
pub mod codec;
mod dither;
mod format;
mod image;
mod params;
mod pipeline;
mod primitive;
mod quality;
mod software;
mod transformation;

pub use accelerated::{AcceleratedEngine, Interpretation, ProcessOptions};
pub use backend::{
    DecodeError, Dimensions, EncodeError, EngineKind, ImageEngine, RasterFilter, TransformError,
};
pub use dither::dither;
pub use format::{Format, content_type_for, format_for_content_type};
pub use self::image::{Image, ImageError};
pub use params::{DEFAULT_PRIMITIVE_ALPHA, EncodeOptions, JpegQuality, PrimitiveMode, PrimitiveParams};
pub use pipeline::{BITONAL_THRESHOLD, transform};
pub use primitive::{render as render_primitive, render_frames as render_primitive_frames};
pub use quality::{CustomQualityResult, apply_custom_quality};
pub use software::SoftwareEngine;
pub use transformation::{
    FormatInstruction, Quality, RegionInstruction, RotationInstruction, SizeInstruction,
    Transformation, split_request,
};
