//! Image engine trait and shared types.
//!
//! The [`ImageEngine`] trait is the primitive-operation surface every engine
//! implements: crop, resize, flip, rotate, desaturate, threshold, convert and
//! encode, plus the raster hooks the custom-quality pass needs. The ordering
//! of those operations lives once, in [`pipeline`](super::pipeline); engines
//! never decide *when* something happens, only *how*.
//!
//! | Primitive | [`SoftwareEngine`](super::software::SoftwareEngine) | [`AcceleratedEngine`](super::accelerated::AcceleratedEngine) |
//! |---|---|---|
//! | Payload | decoded `DynamicImage` (or GIF frames) | opaque encoded buffer |
//! | crop / resize | `crop_imm` + `resize_exact` (Triangle) | staged, one `fast_image_resize` call (Bilinear) |
//! | rotate | exact for right angles, bilinear inverse mapping otherwise | exact for right angles, `imageproc` warp otherwise |
//! | gray / bitonal | luma conversion / threshold | staged interpretation |
//! | GIF output | native (frames) | staged as PNG, packaged by [`ImageEngine::reconcile_animated`] |

use super::format::Format;
use super::transformation::{RegionInstruction, SizeInstruction};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Malformed or unsupported input bytes.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unrecognised image data")]
    UnknownFormat,
    #[error("Unsupported source format: {0}")]
    Unsupported(String),
    #[error("Failed to decode {format} image: {reason}")]
    Malformed { format: String, reason: String },
}

/// Failure turning a payload back into bytes.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("No encoder for {0} images")]
    Unsupported(String),
    #[error("{format} encode failed: {reason}")]
    Failed { format: String, reason: String },
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Malformed request: {0}")]
    InvalidRequest(String),
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
    #[error("Invalid size: {0}")]
    InvalidSize(String),
    #[error("Invalid rotation: {0}")]
    InvalidRotation(String),
    #[error("Invalid quality: {0}")]
    InvalidQuality(String),
    #[error("Unsupported image format '{0}'")]
    UnsupportedFormat(String),
    #[error("Invalid quality parameter: {0}")]
    InvalidQualityParameter(String),
    #[error("Rotation failed: {0}")]
    RotationFailure(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Width and height of the current payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x {}", self.width, self.height)
    }
}

/// Which engine backs an [`Image`](super::image::Image).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Software,
    Accelerated,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::Software, EngineKind::Accelerated];

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Software => "software",
            EngineKind::Accelerated => "accelerated",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "software" => Ok(EngineKind::Software),
            "accelerated" => Ok(EngineKind::Accelerated),
            other => Err(format!(
                "unknown engine '{other}' (expected 'software' or 'accelerated')"
            )),
        }
    }
}

/// Closure applied to a decoded raster by [`ImageEngine::map_raster`].
pub type RasterFilter<'a> = &'a mut dyn FnMut(DynamicImage) -> DynamicImage;

/// Primitive operations every engine must support.
///
/// Operations mutate the payload in place. An engine may defer work (the
/// accelerated engine stages operations into one batch) as long as
/// [`dimensions`](Self::dimensions) reflects every operation already
/// accepted and [`commit`](Self::commit) makes the payload match.
pub trait ImageEngine: Send {
    fn kind(&self) -> EngineKind;

    /// Format of the payload currently held. Always in step with the payload.
    fn format(&self) -> Format;

    /// Dimensions of the payload, including operations staged but not yet
    /// committed. Computed on every call.
    fn dimensions(&self) -> Result<Dimensions, DecodeError>;

    /// Replace the payload by decoding `body`.
    fn update(&mut self, body: &[u8]) -> Result<(), DecodeError>;

    /// Encode the payload into [`format`](Self::format).
    fn encode(&self) -> Result<Vec<u8>, EncodeError>;

    fn crop(&mut self, region: &RegionInstruction) -> Result<(), TransformError>;

    fn resize(&mut self, size: &SizeInstruction) -> Result<(), TransformError>;

    fn flip_horizontal(&mut self) -> Result<(), TransformError>;

    /// Rotate clockwise by `angle` degrees in `[0, 360)`, growing the canvas
    /// to the rotated bounding box.
    fn rotate(&mut self, angle: f64) -> Result<(), TransformError>;

    fn desaturate(&mut self) -> Result<(), TransformError>;

    /// Two-tone: luma at or above `cut` becomes white, everything else black.
    fn threshold(&mut self, cut: u8) -> Result<(), TransformError>;

    /// Re-encode the payload as `format`.
    fn convert(&mut self, format: Format) -> Result<(), TransformError>;

    /// Apply any staged operations.
    fn commit(&mut self) -> Result<(), TransformError> {
        Ok(())
    }

    /// A decoded copy of the payload (first frame for animated payloads).
    fn raster(&mut self) -> Result<DynamicImage, TransformError>;

    /// Replace the payload with `raster`, keeping the current format.
    fn replace_raster(&mut self, raster: DynamicImage) -> Result<(), TransformError>;

    /// Run `filter` over the decoded payload (every frame, where there are
    /// several) and store the result.
    fn map_raster(&mut self, filter: RasterFilter<'_>) -> Result<(), TransformError>;

    /// Package a single-frame payload as the animated `target` format.
    ///
    /// Only engines that cannot hold animated payloads natively need this;
    /// for everyone else it is a no-op. Precondition: no staged operations.
    /// Postcondition: `format() == target`.
    fn reconcile_animated(&mut self, _target: Format) -> Result<(), TransformError> {
        Ok(())
    }
}
