//! The ordered transform, written once for every engine.
//!
//! Steps run in the IIIF order of implementation:
//!
//! 1. region crop
//! 2. size
//! 3. mirror, then rotation
//! 4. standard quality (`gray`, `bitonal`)
//! 5. format conversion, then commit
//! 6. custom quality ([`quality`](super::quality))
//! 7. animated reconciliation
//!
//! Region and size are resolved against the dimensions the engine reports
//! *at that step*, so a crop changes what a relative size means. The first
//! error aborts the remaining steps; operations already applied stay applied
//! and the caller is expected to discard the image.

use super::backend::{ImageEngine, TransformError};
use super::quality::{CustomQualityResult, apply_custom_quality};
use super::transformation::{Quality, Transformation};
use tracing::debug;

/// Luma cut for `bitonal`: at or above is white.
pub const BITONAL_THRESHOLD: u8 = 160;

/// Run `transformation` against `engine`.
///
/// `max_iterations` bounds the `primitive:` quality; zero or negative means
/// unlimited.
pub fn transform(
    engine: &mut dyn ImageEngine,
    transformation: &Transformation,
    max_iterations: i64,
) -> Result<CustomQualityResult, TransformError> {
    debug!(%transformation, engine = %engine.kind(), "transform");

    if transformation.crops() {
        let dims = engine.dimensions()?;
        if let Some(region) = transformation.region_instruction(dims)? {
            debug!(?region, "crop");
            engine.crop(&region)?;
        }
    }

    if transformation.resizes() {
        let dims = engine.dimensions()?;
        if let Some(size) = transformation.size_instruction(dims)? {
            debug!(?size, "resize");
            engine.resize(&size)?;
        }
    }

    let rotation = transformation.rotation_instruction();
    if rotation.flip {
        debug!("flip");
        engine.flip_horizontal()?;
    }
    if rotation.angle != 0.0 {
        debug!(angle = rotation.angle, "rotate");
        engine.rotate(rotation.angle)?;
    }

    match transformation.quality() {
        Quality::Gray => {
            debug!("desaturate");
            engine.desaturate()?;
        }
        Quality::Bitonal => {
            debug!(cut = BITONAL_THRESHOLD, "threshold");
            engine.threshold(BITONAL_THRESHOLD)?;
        }
        _ => {}
    }

    let target = transformation.format_instruction()?.format;
    if target.content_type() != engine.format().content_type() {
        debug!(from = %engine.format(), to = %target, "convert");
        engine.convert(target)?;
    }
    engine.commit()?;

    let custom = apply_custom_quality(engine, transformation.quality(), target, max_iterations)?;

    if target.is_animated() && !custom.is_animated_output {
        engine.reconcile_animated(target)?;
    }

    Ok(custom)
}
