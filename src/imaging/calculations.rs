//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images. Both
//! engines call the same functions, which is what keeps their output
//! dimensions identical.

use super::backend::Dimensions;
use super::transformation::SizeInstruction;

/// Largest edge either engine will allocate.
pub const MAX_DIMENSION: u32 = 65_535;

/// Normalize an angle into `[0, 360)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let normalized = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Returns `Some(90 | 180 | 270)` when `angle` is a right-angle rotation.
pub fn right_angle(angle: f64) -> Option<u32> {
    let angle = normalize_angle(angle);
    [90u32, 180, 270]
        .into_iter()
        .find(|&right| (angle - right as f64).abs() < 1e-9)
}

/// Scale `source` to fit inside `bounds`, preserving aspect ratio.
///
/// The longer relative axis matches the bound exactly; the other is
/// computed and rounded. Neither axis drops below 1.
///
/// # Examples
/// ```
/// # use iiif_engine::imaging::calculations::fit_within;
/// # use iiif_engine::imaging::Dimensions;
/// let fitted = fit_within(Dimensions::new(300, 200), Dimensions::new(150, 150));
/// assert_eq!(fitted, Dimensions::new(150, 100));
/// ```
pub fn fit_within(source: Dimensions, bounds: Dimensions) -> Dimensions {
    let scale_w = bounds.width as f64 / source.width as f64;
    let scale_h = bounds.height as f64 / source.height as f64;

    if scale_w <= scale_h {
        // Width is the constraining axis
        let h = (source.height as f64 * scale_w).round() as u32;
        Dimensions::new(bounds.width.max(1), h.max(1))
    } else {
        let w = (source.width as f64 * scale_h).round() as u32;
        Dimensions::new(w.max(1), bounds.height.max(1))
    }
}

/// Final output dimensions for a resolved size instruction.
///
/// - `force` uses the requested box as-is; otherwise the image is fitted
///   inside it.
/// - Without `enlarge`, a result larger than `current` on either axis is
///   clamped: forced sizes clamp per axis, fitted sizes fall back to
///   `current` (no resize).
pub fn target_dimensions(current: Dimensions, size: &SizeInstruction) -> Dimensions {
    let requested = Dimensions::new(size.width.max(1), size.height.max(1));
    let target = if size.force {
        requested
    } else {
        fit_within(current, requested)
    };

    if size.enlarge || (target.width <= current.width && target.height <= current.height) {
        return target;
    }

    if size.force {
        Dimensions::new(
            target.width.min(current.width),
            target.height.min(current.height),
        )
    } else {
        current
    }
}

/// Bounding box of `dims` rotated by `angle` degrees.
///
/// Right angles are exact (90/270 swap the axes). Returns `None` for
/// non-finite angles or when the canvas would exceed [`MAX_DIMENSION`].
///
/// ```
/// # use iiif_engine::imaging::calculations::rotated_bounds;
/// # use iiif_engine::imaging::Dimensions;
/// assert_eq!(
///     rotated_bounds(Dimensions::new(100, 50), 90.0),
///     Some(Dimensions::new(50, 100))
/// );
/// ```
pub fn rotated_bounds(dims: Dimensions, angle: f64) -> Option<Dimensions> {
    if !angle.is_finite() {
        return None;
    }
    let angle = normalize_angle(angle);
    if angle == 0.0 {
        return Some(dims);
    }
    match right_angle(angle) {
        Some(90) | Some(270) => return Some(Dimensions::new(dims.height, dims.width)),
        Some(_) => return Some(dims),
        None => {}
    }

    let rad = angle.to_radians();
    let (sin, cos) = (rad.sin().abs(), rad.cos().abs());
    let (w, h) = (dims.width as f64, dims.height as f64);

    // new_w = |w*cos| + |h*sin|, new_h = |w*sin| + |h*cos|
    let new_w = (w * cos + h * sin).ceil();
    let new_h = (w * sin + h * cos).ceil();

    if new_w > MAX_DIMENSION as f64 || new_h > MAX_DIMENSION as f64 {
        return None;
    }
    Some(Dimensions::new((new_w as u32).max(1), (new_h as u32).max(1)))
}

/// Downscale `dims` so the longer edge is at most `max_edge`.
///
/// Images already within the limit are returned unchanged.
pub fn working_dimensions(dims: Dimensions, max_edge: u32) -> Dimensions {
    let longer = dims.width.max(dims.height);
    if longer <= max_edge {
        return dims;
    }
    fit_within(dims, Dimensions::new(max_edge, max_edge))
}
