//! Instruction sets: the five axes of an IIIF image request.
//!
//! A [`Transformation`] is built once per request from the raw protocol
//! strings and never changes afterwards. Construction checks syntax only.
//! Region and size are *resolved* into concrete pixel instructions later,
//! against whatever dimensions the image has at that point in the pipeline,
//! because a crop changes what `pct:50` or `w,` mean for the resize that
//! follows it.
//!
//! ## Accepted syntax
//!
//! | Axis | Forms |
//! |---|---|
//! | region | `full`, `square`, `x,y,w,h`, `pct:x,y,w,h` |
//! | size | `full`, `max`, `w,`, `,h`, `pct:n`, `w,h`, `!w,h`, each optionally prefixed with `^` to allow upscaling |
//! | rotation | `n`, `!n` (mirror first) |
//! | quality | `default`, `color`, `gray`, `bitonal`, `dither`, `primitive:<mode>,<iterations>,<alpha>` |
//! | format | any tag known to the [format registry](super::format) |

use super::backend::{Dimensions, TransformError};
use super::calculations::{MAX_DIMENSION, normalize_angle, target_dimensions};
use super::format::Format;

/// Integer pixel box to crop to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInstruction {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Requested output box.
///
/// `enlarge` permits upscaling; `force` permits changing the aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeInstruction {
    pub width: u32,
    pub height: u32,
    pub enlarge: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationInstruction {
    /// Clockwise degrees in `[0, 360)`.
    pub angle: f64,
    /// Mirror horizontally before rotating.
    pub flip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInstruction {
    pub format: Format,
}

/// Rendering quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quality {
    Default,
    Color,
    Gray,
    Bitonal,
    Dither,
    /// Raw `<mode>,<iterations>,<alpha>` parameters, validated at dispatch.
    Primitive(String),
}

impl Quality {
    fn parse(raw: &str) -> Result<Self, TransformError> {
        match raw {
            "default" => Ok(Quality::Default),
            "color" => Ok(Quality::Color),
            "gray" | "grey" => Ok(Quality::Gray),
            "bitonal" => Ok(Quality::Bitonal),
            "dither" => Ok(Quality::Dither),
            other => match other.strip_prefix("primitive:") {
                Some(params) => Ok(Quality::Primitive(params.to_string())),
                None => Err(TransformError::InvalidQuality(other.to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RegionSpec {
    Full,
    Square,
    Pixels { x: u32, y: u32, w: u32, h: u32 },
    Percent { x: f64, y: f64, w: f64, h: f64 },
}

#[derive(Debug, Clone, PartialEq)]
enum SizeSpec {
    Full,
    Max,
    Width(u32),
    Height(u32),
    Percent(f64),
    Exact(u32, u32),
    BestFit(u32, u32),
}

/// Immutable per-request instruction set.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    region: String,
    size: String,
    rotation: String,
    quality: String,
    format: String,
    region_spec: RegionSpec,
    size_spec: SizeSpec,
    upscale: bool,
    rotation_spec: RotationInstruction,
    quality_spec: Quality,
}

impl Transformation {
    pub fn new(
        region: &str,
        size: &str,
        rotation: &str,
        quality: &str,
        format: &str,
    ) -> Result<Self, TransformError> {
        let (upscale, size_body) = match size.strip_prefix('^') {
            Some(rest) => (true, rest),
            None => (false, size),
        };

        Ok(Self {
            region_spec: parse_region(region)?,
            size_spec: parse_size(size_body).map_err(|_| invalid_size(size))?,
            upscale,
            rotation_spec: parse_rotation(rotation)?,
            quality_spec: Quality::parse(quality)?,
            region: region.to_string(),
            size: size.to_string(),
            rotation: rotation.to_string(),
            quality: quality.to_string(),
            format: format.to_string(),
        })
    }

    /// Parse the IIIF path tail `{region}/{size}/{rotation}/{quality}.{format}`.
    pub fn from_path(path: &str) -> Result<Self, TransformError> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        let [region, size, rotation, last] = parts[..] else {
            return Err(TransformError::InvalidRequest(format!(
                "expected region/size/rotation/quality.format, got '{path}'"
            )));
        };
        let (quality, format) = last.rsplit_once('.').ok_or_else(|| {
            TransformError::InvalidRequest(format!("'{last}' has no .format extension"))
        })?;
        Self::new(region, size, rotation, quality, format)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn rotation(&self) -> &str {
        &self.rotation
    }

    pub fn quality(&self) -> &Quality {
        &self.quality_spec
    }

    pub fn quality_str(&self) -> &str {
        &self.quality
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// `false` when the region is `full`.
    pub fn crops(&self) -> bool {
        self.region_spec != RegionSpec::Full
    }

    /// `false` when the size is `full` or `max`.
    pub fn resizes(&self) -> bool {
        !matches!(self.size_spec, SizeSpec::Full | SizeSpec::Max)
    }

    /// Resolve the region against the current dimensions.
    ///
    /// Returns `None` when the resolved box covers the whole image: `full`,
    /// `square` on an already square image, or any box that clips back to
    /// the full extent. Boxes running past the right or bottom edge are
    /// clipped.
    pub fn region_instruction(
        &self,
        dims: Dimensions,
    ) -> Result<Option<RegionInstruction>, TransformError> {
        let (x, y, w, h) = match self.region_spec {
            RegionSpec::Full => return Ok(None),
            RegionSpec::Square => {
                if dims.width == dims.height {
                    return Ok(None);
                }
                let side = dims.width.min(dims.height);
                ((dims.width - side) / 2, (dims.height - side) / 2, side, side)
            }
            RegionSpec::Pixels { x, y, w, h } => (x, y, w, h),
            RegionSpec::Percent { x, y, w, h } => (
                percent_of(x, dims.width),
                percent_of(y, dims.height),
                percent_of(w, dims.width),
                percent_of(h, dims.height),
            ),
        };

        if w == 0 || h == 0 {
            return Err(TransformError::InvalidRegion(format!(
                "'{}' resolves to an empty box on a {dims} image",
                self.region
            )));
        }
        if x >= dims.width || y >= dims.height {
            return Err(TransformError::InvalidRegion(format!(
                "'{}' lies outside a {dims} image",
                self.region
            )));
        }

        let region = RegionInstruction {
            x,
            y,
            width: w.min(dims.width - x),
            height: h.min(dims.height - y),
        };
        if (region.x, region.y, region.width, region.height) == (0, 0, dims.width, dims.height) {
            return Ok(None);
        }
        Ok(Some(region))
    }

    /// Resolve the size against the current dimensions.
    ///
    /// Returns `None` for `full` and `max`. Targets with an edge above
    /// [`MAX_DIMENSION`] are rejected before any engine allocates them.
    pub fn size_instruction(
        &self,
        dims: Dimensions,
    ) -> Result<Option<SizeInstruction>, TransformError> {
        let scaled = |numerator: u32, denominator: u32, value: u32| -> u32 {
            ((value as f64 * numerator as f64 / denominator as f64).round() as u32).max(1)
        };

        let (width, height, force) = match self.size_spec {
            SizeSpec::Full | SizeSpec::Max => return Ok(None),
            SizeSpec::Width(w) => (w, scaled(w, dims.width, dims.height), false),
            SizeSpec::Height(h) => (scaled(h, dims.height, dims.width), h, false),
            SizeSpec::Percent(pct) => {
                let w = ((dims.width as f64 * pct / 100.0).round() as u32).max(1);
                let h = ((dims.height as f64 * pct / 100.0).round() as u32).max(1);
                (w, h, false)
            }
            SizeSpec::Exact(w, h) => (w, h, true),
            SizeSpec::BestFit(w, h) => (w, h, false),
        };

        let instruction = SizeInstruction {
            width,
            height,
            enlarge: self.upscale,
            force,
        };
        let target = target_dimensions(dims, &instruction);
        if target.width > MAX_DIMENSION || target.height > MAX_DIMENSION {
            return Err(TransformError::InvalidSize(format!(
                "'{}' resolves to {target} on a {dims} image, above the {MAX_DIMENSION} pixel limit",
                self.size
            )));
        }
        Ok(Some(instruction))
    }

    pub fn rotation_instruction(&self) -> RotationInstruction {
        self.rotation_spec
    }

    /// Resolve the output format. Tags without an encoder are unsupported.
    pub fn format_instruction(&self) -> Result<FormatInstruction, TransformError> {
        Format::from_tag(&self.format)
            .filter(|f| f.image_format().is_some())
            .map(|format| FormatInstruction { format })
            .ok_or_else(|| TransformError::UnsupportedFormat(self.format.clone()))
    }
}

impl std::fmt::Display for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}.{}",
            self.region, self.size, self.rotation, self.quality, self.format
        )
    }
}

/// Split `identifier/region/size/rotation/quality.format` into the
/// identifier and the transformation tail. Identifiers may contain `/`.
pub fn split_request(path: &str) -> Option<(&str, &str)> {
    let path = path.trim().trim_matches('/');
    let mut cut = path.len();
    for _ in 0..4 {
        cut = path[..cut].rfind('/')?;
    }
    let (identifier, tail) = (&path[..cut], &path[cut + 1..]);
    (!identifier.is_empty()).then_some((identifier, tail))
}

fn percent_of(pct: f64, extent: u32) -> u32 {
    (pct / 100.0 * extent as f64).round() as u32
}

fn invalid_size(raw: &str) -> TransformError {
    TransformError::InvalidSize(raw.to_string())
}

fn parse_region(raw: &str) -> Result<RegionSpec, TransformError> {
    let invalid = || TransformError::InvalidRegion(raw.to_string());
    match raw {
        "full" => return Ok(RegionSpec::Full),
        "square" => return Ok(RegionSpec::Square),
        _ => {}
    }

    if let Some(rest) = raw.strip_prefix("pct:") {
        let values = parse_list::<f64>(rest, 4).ok_or_else(invalid)?;
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(invalid());
        }
        return Ok(RegionSpec::Percent {
            x: values[0],
            y: values[1],
            w: values[2],
            h: values[3],
        });
    }

    let values = parse_list::<u32>(raw, 4).ok_or_else(invalid)?;
    Ok(RegionSpec::Pixels {
        x: values[0],
        y: values[1],
        w: values[2],
        h: values[3],
    })
}

fn parse_size(raw: &str) -> Result<SizeSpec, ()> {
    match raw {
        "full" => return Ok(SizeSpec::Full),
        "max" => return Ok(SizeSpec::Max),
        _ => {}
    }

    if let Some(pct) = raw.strip_prefix("pct:") {
        let pct: f64 = pct.parse().map_err(|_| ())?;
        return if pct.is_finite() && pct > 0.0 {
            Ok(SizeSpec::Percent(pct))
        } else {
            Err(())
        };
    }

    let (best_fit, body) = match raw.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (w, h) = body.split_once(',').ok_or(())?;
    let parse_dim = |s: &str| -> Result<Option<u32>, ()> {
        if s.is_empty() {
            return Ok(None);
        }
        match s.parse::<u32>() {
            Ok(0) | Err(_) => Err(()),
            Ok(v) => Ok(Some(v)),
        }
    };

    match (parse_dim(w)?, parse_dim(h)?, best_fit) {
        (Some(w), None, false) => Ok(SizeSpec::Width(w)),
        (None, Some(h), false) => Ok(SizeSpec::Height(h)),
        (Some(w), Some(h), false) => Ok(SizeSpec::Exact(w, h)),
        (Some(w), Some(h), true) => Ok(SizeSpec::BestFit(w, h)),
        _ => Err(()),
    }
}

fn parse_rotation(raw: &str) -> Result<RotationInstruction, TransformError> {
    let (flip, body) = match raw.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let angle: f64 = body
        .parse()
        .map_err(|_| TransformError::InvalidRotation(raw.to_string()))?;
    if !angle.is_finite() || angle < 0.0 {
        return Err(TransformError::InvalidRotation(raw.to_string()));
    }
    Ok(RotationInstruction {
        angle: normalize_angle(angle),
        flip,
    })
}

fn parse_list<T: std::str::FromStr>(raw: &str, count: usize) -> Option<Vec<T>> {
    let values: Vec<T> = raw
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect::<Option<_>>()?;
    (values.len() == count).then_some(values)
}
