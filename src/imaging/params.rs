//! Parameter types for engine operations.
//!
//! These structs describe *what* to do, not *how*. They sit between the
//! configuration / instruction layer and the engines that do the pixel work.
//!
//! - [`JpegQuality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`EncodeOptions`]: Everything an engine needs to turn a payload into bytes.
//! - [`PrimitiveParams`]: Validated `primitive:<mode>,<iterations>,<alpha>` parameters.

use super::backend::TransformError;

/// Quality setting for JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegQuality(pub u8);

impl JpegQuality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for JpegQuality {
    fn default() -> Self {
        Self(90)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub jpeg_quality: JpegQuality,
}

/// Shape family used by the primitive stylization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    /// A random mix of every other mode.
    Combo,
    Triangle,
    Rectangle,
    Ellipse,
    Circle,
    RotatedRectangle,
}

impl PrimitiveMode {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Combo),
            1 => Some(Self::Triangle),
            2 => Some(Self::Rectangle),
            3 => Some(Self::Ellipse),
            4 => Some(Self::Circle),
            5 => Some(Self::RotatedRectangle),
            _ => None,
        }
    }
}

/// Alpha used when the request passes `0`.
pub const DEFAULT_PRIMITIVE_ALPHA: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveParams {
    pub mode: PrimitiveMode,
    pub iterations: u32,
    pub alpha: u8,
}

impl PrimitiveParams {
    /// Parse and validate `<mode>,<iterations>,<alpha>`.
    ///
    /// `max_iterations <= 0` means unlimited. Both `iterations ==
    /// max_iterations` and `alpha == 255` are accepted.
    pub fn parse(raw: &str, max_iterations: i64) -> Result<Self, TransformError> {
        let invalid = |what: String| TransformError::InvalidQualityParameter(what);

        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        let [mode, iterations, alpha] = fields[..] else {
            return Err(invalid(format!(
                "expected primitive:<mode>,<iterations>,<alpha>, got '{raw}'"
            )));
        };

        let mode = mode
            .parse::<u32>()
            .ok()
            .and_then(PrimitiveMode::from_index)
            .ok_or_else(|| invalid(format!("unknown primitive mode '{mode}'")))?;

        let iterations: i64 = iterations
            .parse()
            .map_err(|_| invalid(format!("invalid primitive iterations '{iterations}'")))?;
        if iterations <= 0 {
            return Err(invalid(format!(
                "primitive iterations must be positive, got {iterations}"
            )));
        }
        if max_iterations > 0 && iterations > max_iterations {
            return Err(invalid(format!(
                "primitive iterations {iterations} exceed the limit of {max_iterations}"
            )));
        }
        let iterations = u32::try_from(iterations)
            .map_err(|_| invalid(format!("primitive iterations {iterations} out of range")))?;

        let alpha: i64 = alpha
            .parse()
            .map_err(|_| invalid(format!("invalid primitive alpha '{alpha}'")))?;
        let alpha = u8::try_from(alpha)
            .map_err(|_| invalid(format!("primitive alpha must be 0-255, got {alpha}")))?;

        Ok(Self {
            mode,
            iterations,
            alpha: if alpha == 0 {
                DEFAULT_PRIMITIVE_ALPHA
            } else {
                alpha
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_quality_clamps_to_valid_range() {
        assert_eq!(JpegQuality::new(0).value(), 1);
        assert_eq!(JpegQuality::new(50).value(), 50);
        assert_eq!(JpegQuality::new(150).value(), 100);
    }

    #[test]
    fn jpeg_quality_default_is_90() {
        assert_eq!(JpegQuality::default().value(), 90);
    }

    #[test]
    fn primitive_parses_valid_parameters() {
        let params = PrimitiveParams::parse("1,50,128", 100).unwrap();
        assert_eq!(params.mode, PrimitiveMode::Triangle);
        assert_eq!(params.iterations, 50);
        assert_eq!(params.alpha, 128);
    }

    #[test]
    fn primitive_accepts_boundary_values() {
        let params = PrimitiveParams::parse("3,100,255", 100).unwrap();
        assert_eq!(params.iterations, 100);
        assert_eq!(params.alpha, 255);
    }

    #[test]
    fn primitive_rejects_iterations_over_limit() {
        assert!(matches!(
            PrimitiveParams::parse("1,101,128", 100),
            Err(TransformError::InvalidQualityParameter(_))
        ));
    }

    #[test]
    fn primitive_limit_of_zero_or_less_is_unlimited() {
        assert!(PrimitiveParams::parse("1,100000,128", 0).is_ok());
        assert!(PrimitiveParams::parse("1,100000,128", -1).is_ok());
    }

    #[test]
    fn primitive_rejects_alpha_over_255() {
        assert!(matches!(
            PrimitiveParams::parse("1,10,256", 0),
            Err(TransformError::InvalidQualityParameter(_))
        ));
    }

    #[test]
    fn primitive_rejects_malformed_fields() {
        for raw in ["", "1,2", "1,2,3,4", "x,10,128", "9,10,128", "1,0,128", "1,-5,128", "1,10,-1"] {
            assert!(
                matches!(
                    PrimitiveParams::parse(raw, 0),
                    Err(TransformError::InvalidQualityParameter(_))
                ),
                "'{raw}' should be rejected"
            );
        }
    }

    #[test]
    fn primitive_zero_alpha_uses_default() {
        let params = PrimitiveParams::parse("4,5,0", 0).unwrap();
        assert_eq!(params.alpha, DEFAULT_PRIMITIVE_ALPHA);
    }
}
