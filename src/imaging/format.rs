//! Format registry: format tag ↔ content type.
//!
//! A static lookup table, no state. Tags are matched case-insensitively and
//! both spellings of the JPEG and TIFF tags are accepted; the canonical tag
//! returned by [`Format::tag`] is the short one (`jpg`, `tif`).
//!
//! The free functions [`content_type_for`] and [`format_for_content_type`]
//! return an empty string on a miss rather than an error, so callers must
//! check for emptiness.

use image::ImageFormat;

/// Image formats the engines know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Jpeg,
    Png,
    Gif,
    WebP,
    Tiff,
    Svg,
}

const TAGS: &[(&str, Format)] = &[
    ("jpg", Format::Jpeg),
    ("jpeg", Format::Jpeg),
    ("png", Format::Png),
    ("gif", Format::Gif),
    ("webp", Format::WebP),
    ("tif", Format::Tiff),
    ("tiff", Format::Tiff),
    ("svg", Format::Svg),
];

const CONTENT_TYPES: &[(&str, Format)] = &[
    ("image/jpeg", Format::Jpeg),
    ("image/png", Format::Png),
    ("image/gif", Format::Gif),
    ("image/webp", Format::WebP),
    ("image/tiff", Format::Tiff),
    ("image/svg+xml", Format::Svg),
];

impl Format {
    /// Every format, in registry order.
    pub const ALL: [Format; 6] = [
        Format::Jpeg,
        Format::Png,
        Format::Gif,
        Format::WebP,
        Format::Tiff,
        Format::Svg,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        TAGS.iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(tag))
            .map(|(_, f)| *f)
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        CONTENT_TYPES
            .iter()
            .find(|(ct, _)| ct.eq_ignore_ascii_case(content_type))
            .map(|(_, f)| *f)
    }

    /// Canonical short tag.
    pub fn tag(self) -> &'static str {
        match self {
            Format::Jpeg => "jpg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::WebP => "webp",
            Format::Tiff => "tif",
            Format::Svg => "svg",
        }
    }

    pub fn content_type(self) -> &'static str {
        CONTENT_TYPES
            .iter()
            .find(|(_, f)| *f == self)
            .map(|(ct, _)| *ct)
            .unwrap_or("")
    }

    /// Formats that can carry more than one frame.
    pub fn is_animated(self) -> bool {
        matches!(self, Format::Gif)
    }

    /// Raster codec for this format. SVG has none: it can be named and
    /// looked up but never decoded or encoded by either engine.
    pub fn image_format(self) -> Option<ImageFormat> {
        match self {
            Format::Jpeg => Some(ImageFormat::Jpeg),
            Format::Png => Some(ImageFormat::Png),
            Format::Gif => Some(ImageFormat::Gif),
            Format::WebP => Some(ImageFormat::WebP),
            Format::Tiff => Some(ImageFormat::Tiff),
            Format::Svg => None,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Format::Jpeg),
            ImageFormat::Png => Some(Format::Png),
            ImageFormat::Gif => Some(Format::Gif),
            ImageFormat::WebP => Some(Format::WebP),
            ImageFormat::Tiff => Some(Format::Tiff),
            _ => None,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Content type for a format tag, or `""` if the tag is unknown.
pub fn content_type_for(tag: &str) -> &'static str {
    Format::from_tag(tag).map(Format::content_type).unwrap_or("")
}

/// Canonical format tag for a content type, or `""` if it is unknown.
pub fn format_for_content_type(content_type: &str) -> &'static str {
    Format::from_content_type(content_type)
        .map(Format::tag)
        .unwrap_or("")
}
