//! IIIF `info.json` document for one image.
//!
//! A projection of [`Image::identifier`] and [`Image::dimensions`]; nothing
//! here touches pixels beyond reading the dimensions.
//!
//! ```text
//! {
//!   "@context": "http://iiif.io/api/image/2/context.json",
//!   "@id": "http://localhost:8080/cat.jpg",
//!   "@type": "iiif:Image",
//!   "protocol": "http://iiif.io/api/image",
//!   "width": 300,
//!   "height": 200,
//!   "profile": ["http://iiif.io/api/image/2/level2.json", { "formats": [...], ... }]
//! }
//! ```

use crate::imaging::{DecodeError, Format, Image};
use serde::{Deserialize, Serialize};

pub const CONTEXT: &str = "http://iiif.io/api/image/2/context.json";
pub const PROTOCOL: &str = "http://iiif.io/api/image";
pub const LEVEL2_URI: &str = "http://iiif.io/api/image/2/level2.json";

/// Capabilities advertised after the level URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub formats: Vec<String>,
    pub qualities: Vec<String>,
    pub supports: Vec<String>,
}

impl Default for Level {
    /// Everything both engines can produce.
    fn default() -> Self {
        Self {
            formats: Format::ALL
                .iter()
                .filter(|f| **f != Format::Svg)
                .map(|f| f.tag().to_string())
                .collect(),
            qualities: ["default", "color", "gray", "bitonal", "dither"]
                .map(String::from)
                .to_vec(),
            supports: [
                "regionByPx",
                "regionByPct",
                "regionSquare",
                "sizeByW",
                "sizeByH",
                "sizeByPct",
                "sizeByWh",
                "sizeByConfinedWh",
                "sizeAboveFull",
                "rotationBy90s",
                "rotationArbitrary",
                "mirroring",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Either the level URI or the capability object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileEntry {
    Uri(String),
    Level(Level),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub kind: String,
    pub protocol: String,
    pub width: u32,
    pub height: u32,
    pub profile: Vec<ProfileEntry>,
}

impl Profile {
    /// Build the document for `image` served under `endpoint`.
    ///
    /// Fails only if the engine cannot report dimensions.
    pub fn new(endpoint: &str, image: &Image, level: &Level) -> Result<Self, DecodeError> {
        let dims = image.dimensions()?;
        Ok(Self {
            context: CONTEXT.to_string(),
            id: format!("{}/{}", endpoint.trim_end_matches('/'), image.identifier()),
            kind: "iiif:Image".to_string(),
            protocol: PROTOCOL.to_string(),
            width: dims.width,
            height: dims.height,
            profile: vec![
                ProfileEntry::Uri(LEVEL2_URI.to_string()),
                ProfileEntry::Level(level.clone()),
            ],
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IiifConfig;
    use crate::imaging::{EncodeOptions, codec};
    use image::{DynamicImage, RgbImage};

    fn image(width: u32, height: u32) -> Image {
        let body = codec::encode_still(
            &DynamicImage::ImageRgb8(RgbImage::new(width, height)),
            Format::Jpeg,
            &EncodeOptions::default(),
        )
        .unwrap();
        Image::from_bytes(&IiifConfig::default(), "cat.jpg", &body).unwrap()
    }

    #[test]
    fn profile_projects_identifier_and_dimensions() {
        let profile = Profile::new("http://localhost:8080", &image(300, 200), &Level::default())
            .unwrap();
        assert_eq!(profile.id, "http://localhost:8080/cat.jpg");
        assert_eq!((profile.width, profile.height), (300, 200));
        assert_eq!(profile.kind, "iiif:Image");
    }

    #[test]
    fn trailing_slash_on_endpoint_is_not_doubled() {
        let profile = Profile::new("http://x/iiif/", &image(4, 4), &Level::default()).unwrap();
        assert_eq!(profile.id, "http://x/iiif/cat.jpg");
    }

    #[test]
    fn json_shape_uses_linked_data_keys() {
        let profile = Profile::new("http://x", &image(4, 4), &Level::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&profile.to_json().unwrap()).unwrap();

        assert_eq!(value["@context"], CONTEXT);
        assert_eq!(value["@type"], "iiif:Image");
        assert_eq!(value["protocol"], PROTOCOL);
        assert_eq!(value["profile"][0], LEVEL2_URI);
        let qualities = value["profile"][1]["qualities"].as_array().unwrap();
        assert!(qualities.iter().any(|q| q == "dither"));
    }

    #[test]
    fn default_level_omits_svg() {
        let level = Level::default();
        assert!(level.formats.contains(&"jpg".to_string()));
        assert!(!level.formats.contains(&"svg".to_string()));
    }

    #[test]
    fn profile_round_trips_through_json() {
        let profile = Profile::new("http://x", &image(8, 6), &Level::default()).unwrap();
        let back: Profile = serde_json::from_str(&profile.to_json().unwrap()).unwrap();
        assert_eq!(back, profile);
    }
}
