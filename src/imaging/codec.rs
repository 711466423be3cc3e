//! Raster decode/encode helpers shared by both engines.
//!
//! | Format | Decode | Encode |
//! |---|---|---|
//! | JPEG | `image` | `JpegEncoder` at the configured quality (alpha dropped) |
//! | PNG, TIFF | `image` | `image` (8-bit gray/RGB/RGBA) |
//! | WebP | `image` | `image` lossless encoder (RGB/RGBA) |
//! | GIF | `image`, all frames via `GifDecoder` | `GifEncoder`, looping forever |
//! | SVG | no | no |

use super::backend::{DecodeError, Dimensions, EncodeError};
use super::format::Format;
use super::params::EncodeOptions;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{AnimationDecoder, DynamicImage, Frame, ImageReader};
use std::io::Cursor;

/// Identify the format of encoded bytes from their magic number.
pub fn sniff(body: &[u8]) -> Result<Format, DecodeError> {
    if looks_like_svg(body) {
        return Err(DecodeError::Unsupported(Format::Svg.tag().to_string()));
    }
    let guessed = image::guess_format(body).map_err(|_| DecodeError::UnknownFormat)?;
    Format::from_image_format(guessed)
        .ok_or_else(|| DecodeError::Unsupported(format!("{guessed:?}").to_lowercase()))
}

fn looks_like_svg(body: &[u8]) -> bool {
    let head = &body[..body.len().min(256)];
    String::from_utf8_lossy(head).contains("<svg")
}

/// Read dimensions from the header without decoding pixels.
pub fn dimensions_of(body: &[u8]) -> Result<Dimensions, DecodeError> {
    let format = sniff(body)?;
    let (width, height) = reader(body, format)?
        .into_dimensions()
        .map_err(|e| malformed(format, e))?;
    Ok(Dimensions::new(width, height))
}

/// Decode the first (or only) frame.
pub fn decode_still(body: &[u8]) -> Result<(DynamicImage, Format), DecodeError> {
    let format = sniff(body)?;
    let img = reader(body, format)?
        .decode()
        .map_err(|e| malformed(format, e))?;
    Ok((img, format))
}

/// Decode every frame of a GIF, composited to the full canvas.
pub fn decode_frames(body: &[u8]) -> Result<Vec<Frame>, DecodeError> {
    let decoder = GifDecoder::new(Cursor::new(body)).map_err(|e| malformed(Format::Gif, e))?;
    decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| malformed(Format::Gif, e))
}

fn reader(body: &[u8], format: Format) -> Result<ImageReader<Cursor<&[u8]>>, DecodeError> {
    let image_format = format
        .image_format()
        .ok_or_else(|| DecodeError::Unsupported(format.tag().to_string()))?;
    let mut reader = ImageReader::new(Cursor::new(body));
    reader.set_format(image_format);
    Ok(reader)
}

fn malformed(format: Format, err: image::ImageError) -> DecodeError {
    DecodeError::Malformed {
        format: format.tag().to_string(),
        reason: err.to_string(),
    }
}

fn encode_failed(format: Format, err: image::ImageError) -> EncodeError {
    EncodeError::Failed {
        format: format.tag().to_string(),
        reason: err.to_string(),
    }
}

/// Encode a single raster as `format`.
pub fn encode_still(
    img: &DynamicImage,
    format: Format,
    options: &EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match format {
        Format::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, options.jpeg_quality.value());
            let pixels = match img {
                DynamicImage::ImageLuma8(_) => img.clone(),
                _ => DynamicImage::ImageRgb8(img.to_rgb8()),
            };
            pixels
                .write_with_encoder(encoder)
                .map_err(|e| encode_failed(format, e))?;
        }
        Format::Gif => {
            let frame = Frame::new(img.to_rgba8());
            return encode_frames(vec![frame]);
        }
        Format::Png | Format::Tiff | Format::WebP => {
            let image_format = format
                .image_format()
                .ok_or_else(|| EncodeError::Unsupported(format.tag().to_string()))?;
            normalize_for(img, format)
                .write_to(&mut Cursor::new(&mut buf), image_format)
                .map_err(|e| encode_failed(format, e))?;
        }
        Format::Svg => return Err(EncodeError::Unsupported(format.tag().to_string())),
    }
    Ok(buf)
}

/// Encode frames as a looping GIF.
pub fn encode_frames(frames: Vec<Frame>) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| encode_failed(Format::Gif, e))?;
        encoder
            .encode_frames(frames)
            .map_err(|e| encode_failed(Format::Gif, e))?;
    }
    Ok(buf)
}

/// Convert to a pixel layout the target encoder accepts.
fn normalize_for(img: &DynamicImage, format: Format) -> DynamicImage {
    let has_alpha = img.color().has_alpha();
    match (format, img) {
        (Format::Png | Format::Tiff, DynamicImage::ImageLuma8(_))
        | (Format::Png | Format::Tiff, DynamicImage::ImageRgb8(_))
        | (Format::Png | Format::Tiff, DynamicImage::ImageRgba8(_))
        | (Format::Png, DynamicImage::ImageLumaA8(_))
        | (Format::WebP, DynamicImage::ImageRgb8(_))
        | (Format::WebP, DynamicImage::ImageRgba8(_)) => img.clone(),
        _ if has_alpha => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

/// Encode then decode, so the payload reflects what `format` can hold
/// (JPEG drops alpha, GIF quantizes to a palette).
pub fn round_trip(
    img: &DynamicImage,
    format: Format,
    options: &EncodeOptions,
) -> Result<DynamicImage, EncodeError> {
    let body = encode_still(img, format, options)?;
    decode_still(&body)
        .map(|(img, _)| img)
        .map_err(|e| EncodeError::Failed {
            format: format.tag().to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128, 255])
        }))
    }

    #[test]
    fn every_raster_format_encodes_and_sniffs_back() {
        let img = gradient(40, 30);
        for format in [Format::Jpeg, Format::Png, Format::Gif, Format::WebP, Format::Tiff] {
            let body = encode_still(&img, format, &EncodeOptions::default()).unwrap();
            assert_eq!(sniff(&body).unwrap(), format);
            assert_eq!(dimensions_of(&body).unwrap(), Dimensions::new(40, 30));
        }
    }

    #[test]
    fn svg_cannot_be_encoded() {
        let err = encode_still(&gradient(4, 4), Format::Svg, &EncodeOptions::default());
        assert!(matches!(err, Err(EncodeError::Unsupported(_))));
    }

    #[test]
    fn svg_source_is_reported_as_unsupported() {
        let svg = br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"/>"#;
        assert!(matches!(sniff(svg), Err(DecodeError::Unsupported(_))));
    }

    #[test]
    fn garbage_is_unknown() {
        assert!(matches!(
            sniff(b"definitely not an image"),
            Err(DecodeError::UnknownFormat)
        ));
    }

    #[test]
    fn truncated_png_is_malformed() {
        let body = encode_still(&gradient(16, 16), Format::Png, &EncodeOptions::default()).unwrap();
        let truncated = &body[..body.len() / 2];
        assert!(matches!(
            decode_still(truncated),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn jpeg_round_trip_drops_alpha() {
        let out = round_trip(&gradient(8, 8), Format::Jpeg, &EncodeOptions::default()).unwrap();
        assert!(!out.color().has_alpha());
        assert_eq!((out.width(), out.height()), (8, 8));
    }

    #[test]
    fn gif_frames_survive_encoding() {
        let frames: Vec<Frame> = (0..3)
            .map(|i| Frame::new(RgbaImage::from_pixel(10, 6, Rgba([i * 80, 0, 0, 255]))))
            .collect();
        let body = encode_frames(frames).unwrap();
        let decoded = decode_frames(&body).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].buffer().dimensions(), (10, 6));
    }
}
