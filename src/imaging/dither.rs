//! Floyd–Steinberg error diffusion to black and white.
//!
//! The kernel distributes the full quantization error to four neighbours:
//!
//! ```text
//!        X   7
//!    3   5   1
//! ```
//!
//! Rows are scanned serpentine: odd rows run right to left with the kernel
//! mirrored.

use image::{DynamicImage, GrayImage, Luma};

/// Luma level that splits black from white.
const MIDPOINT: i16 = 128;

/// Dither `img` to a two-level [`GrayImage`] (values `0` and `255` only).
pub fn dither(img: &DynamicImage) -> GrayImage {
    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();
    let (w, h) = (width as usize, height as usize);

    let mut levels: Vec<i16> = luma.as_raw().iter().map(|&v| v as i16).collect();
    let mut out = GrayImage::new(width, height);

    for y in 0..h {
        let reverse = y % 2 == 1;
        let dir: isize = if reverse { -1 } else { 1 };
        for step in 0..w {
            let x = if reverse { w - 1 - step } else { step };
            let i = y * w + x;
            let old = levels[i];
            let new = if old >= MIDPOINT { 255 } else { 0 };
            out.put_pixel(x as u32, y as u32, Luma([new as u8]));

            let err = old - new;
            let mut spread = |dx: isize, dy: usize, weight: i16| {
                let nx = x as isize + dx;
                let ny = y + dy;
                if nx < 0 || nx >= w as isize || ny >= h {
                    return;
                }
                let j = ny * w + nx as usize;
                levels[j] = (levels[j] + err * weight / 16).clamp(-255, 510);
            };
            spread(dir, 0, 7);
            spread(-dir, 1, 3);
            spread(0, 1, 5);
            spread(dir, 1, 1);
        }
    }
    out
}
