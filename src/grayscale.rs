//! In-place luminance grayscale over RGBA buffers.

/// Rec. 601 luma weights scaled by 1000.
const WEIGHT_R: u32 = 299;
const WEIGHT_G: u32 = 587;
const WEIGHT_B: u32 = 114;

/// Luminance of one pixel, rounded to the nearest integer.
///
/// The weights sum to exactly 1000, so a pixel with R = G = B maps to itself.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let weighted = WEIGHT_R * r as u32 + WEIGHT_G * g as u32 + WEIGHT_B * b as u32;
    ((weighted + 500) / 1000) as u8
}

/// Replace R, G and B of every pixel with its luminance. Alpha is untouched.
///
/// `pixels` must be a rectangular RGBA buffer (length a multiple of 4).
pub fn to_grayscale(pixels: &mut [u8]) {
    debug_assert_eq!(pixels.len() % 4, 0, "grayscale expects an RGBA buffer");
    for px in pixels.chunks_exact_mut(4) {
        let l = luminance(px[0], px[1], px[2]);
        px[0] = l;
        px[1] = l;
        px[2] = l;
    }
}
