use anyhow::{anyhow, Result};

use crate::frame::FrameSize;

/// Expand packed RGB24 into RGBA with an opaque alpha channel.
pub(crate) fn rgb_to_rgba(pixels: &[u8], size: FrameSize) -> Result<Vec<u8>> {
    let expected = (size.width as usize)
        .checked_mul(size.height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgba = Vec::with_capacity(expected / 3 * 4);
    for px in pixels.chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
    }
    Ok(rgba)
}
