//! Deterministic frame enhancement.
//!
//! Gray-world white balance followed by a linear contrast stretch. Both
//! passes are pure integer-in, integer-out transforms: the same input bytes
//! always produce the same output bytes, keeping enhanced frames comparable
//! across runs.

use image::RgbImage;
use thiserror::Error;

/// Internal enhancement failure.
///
/// Never escapes the capture stage; the caller falls back to the
/// unenhanced frame.
#[derive(Debug, Error)]
pub enum EnhanceError {
    /// The frame has no pixels.
    #[error("empty frame")]
    EmptyFrame,
}

/// Applies white-balance correction and contrast stretching.
///
/// # Errors
///
/// Returns [`EnhanceError::EmptyFrame`] for a zero-dimension image.
pub fn enhance(image: &RgbImage) -> Result<RgbImage, EnhanceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EnhanceError::EmptyFrame);
    }

    let balanced = gray_world_balance(image);
    Ok(contrast_stretch(&balanced))
}

/// Gray-world white balance: scale each channel so its mean matches the
/// global mean.
fn gray_world_balance(image: &RgbImage) -> RgbImage {
    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        for (c, sum) in sums.iter_mut().enumerate() {
            *sum += u64::from(pixel[c]);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let n = (u64::from(image.width()) * u64::from(image.height())) as f64;
    #[allow(clippy::cast_precision_loss)]
    let means = [
        sums[0] as f64 / n,
        sums[1] as f64 / n,
        sums[2] as f64 / n,
    ];
    let gray = (means[0] + means[1] + means[2]) / 3.0;

    // A channel with mean zero carries no information to rebalance.
    let gains = means.map(|m| if m > 0.0 { gray / m } else { 1.0 });

    map_pixels(image, |c, v| {
        let scaled = f64::from(v) * gains[c];
        clamp_u8(scaled)
    })
}

/// Linear contrast stretch of the global [min, max] range onto [0, 255].
fn contrast_stretch(image: &RgbImage) -> RgbImage {
    let mut lo = u8::MAX;
    let mut hi = u8::MIN;
    for pixel in image.pixels() {
        for c in 0..3 {
            lo = lo.min(pixel[c]);
            hi = hi.max(pixel[c]);
        }
    }

    // Flat frames have nothing to stretch.
    if hi <= lo {
        return image.clone();
    }

    let range = f64::from(hi) - f64::from(lo);
    let lo = f64::from(lo);
    map_pixels(image, |_, v| {
        clamp_u8((f64::from(v) - lo) * 255.0 / range)
    })
}

fn map_pixels(image: &RgbImage, f: impl Fn(usize, u8) -> u8) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel[c] = f(c, pixel[c]);
        }
    }
    out
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample_frame() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, y| {
            Rgb([
                (x * 20) as u8,
                (y * 10 + 40) as u8,
                ((x + y) * 8 + 30) as u8,
            ])
        })
    }

    #[test]
    fn test_enhance_is_pure() {
        let frame = sample_frame();
        let a = enhance(&frame).expect("enhance");
        let b = enhance(&frame).expect("enhance");
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_enhance_stretches_to_full_range() {
        let frame = sample_frame();
        let enhanced = enhance(&frame).expect("enhance");

        let mut lo = u8::MAX;
        let mut hi = u8::MIN;
        for pixel in enhanced.pixels() {
            for c in 0..3 {
                lo = lo.min(pixel[c]);
                hi = hi.max(pixel[c]);
            }
        }
        assert_eq!(lo, 0);
        assert_eq!(hi, 255);
    }

    #[test]
    fn test_enhance_flat_frame_unchanged() {
        let frame = RgbImage::from_pixel(4, 4, Rgb([77, 77, 77]));
        let enhanced = enhance(&frame).expect("enhance");
        assert_eq!(enhanced.as_raw(), frame.as_raw());
    }

    #[test]
    fn test_enhance_empty_frame_fails() {
        let frame = RgbImage::new(0, 0);
        assert!(enhance(&frame).is_err());
    }
}
