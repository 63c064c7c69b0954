use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Gaussian sigma OpenCV derives for a 5x5 kernel.
pub const DEFAULT_BLUR_SIGMA: f32 = 1.1;

/// Pixels at or below this intensity become foreground.
pub const DEFAULT_THRESHOLD: u8 = 180;

/// Single channel, smoothed copy of `image`. A non-positive sigma disables smoothing.
pub fn smoothed_gray(image: &DynamicImage, sigma: f32) -> GrayImage {
    let gray = image.to_luma8();
    if sigma > 0.0 {
        gaussian_blur_f32(&gray, sigma)
    } else {
        gray
    }
}

/// Inverse binary threshold: dark ink becomes 255, light paper becomes 0.
///
/// Equivalent to `cv2.threshold(.., cv2.THRESH_BINARY_INV)`.
pub fn threshold_inverse(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, Luma([v])) in gray.enumerate_pixels() {
        if *v <= threshold {
            out.put_pixel(x, y, Luma([255]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_inverse_and_inclusive() {
        let mut gray = GrayImage::from_pixel(3, 1, Luma([255]));
        gray.put_pixel(0, 0, Luma([180]));
        gray.put_pixel(1, 0, Luma([181]));
        let mask = threshold_inverse(&gray, 180);
        assert_eq!(mask.get_pixel(0, 0), &Luma([255]));
        assert_eq!(mask.get_pixel(1, 0), &Luma([0]));
        assert_eq!(mask.get_pixel(2, 0), &Luma([0]));
    }

    #[test]
    fn zero_sigma_skips_blur() {
        let mut gray = GrayImage::from_pixel(5, 5, Luma([255]));
        gray.put_pixel(2, 2, Luma([0]));
        let out = smoothed_gray(&DynamicImage::ImageLuma8(gray.clone()), 0.0);
        assert_eq!(out, gray);
    }

    #[test]
    fn blur_softens_isolated_specks() {
        let mut gray = GrayImage::from_pixel(9, 9, Luma([255]));
        gray.put_pixel(4, 4, Luma([0]));
        let out = smoothed_gray(&DynamicImage::ImageLuma8(gray), DEFAULT_BLUR_SIGMA);
        // A one-pixel speck no longer survives the threshold.
        assert!(out.get_pixel(4, 4)[0] > DEFAULT_THRESHOLD);
    }
}
