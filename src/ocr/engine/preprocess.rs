use image::DynamicImage;

/// Grayscale (alpha flattened onto white), optional upscale, contrast stretch.
/// Returns the stretched image and a binarized copy.
pub(super) fn preprocess_for_ocr_variants(image: &DynamicImage, scale: u32) -> Vec<DynamicImage> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = image::GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = (r as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let g = (g as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let b = (b as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let value = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        luma.put_pixel(x, y, image::Luma([value]));
    }

    let resized = if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    };

    let stretched = contrast_stretch(&resized);
    let threshold = (0.65 * 255.0) as u8;
    let bin = binarize(&stretched, threshold);
    vec![
        DynamicImage::ImageLuma8(stretched),
        DynamicImage::ImageLuma8(bin),
    ]
}

pub(super) fn ocr_scale(width: u32, upscale: bool) -> u32 {
    if !upscale {
        return 1;
    }
    let max_width = 6000u32;
    let mut scale = 3u32;
    while width.saturating_mul(scale) > max_width && scale > 1 {
        scale -= 1;
    }
    scale.max(1)
}

fn contrast_stretch(image: &image::GrayImage) -> image::GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in image.pixels() {
        let value = pixel[0];
        min = min.min(value);
        max = max.max(value);
    }

    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        let value = pixel[0];
        pixel[0] = ((value.saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}

fn binarize(image: &image::GrayImage, threshold: u8) -> image::GrayImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = if pixel[0] > threshold { 255 } else { 0 };
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_respects_max_width() {
        assert_eq!(ocr_scale(800, true), 3);
        assert_eq!(ocr_scale(2500, true), 2);
        assert_eq!(ocr_scale(7000, true), 1);
        assert_eq!(ocr_scale(800, false), 1);
    }

    #[test]
    fn stretch_spans_full_range() {
        let mut img = image::GrayImage::new(2, 1);
        img.put_pixel(0, 0, image::Luma([100]));
        img.put_pixel(1, 0, image::Luma([150]));
        let out = contrast_stretch(&img);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
    }
}
