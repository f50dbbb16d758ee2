//! Preprocessing and Data Augmentation
//!
//! Maps a stored 32x32 image to the CHW float vector the network consumes.
//!
//! - **Training**: random rotation, random horizontal and vertical flips,
//!   then resize
//! - **Validation**: resize only
//!
//! Pixel values are scaled to `[0, 1]`; no mean/std normalization is applied.

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for training-time augmentation
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentationConfig {
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Probability of applying vertical flip (0.0 - 1.0)
    pub vertical_flip_prob: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 30.0,
            horizontal_flip_prob: 0.5,
            vertical_flip_prob: 0.5,
        }
    }
}

/// Turns raw images into network input
#[derive(Clone, Debug)]
pub struct Preprocessor {
    image_size: u32,
    augmentation: Option<AugmentationConfig>,
}

impl Preprocessor {
    /// Deterministic pipeline: resize only
    pub fn validation(image_size: u32) -> Self {
        Self {
            image_size,
            augmentation: None,
        }
    }

    /// Randomized pipeline with the given augmentation
    pub fn training(image_size: u32, augmentation: AugmentationConfig) -> Self {
        Self {
            image_size,
            augmentation: Some(augmentation),
        }
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn is_augmenting(&self) -> bool {
        self.augmentation.is_some()
    }

    /// Run the pipeline and return `3 * size * size` floats in CHW order.
    ///
    /// Augmentation is applied only when this is a training pipeline and an
    /// RNG is supplied.
    pub fn preprocess(&self, image: &RgbImage, rng: Option<&mut ChaCha8Rng>) -> Vec<f32> {
        let mut img = DynamicImage::ImageRgb8(image.clone());

        if let (Some(config), Some(rng)) = (&self.augmentation, rng) {
            img = augment(img, config, rng);
        }

        let img = if img.dimensions() == (self.image_size, self.image_size) {
            img
        } else {
            img.resize_exact(self.image_size, self.image_size, FilterType::Triangle)
        };

        to_chw(&img.to_rgb8())
    }
}

fn augment(img: DynamicImage, config: &AugmentationConfig, rng: &mut ChaCha8Rng) -> DynamicImage {
    let mut result = img;

    if config.rotation_degrees > 0.0 {
        let angle = rng.gen_range(-config.rotation_degrees..=config.rotation_degrees);
        result = rotate(&result, angle);
    }

    if rng.gen::<f32>() < config.horizontal_flip_prob {
        result = result.fliph();
    }

    if rng.gen::<f32>() < config.vertical_flip_prob {
        result = result.flipv();
    }

    result
}

/// Rotate about the image center; pixels sampled from outside become black
fn rotate(img: &DynamicImage, angle_degrees: f32) -> DynamicImage {
    if angle_degrees.abs() < 0.1 {
        return img.clone();
    }

    let angle_rad = angle_degrees.to_radians();
    let (width, height) = img.dimensions();
    let rgb = img.to_rgb8();

    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();

    let mut output = ImageBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;

            let src_x = cx + dx * cos_a + dy * sin_a;
            let src_y = cy - dx * sin_a + dy * cos_a;

            output.put_pixel(x, y, bilinear_sample(&rgb, src_x, src_y));
        }
    }

    DynamicImage::ImageRgb8(output)
}

fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;

        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// HWC bytes to CHW floats in `[0, 1]`
fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        data[idx] = pixel[0] as f32 / 255.0;
        data[plane + idx] = pixel[1] as f32 / 255.0;
        data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn solid(value: [u8; 3]) -> RgbImage {
        ImageBuffer::from_pixel(32, 32, Rgb(value))
    }

    #[test]
    fn test_validation_output_shape_and_range() {
        let pre = Preprocessor::validation(64);
        let out = pre.preprocess(&solid([255, 0, 51]), None);

        assert_eq!(out.len(), 3 * 64 * 64);
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!(out[64 * 64].abs() < 1e-6);
        assert!((out[2 * 64 * 64] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let mut img = solid([0, 0, 0]);
        img.put_pixel(3, 4, Rgb([200, 100, 50]));
        let pre = Preprocessor::validation(64);

        assert_eq!(pre.preprocess(&img, None), pre.preprocess(&img, None));
    }

    #[test]
    fn test_training_output_shape() {
        let pre = Preprocessor::training(64, AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..5 {
            let out = pre.preprocess(&solid([10, 20, 30]), Some(&mut rng));
            assert_eq!(out.len(), 3 * 64 * 64);
        }
    }

    #[test]
    fn test_training_same_seed_same_output() {
        let mut img = solid([0, 0, 0]);
        img.put_pixel(0, 0, Rgb([255, 255, 255]));
        let pre = Preprocessor::training(64, AugmentationConfig::default());

        let a = pre.preprocess(&img, Some(&mut ChaCha8Rng::seed_from_u64(3)));
        let b = pre.preprocess(&img, Some(&mut ChaCha8Rng::seed_from_u64(3)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_horizontal_flip_always() {
        let mut img = solid([0, 0, 0]);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let config = AugmentationConfig {
            rotation_degrees: 0.0,
            horizontal_flip_prob: 1.0,
            vertical_flip_prob: 0.0,
        };
        let pre = Preprocessor::training(32, config);
        let out = pre.preprocess(&img, Some(&mut ChaCha8Rng::seed_from_u64(0)));

        // Red channel: the lit pixel moves from (0, 0) to (31, 0).
        assert_eq!(out[0], 0.0);
        assert_eq!(out[31], 1.0);
    }

    #[test]
    fn test_vertical_flip_always() {
        let mut img = solid([0, 0, 0]);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let config = AugmentationConfig {
            rotation_degrees: 0.0,
            horizontal_flip_prob: 0.0,
            vertical_flip_prob: 1.0,
        };
        let pre = Preprocessor::training(32, config);
        let out = pre.preprocess(&img, Some(&mut ChaCha8Rng::seed_from_u64(0)));

        assert_eq!(out[0], 0.0);
        assert_eq!(out[31 * 32], 1.0);
    }

    #[test]
    fn test_rotation_blackens_corners() {
        let img = DynamicImage::ImageRgb8(solid([200, 200, 200]));
        let rotated = rotate(&img, 30.0).to_rgb8();

        assert_eq!(rotated.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(rotated.get_pixel(16, 16).0, [200, 200, 200]);
    }

    #[test]
    fn test_to_chw_layout() {
        let mut img: RgbImage = ImageBuffer::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));

        assert_eq!(to_chw(&img), vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }
}
