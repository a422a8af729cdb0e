//! Image preprocessing shared by the BLIP vision encoders.

use blipserve_core::RgbImage;
use image::imageops::FilterType;
use ndarray::Array3;

pub const VQA_IMAGE_SIZE: u32 = 480;
pub const NLVR_IMAGE_SIZE: u32 = 384;

const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Bicubic resize to `size`x`size` and normalise to a CHW array.
pub fn normalize(image: &RgbImage, size: u32) -> Array3<f32> {
    let resized = image::imageops::resize(image, size, size, FilterType::CatmullRom);

    let mut array = Array3::zeros((3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            array[[c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }
    array
}

/// Stacks the given images into one `[B, 3, size, size]` buffer.
pub fn pixel_batch(images: &[RgbImage], size: u32) -> (Vec<usize>, Vec<f32>) {
    let side = size as usize;
    let mut data = Vec::with_capacity(images.len() * 3 * side * side);
    for image in images {
        data.extend(normalize(image, size).iter().copied());
    }
    (vec![images.len(), 3, side, side], data)
}
