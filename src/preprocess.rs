use image::imageops::{self, FilterType};
use ndarray::Array4;

use crate::errors::{CatMoodError, Result};
use crate::ingest::UploadedImage;

/// Side length of the square the classifier was trained on.
pub const INPUT_SIZE: u32 = 224;

/// Decode an upload into the `[1, 224, 224, 3]` tensor the model expects,
/// channel values scaled to `[0, 1]`.
pub fn preprocess(image: &UploadedImage) -> Result<Array4<f32>> {
    preprocess_with_size(image, INPUT_SIZE)
}

pub fn preprocess_with_size(image: &UploadedImage, size: u32) -> Result<Array4<f32>> {
    // The decoded bitmap and the resized copy are consumed as soon as the next
    // stage has what it needs, so only the output tensor outlives this call.
    let rgb = image::load_from_memory_with_format(image.bytes(), image.format())
        .map_err(|e| CatMoodError::ImageDecodeFailed { source: e })?
        .into_rgb8();
    let resized = imageops::resize(&rgb, size, size, FilterType::Triangle);
    drop(rgb);

    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / 255.0)
        .collect();

    Ok(Array4::from_shape_vec(
        (1, size as usize, size as usize, 3),
        data,
    )?)
}
