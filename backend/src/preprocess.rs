use image::imageops::{self, FilterType};
use image::{ImageFormat, ImageReader};
use ndarray::Array4;
use std::io::Cursor;

use crate::config::{ImageConfig, ResizeMethod};

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Unsupported image format: {0}. Accepted: PNG, JPEG")]
    UnsupportedFormat(String),
}

impl From<ResizeMethod> for FilterType {
    fn from(method: ResizeMethod) -> Self {
        match method {
            ResizeMethod::Nearest => FilterType::Nearest,
            ResizeMethod::Bilinear => FilterType::Triangle,
            ResizeMethod::Bicubic => FilterType::CatmullRom,
            ResizeMethod::Gaussian => FilterType::Gaussian,
            ResizeMethod::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Turns uploaded bytes into a `(1, height, width, 3)` NHWC tensor.
///
/// Alpha is dropped and grayscale is expanded to RGB before resizing. Values
/// are divided by 255 when `config.normalize` is set.
pub fn preprocess(image_data: &[u8], config: &ImageConfig) -> Result<Array4<f32>, PreprocessError> {
    let reader = ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    match reader.format() {
        Some(ImageFormat::Png | ImageFormat::Jpeg) => {}
        Some(other) => return Err(PreprocessError::UnsupportedFormat(format!("{:?}", other))),
        None => return Err(PreprocessError::Decode("unrecognized image data".into())),
    }

    let img = reader
        .decode()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    let (width, height) = (config.width(), config.height());
    let rgb = imageops::resize(
        &img.to_rgb8(),
        width,
        height,
        config.resize_method.into(),
    );

    let scale = if config.normalize { 1.0 / 255.0 } else { 1.0 };
    let values: Vec<f32> = rgb
        .into_raw()
        .into_iter()
        .map(|v| v as f32 * scale)
        .collect();

    // RgbImage stores rows of interleaved RGB, which is already HWC order.
    Array4::from_shape_vec((1, height as usize, width as usize, 3), values)
        .map_err(|e| PreprocessError::Decode(e.to_string()))
}
