use image::{imageops::FilterType, DynamicImage, ImageError, RgbImage};
use ndarray::{Array, Ix4};
use std::io::Cursor;

pub const INPUT_SIZE: u32 = 224;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub fn decode_image(image_data: &[u8]) -> Result<DynamicImage, ImageError> {
    image::ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .decode()
}

/// RGB, stretched to 224x224 regardless of aspect ratio, scaled to [0, 1]
/// and normalized per channel, in NCHW layout with a batch of one.
pub fn transform_image(img: &DynamicImage) -> Array<f32, Ix4> {
    let rgb = img.to_rgb8();
    let resized: RgbImage =
        image::imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let side = INPUT_SIZE as usize;
    Array::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.;
        (value - MEAN[c]) / STD[c]
    })
}
