use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageReader};

use crate::error::AppError;

/// Decodes an image and applies its EXIF orientation, so the pixels come out
/// the way a viewer would show them.
pub fn load_oriented(path: &Path) -> Result<DynamicImage, AppError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}
