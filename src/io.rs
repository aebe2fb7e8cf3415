//! Image metadata helpers backed by the `image` crate.
//!
//! Available when the `image-io` feature is enabled. Only dimensions are
//! read here; decoding and resizing pixels for the network belongs to the
//! preprocessing step.

use crate::postprocess::ImageShape;
use crate::util::{FaceBoxesError, FaceBoxesResult};
use std::path::Path;

/// Shape of an in-memory image.
pub fn shape_of(img: &image::DynamicImage) -> ImageShape {
    ImageShape::new(img.height() as usize, img.width() as usize)
}

/// Reads the dimensions of an image file from its header.
pub fn image_shape<P: AsRef<Path>>(path: P) -> FaceBoxesResult<ImageShape> {
    let (width, height) = image::image_dimensions(path).map_err(|err| FaceBoxesError::ImageIo {
        reason: err.to_string(),
    })?;
    Ok(ImageShape::new(height as usize, width as usize))
}
