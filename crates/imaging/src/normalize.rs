//! Normalization stage: re-encode unsupported formats as PNG.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::error::TransformError;
use crate::naming::canonical_name;
use crate::types::ImageFile;

/// Encodings the platform accepts as-is.
const ACCEPTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp];

/// Returns true if `data` sniffs as an encoding the platform accepts.
pub fn is_accepted_encoding(data: &[u8]) -> bool {
    image::guess_format(data).is_ok_and(|f| ACCEPTED_FORMATS.contains(&f))
}

/// Decodes an image file, attributing failures to its name.
pub fn decode(file: &ImageFile) -> Result<DynamicImage, TransformError> {
    image::load_from_memory(&file.data).map_err(|source| TransformError::Decode {
        name: file.name.clone(),
        source,
    })
}

/// Encodes an image as PNG.
pub fn encode_png(img: &DynamicImage, name: &str) -> Result<Vec<u8>, TransformError> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|source| TransformError::Encode {
            name: name.to_string(),
            source,
        })?;
    Ok(out)
}

/// Passes accepted encodings through untouched and converts everything else
/// to PNG. Pixel dimensions are preserved exactly.
pub fn normalize(file: ImageFile) -> Result<ImageFile, TransformError> {
    if is_accepted_encoding(&file.data) {
        return Ok(file);
    }

    let img = decode(&file)?;
    let name = canonical_name(&file.name);
    let data = encode_png(&img, &name)?;
    debug!(
        from = %file.name,
        to = %name,
        width = img.width(),
        height = img.height(),
        "normalized to png"
    );

    Ok(ImageFile::new(name, data))
}
