use ndarray::Array3;
use thiserror::Error;

/// Decoded image as `(height, width, 3)` RGB samples.
pub type PixelArray = Array3<u8>;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot identify image file: {0}")]
    Format(#[from] std::io::Error),
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("invalid pixel buffer: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Decodes JPEG or PNG bytes into an RGB pixel array.
///
/// The format is sniffed from the bytes, not taken from the declared media type.
/// Alpha is dropped and grayscale or palette images are expanded to three channels.
pub fn decode_image(image_data: &[u8]) -> Result<PixelArray, DecodeError> {
    let image_reader =
        image::ImageReader::new(std::io::Cursor::new(image_data)).with_guessed_format()?;
    let rgb = image_reader.decode()?.to_rgb8();

    let (width, height) = rgb.dimensions();
    let pixels = Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw())?;

    Ok(pixels)
}
