//! Built-in codecs backed by the `image` crate.

use image::{DynamicImage, ImageFormat, ImageResult};
use std::io::Cursor;

/// Decodes one image format from raw bytes.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> ImageResult<DynamicImage>;
}

/// Encodes a decoded image into one format.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, image: &DynamicImage, out: &mut Vec<u8>) -> ImageResult<()>;
}

/// Decoder and encoder for a single [`ImageFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCodec(pub ImageFormat);

impl ImageDecoder for FormatCodec {
    fn decode(&self, bytes: &[u8]) -> ImageResult<DynamicImage> {
        image::load_from_memory_with_format(bytes, self.0)
    }
}

impl ImageEncoder for FormatCodec {
    fn encode(&self, image: &DynamicImage, out: &mut Vec<u8>) -> ImageResult<()> {
        let mut cursor = Cursor::new(out);
        match self.0 {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => {
                DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut cursor, self.0)
            }
            format => image.write_to(&mut cursor, format),
        }
    }
}

/// Built-in codec for a normalized extension (`png`, `webp`, ...).
pub fn builtin_codec(ext: &str) -> Option<FormatCodec> {
    let format = match ext {
        "png" => ImageFormat::Png,
        "webp" => ImageFormat::WebP,
        "jpg" | "jpeg" => ImageFormat::Jpeg,
        "gif" => ImageFormat::Gif,
        "bmp" => ImageFormat::Bmp,
        _ => return None,
    };
    Some(FormatCodec(format))
}
