/*!
Decoding of embedded raster images for document rendering.

`loupe-image` reconstructs a renderer-ready pixel buffer from one parsed
image dictionary and its encoded byte stream: samples are unpacked at
arbitrary bit depths, remapped through the decode array, combined with
soft/stencil/color-key masks into an alpha plane, un-blended from a matte
color, and emitted as packed 1-bpp grayscale, 24-bpp RGB or 32-bpp RGBA.

Entropy decoding (flate, CCITT, DCT, JPX, JBIG2) and indirect-object
resolution are the host's concern; they are reached through the
[`stream::ByteSource`] and [`stream::NativeDecoder`] seams, and objects
arrive fully dereferenced.

# Example
```rust
use loupe_image::object::{Dict, Object, keys};
use loupe_image::stream::{Filter, MemorySource, Stream};
use loupe_image::{DownscalePolicy, ImageKind, RasterImage};

let mut dict = Dict::new();
dict.insert(keys::WIDTH, Object::Int(1));
dict.insert(keys::HEIGHT, Object::Int(1));
dict.insert(keys::BITS_PER_COMPONENT, Object::Int(8));
dict.insert(keys::COLORSPACE, Object::Name("DeviceRGB".into()));

let source = MemorySource::decoded(vec![10, 20, 30], Filter::Flate);
let stream = Stream::new(dict, Box::new(source));

let image = RasterImage::build(stream, |_| None, None, &DownscalePolicy::default()).unwrap();
let decoded = image.into_image_data(false).unwrap();

assert_eq!(decoded.kind, ImageKind::Rgb24Bpp);
assert_eq!(decoded.data, vec![10, 20, 30]);
```

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

pub mod color;
mod downscale;
pub mod error;
mod image;
pub mod object;
pub mod stream;

pub use downscale::DownscalePolicy;
pub use error::{DecodeError, FormatError};
pub use image::{RasterImage, Samples, create_mask};

/// A decoded image, ready for compositing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// The pixel layout of `data`.
    pub kind: ImageKind,
    /// The width of the buffer in pixels.
    pub width: u32,
    /// The height of the buffer in pixels.
    pub height: u32,
    /// The pixel data.
    pub data: Vec<u8>,
}

/// The pixel layout of a decoded image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Packed bits, MSB first, each row aligned to a whole byte.
    Grayscale1Bpp,
    /// Interleaved R, G, B, tightly packed.
    Rgb24Bpp,
    /// Interleaved R, G, B, A, tightly packed.
    Rgba32Bpp,
}
