//! Image objects: construction from the parsed dictionary and decoding into
//! renderer-ready pixel buffers.

use crate::color::{ColorSpace, is_identity_decode};
use crate::downscale::{self, DownscalePolicy};
use crate::error::{DecodeError, FormatError, Result, bail, err};
use crate::object::keys::*;
use crate::object::{Name, Object};
use crate::stream::{Filter, NativeDecoder, SampleLayout, Stream};
use crate::{ImageData, ImageKind};
use log::warn;
use loupe_common::bit::BitReader;
use smallvec::SmallVec;
use std::borrow::Cow;

/// A sample buffer produced by the bit unpacker, in the smallest element
/// width that fits the image's bits per component.
pub enum Samples<'a> {
    /// Up to 8 bits per component. At exactly 8 this borrows the raw
    /// buffer instead of copying it.
    Bytes(Cow<'a, [u8]>),
    /// 16 bits per component.
    Words(Vec<u16>),
}

impl Samples<'_> {
    /// The sample at `index`, or zero past the end of truncated data.
    #[inline]
    pub fn get(&self, index: usize) -> u16 {
        match self {
            Samples::Bytes(bytes) => bytes.get(index).copied().map(u16::from).unwrap_or(0),
            Samples::Words(words) => words.get(index).copied().unwrap_or(0),
        }
    }

    /// The number of samples in the buffer.
    pub fn len(&self) -> usize {
        match self {
            Samples::Bytes(bytes) => bytes.len(),
            Samples::Words(words) => words.len(),
        }
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-component affine remap precomputed from a non-default decode array:
/// `decoded = addend + coefficient · raw`, saturating at the component range.
struct DecodeMap {
    addends: SmallVec<[f32; 4]>,
    coefficients: SmallVec<[f32; 4]>,
}

impl DecodeMap {
    fn new(decode: &[f32], bpc: u8, num_comps: u8) -> Self {
        let max = ((1u32 << bpc) - 1) as f32;
        let mut addends = SmallVec::new();
        let mut coefficients = SmallVec::new();

        for j in 0..num_comps as usize {
            let (min, max_d) = match decode.get(2 * j..2 * j + 2) {
                Some(pair) => (pair[0], pair[1]),
                // Short arrays leave the remaining components untouched.
                None => (0.0, 1.0),
            };

            addends.push(max * min);
            coefficients.push(max_d - min);
        }

        Self {
            addends,
            coefficients,
        }
    }
}

/// The auxiliary mask attached to an image.
enum Mask {
    None,
    /// A 1-bpc sub-image whose set samples mark unpainted pixels.
    Stencil(Box<RasterImage>),
    /// Per-component (min, max) ranges; pixels whose raw samples all fall
    /// inside their range become transparent.
    ColorKey(SmallVec<[u16; 8]>),
}

/// One embedded raster image, ready to be decoded exactly once.
pub struct RasterImage {
    stream: Stream,
    width: u32,
    height: u32,
    draw_width: u32,
    draw_height: u32,
    bpc: u8,
    num_comps: u8,
    color_space: Option<ColorSpace>,
    decode: Option<DecodeMap>,
    interpolate: bool,
    is_image_mask: bool,
    smask: Option<Box<RasterImage>>,
    mask: Mask,
    matte: Option<SmallVec<[f32; 4]>>,
    policy: DownscalePolicy,
}

impl RasterImage {
    /// Build an image object from its encoded stream.
    ///
    /// `resolve_cs` resolves color spaces referenced by name, which inline
    /// images look up in the surrounding resources. `native` is an optional
    /// host fast path for JPEG/JPX streams; when it accepts a stream, its
    /// decoded output replaces the encoded bytes. Soft-mask and
    /// stencil-mask sub-images are built recursively and owned by the
    /// returned image.
    pub fn build(
        stream: Stream,
        resolve_cs: impl Fn(&Name) -> Option<ColorSpace>,
        native: Option<&dyn NativeDecoder>,
        policy: &DownscalePolicy,
    ) -> Result<Self> {
        let mut stream = native_decode(stream, native)?;

        let smask_obj = stream.dict_mut().take(SMASK);
        // A soft mask shadows any stencil or color-key mask.
        let mask_obj = if matches!(smask_obj, Some(Object::Stream(_))) {
            stream.dict_mut().take(MASK);
            None
        } else {
            stream.dict_mut().take(MASK)
        };

        let smask = match smask_obj {
            Some(Object::Stream(sub)) => {
                let sub = native_decode(sub, native)?;
                Some(Box::new(Self::parse(sub, &resolve_cs, policy, false)?))
            }
            None | Some(Object::Null) => None,
            Some(_) => {
                warn!("ignoring soft mask in an unexpected shape");
                None
            }
        };

        let mask = match mask_obj {
            None | Some(Object::Null) => Mask::None,
            Some(object) => match parse_mask(object, &resolve_cs, native, policy) {
                Ok(mask) => mask,
                Err(DecodeError::Format(FormatError::UnsupportedMask)) => {
                    warn!("ignoring mask in an unexpected shape");
                    Mask::None
                }
                Err(e) => return Err(e),
            },
        };

        let mut image = Self::parse(stream, &resolve_cs, policy, false)?;
        image.smask = smask;
        image.mask = mask;

        // The emitted buffer covers the largest attached plane.
        let (mut draw_width, mut draw_height) = (image.width, image.height);
        if let Some(sub) = &image.smask {
            draw_width = draw_width.max(sub.width);
            draw_height = draw_height.max(sub.height);
        }
        if let Mask::Stencil(sub) = &image.mask {
            draw_width = draw_width.max(sub.width);
            draw_height = draw_height.max(sub.height);
        }
        image.draw_width = draw_width;
        image.draw_height = draw_height;
        image.stream.set_draw_size(draw_width, draw_height);

        Ok(image)
    }

    /// Parse the image dictionary into an image without attached masks.
    /// `is_mask` marks a stencil-mask sub-image.
    fn parse(
        stream: Stream,
        resolve_cs: &impl Fn(&Name) -> Option<ColorSpace>,
        policy: &DownscalePolicy,
        is_mask: bool,
    ) -> Result<Self> {
        let dict = stream.dict();

        let width = dict
            .get::<u32>(WIDTH)
            .or_else(|| dict.get::<u32>(W))
            .unwrap_or(0);
        let height = dict
            .get::<u32>(HEIGHT)
            .or_else(|| dict.get::<u32>(H))
            .unwrap_or(0);

        if width < 1 || height < 1 {
            bail!(FormatError::InvalidDimensions);
        }

        let image_mask = is_mask
            || dict
                .get::<bool>(IMAGE_MASK)
                .or_else(|| dict.get::<bool>(IM))
                .unwrap_or(false);

        let interpolate = dict
            .get::<bool>(INTERPOLATE)
            .or_else(|| dict.get::<bool>(I))
            .unwrap_or(false);

        let matte = dict
            .get::<Vec<f32>>(MATTE)
            .map(|m| m.into_iter().collect::<SmallVec<_>>());

        // Self-describing codestreams carry their own sample geometry.
        let layout = match stream.filter() {
            Filter::Jbig2 => Some(SampleLayout {
                bits_per_component: 1,
                num_components: 1,
            }),
            _ => stream.layout(),
        };

        let dict_bpc = dict
            .get::<u8>(BITS_PER_COMPONENT)
            .or_else(|| dict.get::<u8>(BPC))
            .or(layout.map(|l| l.bits_per_component));

        let bpc = if image_mask {
            if let Some(bpc) = dict_bpc
                && bpc != 1
            {
                warn!("image mask with {bpc} bits per component");
            }

            1
        } else {
            match dict_bpc {
                Some(bpc) => bpc,
                None => bail!(FormatError::MissingBitsPerComponent),
            }
        };

        if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
            warn!("unsupported bits per component: {bpc}");
            bail!(DecodeError::Unsupported);
        }

        let color_space = if image_mask {
            None
        } else {
            let cs_obj = dict.get_raw(COLORSPACE).or_else(|| dict.get_raw(CS));
            let resolved = cs_obj.and_then(|object| {
                ColorSpace::new(object).or_else(|| match object {
                    Object::Name(name) => resolve_cs(name),
                    _ => None,
                })
            });

            match resolved {
                Some(cs) => Some(cs),
                None if stream.filter() == Filter::Jpx => {
                    // JPX codestreams may omit the dictionary color space;
                    // infer it from the component count.
                    let num_comps = layout.map(|l| l.num_components).unwrap_or(0);

                    match num_comps {
                        1 => Some(ColorSpace::DeviceGray),
                        3 => Some(ColorSpace::DeviceRgb),
                        4 => Some(ColorSpace::DeviceCmyk),
                        _ => {
                            warn!("JPX image with {num_comps} components");
                            bail!(DecodeError::Unsupported);
                        }
                    }
                }
                None => {
                    warn!("unresolved color space, assuming device gray");
                    Some(ColorSpace::DeviceGray)
                }
            }
        };

        let num_comps = color_space.as_ref().map(|cs| cs.num_components()).unwrap_or(1);

        let decode_arr = dict
            .get::<Vec<f32>>(DECODE)
            .or_else(|| dict.get::<Vec<f32>>(D));
        let decode = decode_arr.and_then(|arr| {
            let is_default = match &color_space {
                Some(cs) => cs.is_default_decode(&arr, bpc),
                // Stencil masks decode over [0, 1].
                None => is_identity_decode(&arr),
            };

            (!is_default).then(|| DecodeMap::new(&arr, bpc, num_comps))
        });

        Ok(Self {
            stream,
            width,
            height,
            draw_width: width,
            draw_height: height,
            bpc,
            num_comps,
            color_space,
            decode,
            interpolate,
            is_image_mask: image_mask,
            smask: None,
            mask: Mask::None,
            matte,
            policy: policy.clone(),
        })
    }

    /// The width of the image in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The height of the image in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The dimensions of the buffer [`into_image_data`] will emit.
    ///
    /// [`into_image_data`]: Self::into_image_data
    pub fn draw_size(&self) -> (u32, u32) {
        (self.draw_width, self.draw_height)
    }

    /// Whether the renderer should smooth the image when scaling.
    pub fn interpolate(&self) -> bool {
        self.interpolate
    }

    /// Whether this image is a stencil mask rather than a color image.
    pub fn is_image_mask(&self) -> bool {
        self.is_image_mask
    }

    /// Decode the image into its output pixel buffer, consuming it.
    ///
    /// `force_rgba` always yields [`ImageKind::Rgba32Bpp`]; otherwise the
    /// cheapest layout that can represent the image is chosen.
    pub fn into_image_data(mut self, force_rgba: bool) -> Result<ImageData> {
        let has_mask = self.smask.is_some() || !matches!(self.mask, Mask::None);
        let dims_match = self.draw_width == self.width && self.draw_height == self.height;
        let is_device_gray = matches!(self.color_space, Some(ColorSpace::DeviceGray));

        if !force_rgba && !has_mask && dims_match {
            if is_device_gray && self.bpc == 1 {
                return self.into_gray_1bpp();
            }

            // A DCT decoder hands out ready-to-use RGB rows once asked for
            // them, whatever the stream's native layout is.
            let device_cs = matches!(
                self.color_space,
                Some(ColorSpace::DeviceGray | ColorSpace::DeviceRgb | ColorSpace::DeviceCmyk)
            );
            if device_cs && self.stream.filter() == Filter::Dct {
                self.stream.set_force_rgb(true);
                self.stream.reset();
                let data = self
                    .stream
                    .read_bytes(self.width as usize * self.height as usize * 3);

                return Ok(ImageData {
                    kind: ImageKind::Rgb24Bpp,
                    width: self.width,
                    height: self.height,
                    data,
                });
            }

            if matches!(self.color_space, Some(ColorSpace::DeviceRgb))
                && self.bpc == 8
                && self.decode.is_none()
            {
                self.stream.reset();
                let data = self
                    .stream
                    .read_bytes(self.width as usize * self.height as usize * 3);

                return Ok(ImageData {
                    kind: ImageKind::Rgb24Bpp,
                    width: self.width,
                    height: self.height,
                    data,
                });
            }
        }

        let (mut width, mut height) = (self.width, self.height);
        let (mut draw_width, mut draw_height) = (self.draw_width, self.draw_height);
        let mut row_bytes =
            (width as usize * self.num_comps as usize * self.bpc as usize).div_ceil(8);

        self.stream.reset();
        let mut data = self.stream.read_bytes(row_bytes * height as usize);

        // Oversized grayscale images are decimated before unpacking.
        if is_device_gray
            && !has_mask
            && dims_match
            && downscale::shall_resize(self.num_comps, self.bpc)
        {
            let scale_bits = self.policy.scale_bits(width, height);

            if scale_bits > 0 {
                let (scaled, new_width, new_height) = if self.bpc == 1 {
                    downscale::downscale_bilevel(&data, width, height, scale_bits)
                } else {
                    downscale::downscale_gray(&data, width, height, scale_bits)
                };

                data = scaled;
                width = new_width;
                height = new_height;
                draw_width = new_width;
                draw_height = new_height;
                row_bytes =
                    (width as usize * self.num_comps as usize * self.bpc as usize).div_ceil(8);
            }
        }

        // Truncated streams (CCITT fax in particular may under-deliver)
        // drop the missing pixel rows instead of failing.
        let actual_height = ((data.len() as u64 * draw_height as u64)
            / (row_bytes as u64 * height as u64).max(1))
        .min(draw_height as u64) as u32;

        let mut samples = self.components(&data);

        let (kind, stride, alpha01) = if !force_rgba && !has_mask {
            (ImageKind::Rgb24Bpp, 3, 0)
        } else {
            (ImageKind::Rgba32Bpp, 4, 1)
        };
        let mut out = vec![0u8; stride * draw_width as usize * draw_height as usize];

        if alpha01 == 1 {
            // Color-key masking reads raw sample values, so opacity comes
            // before the decode remap.
            self.fill_opacity(&mut out, draw_width, draw_height, &samples)?;
        }

        self.decode_samples(&mut samples);

        let color_space = self
            .color_space
            .clone()
            .unwrap_or(ColorSpace::DeviceGray);
        color_space.fill_rgb(
            &mut out,
            width,
            height,
            draw_width,
            draw_height,
            actual_height,
            self.bpc,
            &samples,
            alpha01,
        );

        if alpha01 == 1 {
            self.undo_preblend(&mut out);
        }

        Ok(ImageData {
            kind,
            width: draw_width,
            height: draw_height,
            data: out,
        })
    }

    /// The packed passthrough for 1-bpc DeviceGray images: the stream bytes
    /// already are the output buffer.
    fn into_gray_1bpp(mut self) -> Result<ImageData> {
        let row_bytes = (self.width as usize).div_ceil(8);
        let length = row_bytes * self.height as usize;

        self.stream.reset();
        // Transfer the buffer when the source owns it, copy otherwise.
        let mut data = match self.stream.take_bytes(length) {
            Some(data) => data,
            None => self.stream.read_bytes(length),
        };

        if self.decode.is_some() {
            for byte in &mut data {
                *byte ^= 0xFF;
            }
        }

        let (mut width, mut height) = (self.width, self.height);
        let scale_bits = self.policy.scale_bits(width, height);

        if scale_bits > 0 {
            let (scaled, new_width, new_height) =
                downscale::downscale_bilevel(&data, width, height, scale_bits);
            data = scaled;
            width = new_width;
            height = new_height;
        }

        Ok(ImageData {
            kind: ImageKind::Grayscale1Bpp,
            width,
            height,
            data,
        })
    }

    /// Decode a single-channel image into an 8-bit gray buffer of
    /// width · height bytes, as the mask engine consumes it.
    pub fn fill_gray_buffer(&mut self, buffer: &mut [u8]) -> Result<()> {
        if self.num_comps != 1 {
            bail!(FormatError::NotGrayscale);
        }

        let row_bytes = (self.width as usize * self.bpc as usize).div_ceil(8);

        self.stream.reset();
        let data = self.stream.read_bytes(row_bytes * self.height as usize);
        let mut samples = self.components(&data);

        let length = (self.width as usize * self.height as usize).min(buffer.len());

        if self.bpc == 1 {
            if self.decode.is_some() {
                for (i, slot) in buffer.iter_mut().enumerate().take(length) {
                    *slot = (samples.get(i).wrapping_sub(1) & 255) as u8;
                }
            } else {
                for (i, slot) in buffer.iter_mut().enumerate().take(length) {
                    *slot = (samples.get(i).wrapping_neg() & 255) as u8;
                }
            }

            return Ok(());
        }

        self.decode_samples(&mut samples);

        let scale = 255.0 / ((1u32 << self.bpc) - 1) as f32;
        for (i, slot) in buffer.iter_mut().enumerate().take(length) {
            *slot = (samples.get(i) as f32 * scale) as u8;
        }

        Ok(())
    }

    /// Unpack raw bytes into `width · height · num_comps` fixed-width
    /// samples. Each pixel row starts on a byte boundary.
    fn components<'a>(&self, data: &'a [u8]) -> Samples<'a> {
        let per_row = self.width as usize * self.num_comps as usize;

        match self.bpc {
            8 => Samples::Bytes(Cow::Borrowed(data)),
            16 => {
                let mut reader = BitReader::new(data);
                let mut out = Vec::with_capacity(per_row * self.height as usize);

                for _ in 0..self.height {
                    for _ in 0..per_row {
                        out.push(reader.read(16).unwrap_or(0) as u16);
                    }

                    reader.align();
                }

                Samples::Words(out)
            }
            bpc => {
                let mut reader = BitReader::new(data);
                let mut out = Vec::with_capacity(per_row * self.height as usize);

                for _ in 0..self.height {
                    for _ in 0..per_row {
                        // Truncated rows unpack as zero samples.
                        out.push(reader.read(bpc).unwrap_or(0) as u8);
                    }

                    reader.align();
                }

                Samples::Bytes(Cow::Owned(out))
            }
        }
    }

    /// Apply the per-component decode remap in place.
    fn decode_samples(&self, samples: &mut Samples<'_>) {
        let Some(map) = &self.decode else {
            return;
        };

        if self.bpc == 1 {
            if let Samples::Bytes(bytes) = samples {
                for value in bytes.to_mut() {
                    *value ^= 1;
                }
            }

            return;
        }

        let max = ((1u32 << self.bpc) - 1) as f32;
        let num_comps = self.num_comps as usize;

        match samples {
            Samples::Bytes(bytes) => {
                for (i, value) in bytes.to_mut().iter_mut().enumerate() {
                    let j = i % num_comps;
                    let decoded = map.addends[j] + map.coefficients[j] * (*value as f32);
                    *value = decoded.clamp(0.0, max) as u8;
                }
            }
            Samples::Words(words) => {
                for (i, value) in words.iter_mut().enumerate() {
                    let j = i % num_comps;
                    let decoded = map.addends[j] + map.coefficients[j] * (*value as f32);
                    *value = decoded.clamp(0.0, max) as u16;
                }
            }
        }
    }

    /// Fill the alpha channel of an RGBA buffer from the attached mask.
    fn fill_opacity(
        &mut self,
        rgba: &mut [u8],
        width: u32,
        height: u32,
        samples: &Samples<'_>,
    ) -> Result<()> {
        let pixels = width as usize * height as usize;

        if let Some(smask) = self.smask.as_mut() {
            let (sub_width, sub_height) = (smask.width, smask.height);
            let mut alpha = vec![0u8; sub_width as usize * sub_height as usize];
            smask.fill_gray_buffer(&mut alpha)?;

            if (sub_width, sub_height) != (width, height) {
                alpha = downscale::resize_nearest(&alpha, sub_width, sub_height, width, height);
            }

            for (i, a) in alpha.iter().take(pixels).enumerate() {
                rgba[i * 4 + 3] = *a;
            }
        } else if let Mask::Stencil(mask) = &mut self.mask {
            let (sub_width, sub_height) = (mask.width, mask.height);
            let mut alpha = vec![0u8; sub_width as usize * sub_height as usize];
            mask.fill_gray_buffer(&mut alpha)?;

            // A set stencil sample marks a pixel that is not painted.
            for a in &mut alpha {
                *a = 255 - *a;
            }

            if (sub_width, sub_height) != (width, height) {
                alpha = downscale::resize_nearest(&alpha, sub_width, sub_height, width, height);
            }

            for (i, a) in alpha.iter().take(pixels).enumerate() {
                rgba[i * 4 + 3] = *a;
            }
        } else if let Mask::ColorKey(ranges) = &self.mask {
            let num_comps = self.num_comps as usize;
            let pairs = num_comps.min(ranges.len() / 2);

            for i in 0..pixels {
                let mut opacity = 0;

                for j in 0..pairs {
                    let value = samples.get(i * num_comps + j);

                    if value < ranges[2 * j] || value > ranges[2 * j + 1] {
                        opacity = 255;
                        break;
                    }
                }

                rgba[i * 4 + 3] = opacity;
            }
        } else {
            for pixel in rgba.chunks_exact_mut(4) {
                pixel[3] = 255;
            }
        }

        Ok(())
    }

    /// Reverse matte pre-multiplication using the decoded alpha plane.
    fn undo_preblend(&self, rgba: &mut [u8]) {
        let Some(matte) = self.smask.as_ref().and_then(|sub| sub.matte.as_ref()) else {
            return;
        };
        let Some(color_space) = &self.color_space else {
            return;
        };

        let [matte_r, matte_g, matte_b] = color_space.get_rgb(matte);
        let matte = [matte_r as f32, matte_g as f32, matte_b as f32];

        for pixel in rgba.chunks_exact_mut(4) {
            let alpha = pixel[3];

            if alpha == 0 {
                // White is a safe paper color.
                pixel[..3].fill(255);
                continue;
            }

            let k = 255.0 / alpha as f32;
            for (channel, m) in pixel[..3].iter_mut().zip(matte) {
                *channel = ((*channel as f32 - m) * k + m).clamp(0.0, 255.0) as u8;
            }
        }
    }
}

fn native_decode(stream: Stream, native: Option<&dyn NativeDecoder>) -> Result<Stream> {
    match native {
        Some(decoder) if decoder.can_decode(&stream) => decoder.decode(stream),
        _ => Ok(stream),
    }
}

/// Classify a mask entry. Shapes the engine cannot represent surface as
/// [`FormatError::UnsupportedMask`]; the factory downgrades that to a
/// warning and drops the mask.
fn parse_mask(
    object: Object,
    resolve_cs: &impl Fn(&Name) -> Option<ColorSpace>,
    native: Option<&dyn NativeDecoder>,
    policy: &DownscalePolicy,
) -> Result<Mask> {
    match object {
        Object::Stream(sub) => {
            if !sub.dict().contains_key(IMAGE_MASK) && !sub.dict().contains_key(IM) {
                warn!("ignoring mask whose dictionary lacks an image-mask flag");
                return Ok(Mask::None);
            }

            let sub = native_decode(sub, native)?;

            Ok(Mask::Stencil(Box::new(RasterImage::parse(
                sub, resolve_cs, policy, true,
            )?)))
        }
        Object::Array(items) => {
            let ranges = items
                .iter()
                .map(|item| match item {
                    Object::Int(i) => u16::try_from(*i).ok(),
                    _ => None,
                })
                .collect::<Option<SmallVec<_>>>();

            match ranges {
                Some(ranges) => Ok(Mask::ColorKey(ranges)),
                None => err!(FormatError::UnsupportedMask),
            }
        }
        _ => err!(FormatError::UnsupportedMask),
    }
}

/// Build a packed 1-bpp stencil buffer from raw mask bytes.
///
/// The output always spans `ceil(width / 8) · height` bytes. Short input is
/// padded, with set bits when `inverse_decode` holds and clear bits
/// otherwise, and the received portion is bit-negated when `inverse_decode`.
/// A buffer that already has the right length and came from a decode stream
/// is reused without copying.
pub fn create_mask(
    data: Vec<u8>,
    width: u32,
    height: u32,
    from_decode_stream: bool,
    inverse_decode: bool,
) -> ImageData {
    let expected = (width as usize).div_ceil(8) * height as usize;
    let received = data.len().min(expected);

    let mut out = if from_decode_stream && data.len() == expected {
        data
    } else {
        let mut buffer = vec![0u8; expected];
        buffer[..received].copy_from_slice(&data[..received]);

        if inverse_decode {
            buffer[received..].fill(0xFF);
        }

        buffer
    };

    if inverse_decode {
        for byte in &mut out[..received] {
            *byte = !*byte;
        }
    }

    ImageData {
        kind: ImageKind::Grayscale1Bpp,
        width,
        height,
        data: out,
    }
}
