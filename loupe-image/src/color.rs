//! Color spaces for image sample conversion.
//!
//! Only the device spaces and palette indexing are built in. Anything more
//! exotic (ICC profiles, Lab, separations) is expected to be reduced to one
//! of these by the document layer before the image reaches the engine.

use crate::image::Samples;
use crate::object::keys::*;
use crate::object::{Name, Object};
use log::warn;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

/// Per-component (min, max) decode pairs.
pub type DecodePairs = SmallVec<[(f32, f32); 4]>;

/// A color space an image's samples are interpreted in.
#[derive(Debug, Clone)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    Indexed(Indexed),
}

impl ColorSpace {
    /// Parse a color space object (a name or an indexed array).
    pub fn new(object: &Object) -> Option<ColorSpace> {
        match object {
            Object::Name(name) => Self::from_name(name),
            Object::Array(items) => {
                let mut iter = items.iter();
                let head = match iter.next()? {
                    Object::Name(n) => n,
                    _ => return None,
                };

                match head.as_str() {
                    INDEXED => {
                        let base = Self::new(iter.next()?)?;

                        if matches!(base, ColorSpace::Indexed(_)) {
                            warn!("indexed color space with an indexed base");
                            return None;
                        }

                        let hival = match iter.next()? {
                            Object::Int(i) => u8::try_from(*i).ok()?,
                            _ => return None,
                        };
                        let lookup = match iter.next()? {
                            Object::String(bytes) => bytes.clone(),
                            _ => return None,
                        };

                        Some(ColorSpace::Indexed(Indexed(Arc::new(IndexedRepr {
                            base,
                            hival,
                            lookup,
                        }))))
                    }
                    _ => {
                        warn!("unsupported color space: {}", head.as_str());
                        None
                    }
                }
            }
            _ => None,
        }
    }

    /// Parse a color space referenced by name alone.
    pub fn from_name(name: &Name) -> Option<ColorSpace> {
        match name.as_str() {
            DEVICE_GRAY | G => Some(ColorSpace::DeviceGray),
            DEVICE_RGB | RGB => Some(ColorSpace::DeviceRgb),
            DEVICE_CMYK | CMYK | "CalCMYK" => Some(ColorSpace::DeviceCmyk),
            _ => None,
        }
    }

    /// The number of components one pixel carries in this space.
    pub fn num_components(&self) -> u8 {
        match self {
            ColorSpace::DeviceGray => 1,
            ColorSpace::DeviceRgb => 3,
            ColorSpace::DeviceCmyk => 4,
            ColorSpace::Indexed(_) => 1,
        }
    }

    /// The name of the color space.
    pub fn name(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => DEVICE_GRAY,
            ColorSpace::DeviceRgb => DEVICE_RGB,
            ColorSpace::DeviceCmyk => DEVICE_CMYK,
            ColorSpace::Indexed(_) => INDEXED,
        }
    }

    /// The decode array equivalent to not remapping samples at all.
    pub fn default_decode(&self, bpc: u8) -> DecodePairs {
        match self {
            ColorSpace::DeviceGray => smallvec![(0.0, 1.0)],
            ColorSpace::DeviceRgb => smallvec![(0.0, 1.0); 3],
            ColorSpace::DeviceCmyk => smallvec![(0.0, 1.0); 4],
            ColorSpace::Indexed(_) => smallvec![(0.0, ((1u32 << bpc) - 1) as f32)],
        }
    }

    /// Whether the given decode array matches [`default_decode`].
    ///
    /// Arrays of the wrong length are reported and treated as the default.
    ///
    /// [`default_decode`]: Self::default_decode
    pub fn is_default_decode(&self, decode: &[f32], bpc: u8) -> bool {
        let default = self.default_decode(bpc);

        if decode.len() != default.len() * 2 {
            warn!("decode array of length {}, ignoring it", decode.len());
            return true;
        }

        decode
            .chunks_exact(2)
            .zip(default)
            .all(|(pair, (min, max))| pair[0] == min && pair[1] == max)
    }

    /// Convert one color in this space's component domain to RGB.
    pub(crate) fn get_rgb(&self, components: &[f32]) -> [u8; 3] {
        let comp = |i: usize| components.get(i).copied().unwrap_or(0.0);

        match self {
            ColorSpace::DeviceGray => {
                let v = to_byte(comp(0));
                [v, v, v]
            }
            ColorSpace::DeviceRgb => [to_byte(comp(0)), to_byte(comp(1)), to_byte(comp(2))],
            ColorSpace::DeviceCmyk => cmyk_to_rgb(comp(0), comp(1), comp(2), comp(3)),
            ColorSpace::Indexed(indexed) => indexed.lookup_rgb(comp(0).round() as u16),
        }
    }

    /// Convert unpacked samples to RGB, writing into `dst` at the stride
    /// implied by `alpha01` (3 for RGB output, 4 for RGBA, the alpha byte
    /// untouched) and resampling between source and destination dimensions
    /// by nearest neighbor. Rows at and past `actual_height` are left as
    /// allocated.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn fill_rgb(
        &self,
        dst: &mut [u8],
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
        actual_height: u32,
        bpc: u8,
        samples: &Samples<'_>,
        alpha01: usize,
    ) {
        let nc = self.num_components() as usize;
        let stride = 3 + alpha01;
        let max = ((1u32 << bpc) - 1) as f32;
        let scale = 255.0 / max;

        let x_scaled: Vec<usize> = (0..dst_width as u64)
            .map(|j| (j * src_width as u64 / dst_width as u64) as usize)
            .collect();

        for i in 0..dst_height.min(actual_height) as usize {
            let py = (i as u64 * src_height as u64 / dst_height as u64) as usize * src_width as usize;
            let row = i * dst_width as usize * stride;

            for (j, sx) in x_scaled.iter().enumerate() {
                let base = (py + sx) * nc;
                let rgb = match self {
                    ColorSpace::DeviceGray => {
                        let v = (samples.get(base) as f32 * scale) as u8;
                        [v, v, v]
                    }
                    ColorSpace::DeviceRgb => [
                        (samples.get(base) as f32 * scale) as u8,
                        (samples.get(base + 1) as f32 * scale) as u8,
                        (samples.get(base + 2) as f32 * scale) as u8,
                    ],
                    ColorSpace::DeviceCmyk => cmyk_to_rgb(
                        samples.get(base) as f32 / max,
                        samples.get(base + 1) as f32 / max,
                        samples.get(base + 2) as f32 / max,
                        samples.get(base + 3) as f32 / max,
                    ),
                    ColorSpace::Indexed(indexed) => indexed.lookup_rgb(samples.get(base)),
                };

                let offset = row + j * stride;
                dst[offset..offset + 3].copy_from_slice(&rgb);
            }
        }
    }
}

/// A palette-indexed color space over a device base space.
#[derive(Debug, Clone)]
pub struct Indexed(Arc<IndexedRepr>);

#[derive(Debug)]
struct IndexedRepr {
    base: ColorSpace,
    hival: u8,
    lookup: Vec<u8>,
}

impl Indexed {
    fn lookup_rgb(&self, index: u16) -> [u8; 3] {
        let repr = &*self.0;
        let index = index.min(repr.hival as u16) as usize;
        let offset = index * repr.base.num_components() as usize;
        let entry = |i: usize| repr.lookup.get(offset + i).copied().unwrap_or(0);

        match repr.base {
            ColorSpace::DeviceGray => {
                let v = entry(0);
                [v, v, v]
            }
            ColorSpace::DeviceRgb => [entry(0), entry(1), entry(2)],
            ColorSpace::DeviceCmyk => cmyk_to_rgb(
                entry(0) as f32 / 255.0,
                entry(1) as f32 / 255.0,
                entry(2) as f32 / 255.0,
                entry(3) as f32 / 255.0,
            ),
            // Rejected at parse time.
            ColorSpace::Indexed(_) => [0, 0, 0],
        }
    }
}

/// Whether a decode array is the identity over [0, 1] per component, the
/// default for stencil masks which carry no color space.
pub(crate) fn is_identity_decode(decode: &[f32]) -> bool {
    decode.chunks_exact(2).all(|pair| pair == [0.0, 1.0])
}

fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> [u8; 3] {
    let to_channel = |v: f32| ((1.0 - v) * (1.0 - k) * 255.0 + 0.5).clamp(0.0, 255.0) as u8;

    [to_channel(c), to_channel(m), to_channel(y)]
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn indexed(base: ColorSpace, hival: u8, lookup: Vec<u8>) -> ColorSpace {
        ColorSpace::Indexed(Indexed(Arc::new(IndexedRepr {
            base,
            hival,
            lookup,
        })))
    }

    #[test]
    fn from_name_covers_abbreviations() {
        assert!(matches!(
            ColorSpace::from_name(&Name::new("DeviceGray")),
            Some(ColorSpace::DeviceGray)
        ));
        assert!(matches!(
            ColorSpace::from_name(&Name::new("G")),
            Some(ColorSpace::DeviceGray)
        ));
        assert!(matches!(
            ColorSpace::from_name(&Name::new("RGB")),
            Some(ColorSpace::DeviceRgb)
        ));
        assert!(matches!(
            ColorSpace::from_name(&Name::new("CMYK")),
            Some(ColorSpace::DeviceCmyk)
        ));
        assert!(ColorSpace::from_name(&Name::new("Pattern")).is_none());
    }

    #[test]
    fn parse_indexed_array() {
        let object = Object::Array(vec![
            Object::Name("Indexed".into()),
            Object::Name("DeviceRGB".into()),
            Object::Int(1),
            Object::String(vec![255, 0, 0, 0, 255, 0]),
        ]);

        let cs = ColorSpace::new(&object).unwrap();
        assert_eq!(cs.num_components(), 1);
        assert_eq!(cs.get_rgb(&[0.0]), [255, 0, 0]);
        assert_eq!(cs.get_rgb(&[1.0]), [0, 255, 0]);
        // Out-of-range indices clamp to the highest palette entry.
        assert_eq!(cs.get_rgb(&[9.0]), [0, 255, 0]);
    }

    #[test]
    fn default_decode_shapes() {
        assert_eq!(ColorSpace::DeviceRgb.default_decode(8).as_slice(), [(0.0, 1.0); 3]);
        assert_eq!(
            indexed(ColorSpace::DeviceRgb, 3, vec![]).default_decode(4).as_slice(),
            [(0.0, 15.0)]
        );
    }

    #[test]
    fn identity_decode_is_default() {
        assert!(ColorSpace::DeviceGray.is_default_decode(&[0.0, 1.0], 8));
        assert!(!ColorSpace::DeviceGray.is_default_decode(&[1.0, 0.0], 8));
        // Wrong length falls back to the default.
        assert!(ColorSpace::DeviceRgb.is_default_decode(&[0.0, 1.0], 8));
    }

    #[test]
    fn cmyk_endpoints() {
        assert_eq!(ColorSpace::DeviceCmyk.get_rgb(&[0.0, 0.0, 0.0, 0.0]), [255, 255, 255]);
        assert_eq!(ColorSpace::DeviceCmyk.get_rgb(&[1.0, 1.0, 1.0, 1.0]), [0, 0, 0]);
        assert_eq!(ColorSpace::DeviceCmyk.get_rgb(&[0.0, 0.0, 0.0, 1.0]), [0, 0, 0]);
    }

    #[test]
    fn get_rgb_rounds_to_nearest() {
        // 50/255 must map back to exactly 50.
        let c = 50.0 / 255.0;
        assert_eq!(ColorSpace::DeviceRgb.get_rgb(&[c, c, c]), [50, 50, 50]);
    }

    #[test]
    fn fill_rgb_scales_low_bit_depths() {
        let samples = Samples::Bytes(Cow::Owned(vec![0, 15]));
        let mut dst = vec![0u8; 6];

        ColorSpace::DeviceGray.fill_rgb(&mut dst, 2, 1, 2, 1, 1, 4, &samples, 0);

        assert_eq!(dst, [0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn fill_rgb_respects_alpha_stride() {
        let samples = Samples::Bytes(Cow::Owned(vec![10, 20, 30]));
        let mut dst = vec![0xAAu8; 4];

        ColorSpace::DeviceRgb.fill_rgb(&mut dst, 1, 1, 1, 1, 1, 8, &samples, 1);

        assert_eq!(dst, [10, 20, 30, 0xAA]);
    }

    #[test]
    fn fill_rgb_resamples_nearest_neighbor() {
        // A 2x1 gray source stretched to 4x2.
        let samples = Samples::Bytes(Cow::Owned(vec![0, 255]));
        let mut dst = vec![0u8; 4 * 2 * 3];

        ColorSpace::DeviceGray.fill_rgb(&mut dst, 2, 1, 4, 2, 2, 8, &samples, 0);

        let reds: Vec<u8> = dst.chunks_exact(3).map(|px| px[0]).collect();
        assert_eq!(reds, [0, 0, 255, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn fill_rgb_leaves_rows_past_actual_height() {
        let samples = Samples::Bytes(Cow::Owned(vec![255, 255]));
        let mut dst = vec![0u8; 2 * 1 * 3 * 2];

        ColorSpace::DeviceGray.fill_rgb(&mut dst, 2, 2, 2, 2, 1, 8, &samples, 0);

        assert_eq!(&dst[..6], [255; 6]);
        assert_eq!(&dst[6..], [0; 6]);
    }
}
