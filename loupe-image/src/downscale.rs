//! Heuristic decimation of oversized grayscale images, and the
//! nearest-neighbor resampler used for mask planes.

use loupe_common::bit::BitWriter;

/// Thresholds steering the grayscale downscale heuristic.
///
/// The cutoffs come from the rendering pipeline, not from the document
/// format, so they are knobs rather than constants. A policy with `print`
/// set leaves image data at full resolution.
#[derive(Debug, Clone)]
pub struct DownscalePolicy {
    /// Above this edge length, halve three times.
    pub huge: u32,
    /// Above this edge length, halve twice.
    pub large: u32,
    /// Above this edge length, halve once.
    pub medium: u32,
    /// Decoding for print keeps full resolution.
    pub print: bool,
}

impl Default for DownscalePolicy {
    fn default() -> Self {
        Self {
            huge: 15000,
            large: 10000,
            medium: 5000,
            print: false,
        }
    }
}

impl DownscalePolicy {
    /// The number of halvings to apply to an image of the given size.
    pub(crate) fn scale_bits(&self, width: u32, height: u32) -> u32 {
        if self.print {
            return 0;
        }

        let largest = width.max(height);

        if largest > self.huge {
            3
        } else if largest > self.large {
            2
        } else if largest > self.medium {
            1
        } else {
            0
        }
    }
}

/// Whether the decimators can handle this sample geometry.
pub(crate) fn shall_resize(num_comps: u8, bpc: u8) -> bool {
    num_comps == 1 && matches!(bpc, 1 | 8)
}

/// Byte-wise nearest-neighbor decimation of an 8-bpc single-channel buffer.
pub(crate) fn downscale_gray(
    data: &[u8],
    width: u32,
    height: u32,
    scale_bits: u32,
) -> (Vec<u8>, u32, u32) {
    let step = 1usize << scale_bits;
    let new_width = (width >> scale_bits).max(1);
    let new_height = (height >> scale_bits).max(1);

    let mut out = Vec::with_capacity(new_width as usize * new_height as usize);

    for y in 0..new_height as usize {
        let row = y * step * width as usize;

        for x in 0..new_width as usize {
            out.push(data.get(row + x * step).copied().unwrap_or(0));
        }
    }

    (out, new_width, new_height)
}

/// Bit-addressed decimation of a packed bilevel buffer. Rows stay aligned
/// to byte boundaries, MSB first.
pub(crate) fn downscale_bilevel(
    data: &[u8],
    width: u32,
    height: u32,
    scale_bits: u32,
) -> (Vec<u8>, u32, u32) {
    let step = 1usize << scale_bits;
    let new_width = (width >> scale_bits).max(1);
    let new_height = (height >> scale_bits).max(1);

    let src_row_bytes = (width as usize).div_ceil(8);
    let dst_row_bytes = (new_width as usize).div_ceil(8);
    let mut out = vec![0u8; dst_row_bytes * new_height as usize];

    for y in 0..new_height as usize {
        let src_row = y * step * src_row_bytes;
        let dst_row = &mut out[y * dst_row_bytes..(y + 1) * dst_row_bytes];
        let mut writer = BitWriter::new(dst_row, 1).expect("1 is a valid bit size");

        for x in 0..new_width as usize {
            let sx = x * step;
            let bit = data
                .get(src_row + (sx >> 3))
                .map(|byte| (byte >> (7 - (sx & 7))) & 1)
                .unwrap_or(0);

            writer.write(bit as u32);
        }
    }

    (out, new_width, new_height)
}

/// Pure nearest-neighbor resampling of a single-channel plane:
/// `dst(i, j) = src(j · w1 / w2, i · h1 / h2)`.
pub(crate) fn resize_nearest<T: Copy + Default>(
    src: &[T],
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> Vec<T> {
    let x_scaled: Vec<usize> = (0..dst_width as u64)
        .map(|j| (j * src_width as u64 / dst_width as u64) as usize)
        .collect();

    let mut dst = Vec::with_capacity(dst_width as usize * dst_height as usize);

    for i in 0..dst_height as u64 {
        let py = (i * src_height as u64 / dst_height as u64) as usize * src_width as usize;

        for x in &x_scaled {
            dst.push(src.get(py + x).copied().unwrap_or_default());
        }
    }

    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_bits_thresholds() {
        let policy = DownscalePolicy::default();

        assert_eq!(policy.scale_bits(4000, 4000), 0);
        assert_eq!(policy.scale_bits(5001, 100), 1);
        assert_eq!(policy.scale_bits(100, 10001), 2);
        assert_eq!(policy.scale_bits(16000, 16000), 3);
    }

    #[test]
    fn printing_disables_downscale() {
        let policy = DownscalePolicy {
            print: true,
            ..DownscalePolicy::default()
        };

        assert_eq!(policy.scale_bits(16000, 16000), 0);
    }

    #[test]
    fn gray_decimation_picks_every_step_pixel() {
        // 4x4 ramp, halved once.
        let data: Vec<u8> = (0..16).collect();
        let (out, w, h) = downscale_gray(&data, 4, 4, 1);

        assert_eq!((w, h), (2, 2));
        assert_eq!(out, [0, 2, 8, 10]);
    }

    #[test]
    fn bilevel_decimation_keeps_row_alignment() {
        // Two 16-pixel rows of alternating bits; halving keeps the set ones.
        let data = [0b10101010, 0b10101010, 0b01010101, 0b01010101];
        let (out, w, h) = downscale_bilevel(&data, 16, 2, 1);

        assert_eq!((w, h), (8, 1));
        assert_eq!(out, [0b11111111]);
    }

    #[test]
    fn bilevel_decimation_pads_missing_bits_with_zero() {
        let (out, w, h) = downscale_bilevel(&[0b10000000], 16, 2, 1);

        assert_eq!((w, h), (8, 1));
        assert_eq!(out, [0b10000000]);
    }

    #[test]
    fn resize_nearest_identity() {
        let src = [1u8, 2, 3, 4];
        assert_eq!(resize_nearest(&src, 2, 2, 2, 2), src);
    }

    #[test]
    fn resize_nearest_law() {
        let src: Vec<u8> = (0..6).collect();
        let dst = resize_nearest(&src, 3, 2, 6, 4);

        for i in 0..4u64 {
            for j in 0..6u64 {
                let expected = src[(i * 2 / 4 * 3 + j * 3 / 6) as usize];
                assert_eq!(dst[(i * 6 + j) as usize], expected);
            }
        }
    }
}
