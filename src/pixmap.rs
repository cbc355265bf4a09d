//! Premultiplied RGBA8 pixel buffers and the source-over blend primitive.

use crate::error::{ScenefxError, ScenefxResult};

pub type PremulRgba8 = [u8; 4];

#[derive(Clone, Debug, PartialEq)]
pub struct Pixmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Pixmap {
    pub fn new(width: u32, height: u32) -> ScenefxResult<Self> {
        let len = byte_len(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![0u8; len],
        })
    }

    pub fn from_data(width: u32, height: u32, data: Vec<u8>) -> ScenefxResult<Self> {
        if data.len() != byte_len(width, height)? {
            return Err(ScenefxError::surface(
                "pixmap data must match width*height*4",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = self.index(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, px: PremulRgba8) {
        let i = self.index(x, y);
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Source-over blends `src` (scaled by `opacity`) onto the pixel.
    pub fn blend_pixel(&mut self, x: u32, y: u32, src: PremulRgba8, opacity: f32) {
        let blended = over(self.pixel(x, y), src, opacity);
        self.set_pixel(x, y, blended);
    }

    /// Row-reversed copy; converts between y-up and y-down orientations.
    pub fn flipped_vertical(&self) -> Pixmap {
        let row = self.width as usize * 4;
        let mut data = Vec::with_capacity(self.data.len());
        for chunk in self.data.chunks_exact(row).rev() {
            data.extend_from_slice(chunk);
        }
        Pixmap {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Reduces the image to an opacity mask: color is dropped, coverage kept.
    pub fn to_alpha_mask(&self) -> Pixmap {
        let mut data = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(4) {
            data.extend_from_slice(&[0, 0, 0, px[3]]);
        }
        Pixmap {
            width: self.width,
            height: self.height,
            data,
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        ((y as usize) * (self.width as usize) + (x as usize)) * 4
    }
}

fn byte_len(width: u32, height: u32) -> ScenefxResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| ScenefxError::surface("pixmap size overflow"))
}

/// Source-over for premultiplied RGBA8, with an extra opacity factor on `src`.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = mul_div255(u16::from(dst[3]), inv).saturating_add(sa);
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
