//! Image filter backend: Gaussian blur and 4x5 color-matrix transforms over
//! premultiplied RGBA8 pixmaps.

use crate::{
    error::{ScenefxError, ScenefxResult},
    pixmap::Pixmap,
};

pub trait FilterBackend {
    fn gaussian_blur(&self, image: &Pixmap, radius: f64) -> ScenefxResult<Pixmap>;
    fn color_matrix(&self, image: &Pixmap, matrix: &[f32; 20]) -> ScenefxResult<Pixmap>;
}

/// Largest kernel half-width the CPU path will build. Larger radii saturate
/// here, keeping the kernel allocation bounded.
const MAX_KERNEL_RADIUS: u32 = 256;

#[derive(Clone, Copy, Debug, Default)]
pub struct CpuFilterBackend;

impl FilterBackend for CpuFilterBackend {
    fn gaussian_blur(&self, image: &Pixmap, radius: f64) -> ScenefxResult<Pixmap> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(ScenefxError::filter("blur radius must be finite and >= 0"));
        }
        let radius_px = (radius.round() as u32).min(MAX_KERNEL_RADIUS);
        if radius_px == 0 {
            return Ok(image.clone());
        }

        let sigma = (radius / 2.0) as f32;
        let kernel = gaussian_kernel_q16(radius_px, sigma)?;

        let mut tmp = Pixmap::new(image.width(), image.height())?;
        let mut out = Pixmap::new(image.width(), image.height())?;
        separable_pass(image, &mut tmp, &kernel, Axis::Horizontal);
        separable_pass(&tmp, &mut out, &kernel, Axis::Vertical);
        Ok(out)
    }

    fn color_matrix(&self, image: &Pixmap, matrix: &[f32; 20]) -> ScenefxResult<Pixmap> {
        let mut out = image.clone();
        for px in out.data_mut().chunks_exact_mut(4) {
            let straight = unpremultiply([px[0], px[1], px[2], px[3]]);
            let mut result = [0.0f32; 4];
            for (row, r) in result.iter_mut().enumerate() {
                let m = &matrix[row * 5..row * 5 + 5];
                // 5th column is a constant bias applied after the linear part.
                *r = m[0] * straight[0]
                    + m[1] * straight[1]
                    + m[2] * straight[2]
                    + m[3] * straight[3]
                    + m[4];
            }
            let repacked = premultiply(result);
            px.copy_from_slice(&repacked);
        }
        Ok(out)
    }
}

enum Axis {
    Horizontal,
    Vertical,
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> ScenefxResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ScenefxError::filter("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let mut weights_f = Vec::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }
    if sum <= 0.0 {
        return Err(ScenefxError::filter("gaussian kernel sum is zero"));
    }

    // Q16 fixed point, renormalized so the weights sum to exactly 1.
    let mut weights = Vec::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    Ok(weights)
}

fn separable_pass(src: &Pixmap, dst: &mut Pixmap, kernel: &[u32], axis: Axis) {
    let radius = (kernel.len() / 2) as i64;
    let w = src.width() as i64;
    let h = src.height() as i64;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in kernel.iter().enumerate() {
                let offset = ki as i64 - radius;
                let (sx, sy) = match axis {
                    Axis::Horizontal => ((x + offset).clamp(0, w - 1), y),
                    Axis::Vertical => (x, (y + offset).clamp(0, h - 1)),
                };
                let sample = src.pixel(sx as u32, sy as u32);
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(sample[c]);
                }
            }
            let mut px = [0u8; 4];
            for c in 0..4 {
                px[c] = (((acc[c] + 32768) >> 16).min(255)) as u8;
            }
            dst.set_pixel(x as u32, y as u32, px);
        }
    }
}

fn unpremultiply(px: [u8; 4]) -> [f32; 4] {
    let a = f32::from(px[3]) / 255.0;
    if a == 0.0 {
        return [0.0, 0.0, 0.0, 0.0];
    }
    [
        f32::from(px[0]) / 255.0 / a,
        f32::from(px[1]) / 255.0 / a,
        f32::from(px[2]) / 255.0 / a,
        a,
    ]
}

fn premultiply(straight: [f32; 4]) -> [u8; 4] {
    let a = straight[3].clamp(0.0, 1.0);
    let to_u8 = |v: f32| ((v.clamp(0.0, 1.0) * a) * 255.0).round() as u8;
    [
        to_u8(straight[0]),
        to_u8(straight[1]),
        to_u8(straight[2]),
        (a * 255.0).round() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_MATRIX: [f32; 20] = [
        1.0, 0.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 0.0,
    ];

    #[test]
    fn blur_radius_0_is_identity() {
        let mut pm = Pixmap::new(2, 1).unwrap();
        pm.set_pixel(0, 0, [1, 2, 3, 4]);
        let out = CpuFilterBackend.gaussian_blur(&pm, 0.0).unwrap();
        assert_eq!(out, pm);
    }

    #[test]
    fn blur_constant_image_is_identity() {
        let mut pm = Pixmap::new(4, 3).unwrap();
        for y in 0..3 {
            for x in 0..4 {
                pm.set_pixel(x, y, [10, 20, 30, 40]);
            }
        }
        let out = CpuFilterBackend.gaussian_blur(&pm, 3.0).unwrap();
        assert_eq!(out, pm);
    }

    #[test]
    fn blur_spreads_energy_from_single_pixel() {
        let mut pm = Pixmap::new(5, 5).unwrap();
        pm.set_pixel(2, 2, [255, 255, 255, 255]);

        let out = CpuFilterBackend.gaussian_blur(&pm, 2.0).unwrap();

        let nonzero = out
            .data()
            .chunks_exact(4)
            .filter(|px| px[3] != 0)
            .count();
        assert!(nonzero > 1);

        let sum_a: u32 = out
            .data()
            .chunks_exact(4)
            .map(|px| u32::from(px[3]))
            .sum();
        assert!((sum_a as i32 - 255).abs() <= 4);
    }

    #[test]
    fn blur_kernel_radius_saturates_for_huge_radii() {
        // Clamp-to-edge sampling on a single pixel makes any correctly
        // normalized kernel an identity, however wide the radius asks it
        // to be.
        let mut pm = Pixmap::new(1, 1).unwrap();
        pm.set_pixel(0, 0, [10, 20, 30, 40]);
        let out = CpuFilterBackend.gaussian_blur(&pm, 4.3e9).unwrap();
        assert_eq!(out, pm);
    }

    #[test]
    fn blur_rejects_negative_radius() {
        let pm = Pixmap::new(1, 1).unwrap();
        assert!(CpuFilterBackend.gaussian_blur(&pm, -1.0).is_err());
    }

    #[test]
    fn identity_matrix_is_noop() {
        let mut pm = Pixmap::new(1, 1).unwrap();
        pm.set_pixel(0, 0, [100, 50, 25, 255]);
        let out = CpuFilterBackend.color_matrix(&pm, &IDENTITY_MATRIX).unwrap();
        assert_eq!(out.pixel(0, 0), [100, 50, 25, 255]);
    }

    #[test]
    fn channel_swap_moves_red_to_green() {
        let mut m = [0.0f32; 20];
        m[5] = 1.0; // G := R
        m[18] = 1.0; // A := A
        let mut pm = Pixmap::new(1, 1).unwrap();
        pm.set_pixel(0, 0, [200, 0, 0, 255]);

        let out = CpuFilterBackend.color_matrix(&pm, &m).unwrap();
        assert_eq!(out.pixel(0, 0), [0, 200, 0, 255]);
    }

    #[test]
    fn bias_column_adds_constant() {
        let mut m = IDENTITY_MATRIX;
        m[4] = 1.0; // R += 1.0 (full scale)
        let mut pm = Pixmap::new(1, 1).unwrap();
        pm.set_pixel(0, 0, [0, 0, 0, 255]);

        let out = CpuFilterBackend.color_matrix(&pm, &m).unwrap();
        assert_eq!(out.pixel(0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn matrix_preserves_transparent_pixels() {
        let mut m = IDENTITY_MATRIX;
        m[4] = 1.0;
        let pm = Pixmap::new(1, 1).unwrap();
        let out = CpuFilterBackend.color_matrix(&pm, &m).unwrap();
        // Alpha row leaves a=0, so the premultiplied result stays empty.
        assert_eq!(out.pixel(0, 0), [0, 0, 0, 0]);
    }
}
