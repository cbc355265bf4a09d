//! Off-screen compositing support: inset sizing from blur parameters, buffer
//! layout planning, and filter-chain execution.

use kurbo::{Affine, Rect};

use crate::{
    effect::FilterOp,
    error::ScenefxResult,
    filter::FilterBackend,
    pixmap::Pixmap,
};

/// Hard cap on blur padding, bounding off-screen allocation for pathological
/// radii.
pub const MAX_BLUR_INSET: f64 = 150.0;

/// Padding implied by one blur radius: `min(radius*6 + 1, 150)`.
pub fn blur_inset(radius: f64) -> f64 {
    (radius * 6.0 + 1.0).min(MAX_BLUR_INSET)
}

/// Padding for a whole filter list. With several blurs in one chain the
/// largest inset wins, so the result is order-independent; non-blur entries
/// contribute nothing.
pub fn chain_inset(filters: &[FilterOp]) -> f64 {
    filters
        .iter()
        .filter_map(|f| match f {
            FilterOp::Blur { radius } => Some(blur_inset(*radius)),
            _ => None,
        })
        .fold(0.0, f64::max)
}

/// Geometry of one off-screen effect pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectLayout {
    pub inset: f64,
    pub buffer_width: u32,
    pub buffer_height: u32,
    /// Maps node-local content into the buffer: vertically flipped, with an
    /// `inset/2` border reserved on all sides for blur bleed.
    pub buffer_transform: Affine,
    /// Target rectangle for the filtered image, symmetric around the
    /// original bounds.
    pub dest: Rect,
}

pub fn plan_effect_layout(bounds: Rect, filters: &[FilterOp]) -> EffectLayout {
    let inset = chain_inset(filters);
    let width = bounds.width() + inset;
    let height = bounds.height() + inset;
    let half = inset / 2.0;

    EffectLayout {
        inset,
        buffer_width: width.ceil().max(1.0) as u32,
        buffer_height: height.ceil().max(1.0) as u32,
        buffer_transform: Affine::new([1.0, 0.0, 0.0, -1.0, half - bounds.x0, bounds.y1 + half]),
        dest: Rect::new(
            bounds.x0 - half,
            bounds.y0 - half,
            bounds.x0 - half + width,
            bounds.y0 - half + height,
        ),
    }
}

/// Applies the filter list in original chain order. `Blend` and `Alpha` are
/// branching markers, not image filters; they pass through untouched here.
pub fn run_filters(
    backend: &dyn FilterBackend,
    image: Pixmap,
    filters: &[FilterOp],
) -> ScenefxResult<Pixmap> {
    let mut image = image;
    for filter in filters {
        image = match filter {
            FilterOp::Blur { radius } => backend.gaussian_blur(&image, *radius)?,
            FilterOp::ColorMatrix { matrix } => backend.color_matrix(&image, matrix)?,
            FilterOp::Blend | FilterOp::Alpha => image,
        };
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::CpuFilterBackend;
    use kurbo::Point;

    #[test]
    fn inset_formula_matches_reference_points() {
        assert_eq!(blur_inset(1.0), 7.0);
        assert_eq!(blur_inset(10.0), 61.0);
        assert_eq!(blur_inset(25.0), 150.0); // capped
        assert_eq!(blur_inset(1000.0), 150.0);
    }

    #[test]
    fn chain_inset_takes_max_across_blurs() {
        let filters = vec![
            FilterOp::Blur { radius: 1.0 },
            FilterOp::ColorMatrix { matrix: [0.0; 20] },
            FilterOp::Blur { radius: 10.0 },
            FilterOp::Blur { radius: 2.0 },
        ];
        assert_eq!(chain_inset(&filters), 61.0);
    }

    #[test]
    fn chain_inset_ignores_non_blur_filters() {
        let filters = vec![FilterOp::ColorMatrix { matrix: [0.0; 20] }, FilterOp::Blend];
        assert_eq!(chain_inset(&filters), 0.0);
    }

    #[test]
    fn layout_for_blur_10_over_100x50_bounds() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 50.0);
        let layout = plan_effect_layout(bounds, &[FilterOp::Blur { radius: 10.0 }]);

        assert_eq!(layout.inset, 61.0);
        assert_eq!(layout.buffer_width, 161);
        assert_eq!(layout.buffer_height, 111);
        assert_eq!(layout.dest, Rect::new(-30.5, -30.5, 130.5, 80.5));
    }

    #[test]
    fn buffer_transform_flips_and_borders_content() {
        let bounds = Rect::new(10.0, 20.0, 110.0, 70.0);
        let layout = plan_effect_layout(bounds, &[FilterOp::Blur { radius: 1.0 }]);
        let t = layout.buffer_transform;

        // Top-left corner of the bounds lands at the bottom border, flipped.
        let p = t * Point::new(10.0, 20.0);
        assert_eq!(p, Point::new(3.5, 53.5));
        // Bottom-left corner lands at the top border.
        let p = t * Point::new(10.0, 70.0);
        assert_eq!(p, Point::new(3.5, 3.5));
    }

    #[test]
    fn run_filters_skips_markers() {
        let mut pm = Pixmap::new(1, 1).unwrap();
        pm.set_pixel(0, 0, [9, 8, 7, 255]);
        let out = run_filters(
            &CpuFilterBackend,
            pm.clone(),
            &[FilterOp::Blend, FilterOp::Alpha],
        )
        .unwrap();
        assert_eq!(out, pm);
    }
}
