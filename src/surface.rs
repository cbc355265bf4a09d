//! Drawing-surface abstraction: transform/clip stack, drawing primitives,
//! and off-screen buffer creation.

use std::ops::{Deref, DerefMut};

use kurbo::{Affine, BezPath, Rect};

use crate::{
    error::ScenefxResult,
    pixmap::{Pixmap, PremulRgba8},
};

/// Target for node rendering. Implementations keep a save/restore stack of
/// transform and clip state; all geometry is interpreted through the current
/// transform at call time.
pub trait DrawingSurface {
    fn save(&mut self);
    fn restore(&mut self);

    /// Post-concatenates `transform` onto the current transform.
    fn concat(&mut self, transform: Affine);
    fn current_transform(&self) -> Affine;

    /// Intersects the clip with `rect` (fast path for rectangular clips).
    fn clip_rect(&mut self, rect: Rect);
    /// Intersects the clip with an arbitrary path.
    fn clip_path(&mut self, path: &BezPath);

    fn fill_rect(&mut self, rect: Rect, color: PremulRgba8, opacity: f64) -> ScenefxResult<()>;
    fn fill_path(&mut self, path: &BezPath, color: PremulRgba8, opacity: f64)
    -> ScenefxResult<()>;

    /// Draws `image` into `dst`, scaled to fit, blended source-over with the
    /// given opacity.
    fn draw_image(&mut self, image: &Pixmap, dst: Rect, opacity: f64) -> ScenefxResult<()>;

    /// Allocates an off-screen pixel buffer compatible with this surface.
    fn create_buffer(&self, width: u32, height: u32) -> ScenefxResult<Box<dyn OffscreenBuffer>>;
}

/// Off-screen pixel buffer with a current-context accessor.
pub trait OffscreenBuffer {
    fn context(&mut self) -> &mut dyn DrawingSurface;
    fn into_image(self: Box<Self>) -> ScenefxResult<Pixmap>;
}

/// Inverse of `t`, or `None` when it is singular or not finite.
pub(crate) fn invert_transform(t: Affine) -> Option<Affine> {
    let det = t.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inverse = t.inverse();
    if inverse.as_coeffs().iter().all(|c| c.is_finite()) {
        Some(inverse)
    } else {
        None
    }
}

/// Scoped save/restore guard. Saves on creation, restores on drop, so the
/// prior surface state comes back on every exit path.
pub struct SurfaceScope<'a> {
    surface: &'a mut dyn DrawingSurface,
}

impl<'a> SurfaceScope<'a> {
    pub fn new(surface: &'a mut dyn DrawingSurface) -> Self {
        surface.save();
        Self { surface }
    }
}

impl Drop for SurfaceScope<'_> {
    fn drop(&mut self) {
        self.surface.restore();
    }
}

impl<'a> Deref for SurfaceScope<'a> {
    type Target = dyn DrawingSurface + 'a;

    fn deref(&self) -> &Self::Target {
        self.surface
    }
}

impl<'a> DerefMut for SurfaceScope<'a> {
    fn deref_mut(&mut self) -> &mut (dyn DrawingSurface + 'a) {
        self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface_cpu::PixmapSurface;

    #[test]
    fn scope_restores_transform_on_drop() {
        let mut surface = PixmapSurface::new(4, 4).unwrap();
        let before = surface.current_transform();
        {
            let mut scope = SurfaceScope::new(&mut surface);
            scope.concat(Affine::translate((3.0, 7.0)));
            assert_ne!(scope.current_transform(), before);
        }
        assert_eq!(surface.current_transform(), before);
    }

    #[test]
    fn invert_rejects_singular_and_non_finite() {
        assert!(invert_transform(Affine::scale(0.0)).is_none());
        assert!(invert_transform(Affine::scale(f64::NAN)).is_none());
        let inv = invert_transform(Affine::translate((2.0, 3.0))).unwrap();
        assert_eq!(inv * kurbo::Point::new(2.0, 3.0), kurbo::Point::ORIGIN);
    }

    #[test]
    fn scope_restores_on_early_return() {
        fn bail(surface: &mut dyn DrawingSurface) -> ScenefxResult<()> {
            let mut scope = SurfaceScope::new(surface);
            scope.concat(Affine::scale(2.0));
            Err(crate::ScenefxError::render("boom"))
        }

        let mut surface = PixmapSurface::new(4, 4).unwrap();
        let before = surface.current_transform();
        assert!(bail(&mut surface).is_err());
        assert_eq!(surface.current_transform(), before);
    }
}
