//! Reference CPU implementation of [`DrawingSurface`] over a [`Pixmap`].
//!
//! Geometry goes through the current affine transform at call time; path
//! fills and clips use non-zero winding point tests. No antialiasing — this
//! surface exists to make the pipeline runnable and testable end to end, not
//! to be a production rasterizer.

use kurbo::{Affine, BezPath, Point, Rect, Shape};

use crate::{
    error::{ScenefxError, ScenefxResult},
    pixmap::{Pixmap, PremulRgba8},
    surface::{DrawingSurface, OffscreenBuffer, invert_transform},
};

#[derive(Clone, Debug)]
enum ClipRegion {
    // Device-space regions.
    Rect(Rect),
    Path(BezPath),
}

#[derive(Clone, Debug)]
struct GState {
    transform: Affine,
    clips: Vec<ClipRegion>,
}

impl Default for GState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            clips: Vec::new(),
        }
    }
}

pub struct PixmapSurface {
    pixmap: Pixmap,
    state: GState,
    stack: Vec<GState>,
}

impl PixmapSurface {
    pub fn new(width: u32, height: u32) -> ScenefxResult<Self> {
        if width == 0 || height == 0 {
            return Err(ScenefxError::surface("surface size must be non-zero"));
        }
        Ok(Self {
            pixmap: Pixmap::new(width, height)?,
            state: GState::default(),
            stack: Vec::new(),
        })
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    fn clip_contains(&self, p: Point) -> bool {
        self.state.clips.iter().all(|clip| match clip {
            ClipRegion::Rect(r) => r.contains(p),
            ClipRegion::Path(path) => path.contains(p),
        })
    }

    fn pixel_range(&self, bbox: Rect) -> Option<(u32, u32, u32, u32)> {
        let x0 = bbox.x0.floor().max(0.0) as i64;
        let y0 = bbox.y0.floor().max(0.0) as i64;
        let x1 = (bbox.x1.ceil() as i64).min(self.pixmap.width() as i64);
        let y1 = (bbox.y1.ceil() as i64).min(self.pixmap.height() as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    fn fill_device_region(
        &mut self,
        bbox: Rect,
        color: PremulRgba8,
        opacity: f64,
        inside: impl Fn(Point) -> bool,
    ) {
        let Some((x0, y0, x1, y1)) = self.pixel_range(bbox) else {
            return;
        };
        let opacity = opacity as f32;
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if inside(center) && self.clip_contains(center) {
                    self.pixmap.blend_pixel(x, y, color, opacity);
                }
            }
        }
    }
}

fn is_axis_aligned(t: Affine) -> bool {
    let c = t.as_coeffs();
    c[1] == 0.0 && c[2] == 0.0
}

fn transform_rect(t: Affine, r: Rect) -> Rect {
    Rect::from_points(t * Point::new(r.x0, r.y0), t * Point::new(r.x1, r.y1))
}

impl DrawingSurface for PixmapSurface {
    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn concat(&mut self, transform: Affine) {
        self.state.transform *= transform;
    }

    fn current_transform(&self) -> Affine {
        self.state.transform
    }

    fn clip_rect(&mut self, rect: Rect) {
        if is_axis_aligned(self.state.transform) {
            let device = transform_rect(self.state.transform, rect);
            self.state.clips.push(ClipRegion::Rect(device));
        } else {
            self.clip_path(&rect.to_path(0.1));
        }
    }

    fn clip_path(&mut self, path: &BezPath) {
        let mut device = path.clone();
        device.apply_affine(self.state.transform);
        self.state.clips.push(ClipRegion::Path(device));
    }

    fn fill_rect(&mut self, rect: Rect, color: PremulRgba8, opacity: f64) -> ScenefxResult<()> {
        if !is_axis_aligned(self.state.transform) {
            return self.fill_path(&rect.to_path(0.1), color, opacity);
        }
        let device = transform_rect(self.state.transform, rect);
        self.fill_device_region(device, color, opacity, |p| device.contains(p));
        Ok(())
    }

    fn fill_path(
        &mut self,
        path: &BezPath,
        color: PremulRgba8,
        opacity: f64,
    ) -> ScenefxResult<()> {
        let mut device = path.clone();
        device.apply_affine(self.state.transform);
        let bbox = device.bounding_box();
        self.fill_device_region(bbox, color, opacity, |p| device.contains(p));
        Ok(())
    }

    fn draw_image(&mut self, image: &Pixmap, dst: Rect, opacity: f64) -> ScenefxResult<()> {
        if image.width() == 0 || image.height() == 0 || dst.width() <= 0.0 || dst.height() <= 0.0 {
            return Ok(());
        }
        let Some(inverse) = invert_transform(self.state.transform) else {
            // Degenerate transform maps the image to nothing.
            return Ok(());
        };

        let t = self.state.transform;
        let corners = [
            t * Point::new(dst.x0, dst.y0),
            t * Point::new(dst.x1, dst.y0),
            t * Point::new(dst.x0, dst.y1),
            t * Point::new(dst.x1, dst.y1),
        ];
        let bbox = corners
            .iter()
            .skip(1)
            .fold(Rect::from_points(corners[0], corners[0]), |r, p| {
                r.union_pt(*p)
            });
        let Some((x0, y0, x1, y1)) = self.pixel_range(bbox) else {
            return Ok(());
        };

        let opacity = opacity as f32;
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if !self.clip_contains(center) {
                    continue;
                }
                let local = inverse * center;
                if !dst.contains(local) {
                    continue;
                }
                let u = ((local.x - dst.x0) / dst.width() * f64::from(image.width()))
                    .floor()
                    .clamp(0.0, f64::from(image.width() - 1)) as u32;
                let v = ((local.y - dst.y0) / dst.height() * f64::from(image.height()))
                    .floor()
                    .clamp(0.0, f64::from(image.height() - 1)) as u32;
                self.pixmap.blend_pixel(x, y, image.pixel(u, v), opacity);
            }
        }
        Ok(())
    }

    fn create_buffer(&self, width: u32, height: u32) -> ScenefxResult<Box<dyn OffscreenBuffer>> {
        Ok(Box::new(PixmapBuffer {
            surface: PixmapSurface::new(width, height)?,
        }))
    }
}

struct PixmapBuffer {
    surface: PixmapSurface,
}

impl OffscreenBuffer for PixmapBuffer {
    fn context(&mut self) -> &mut dyn DrawingSurface {
        &mut self.surface
    }

    fn into_image(self: Box<Self>) -> ScenefxResult<Pixmap> {
        Ok(self.surface.pixmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: PremulRgba8 = [255, 0, 0, 255];

    #[test]
    fn fill_rect_writes_inside_only() {
        let mut s = PixmapSurface::new(8, 8).unwrap();
        s.fill_rect(Rect::new(2.0, 2.0, 6.0, 6.0), RED, 1.0).unwrap();

        assert_eq!(s.pixmap().pixel(3, 3), RED);
        assert_eq!(s.pixmap().pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(s.pixmap().pixel(6, 6), [0, 0, 0, 0]);
    }

    #[test]
    fn fill_rect_respects_translation() {
        let mut s = PixmapSurface::new(8, 8).unwrap();
        s.concat(Affine::translate((4.0, 0.0)));
        s.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), RED, 1.0).unwrap();

        assert_eq!(s.pixmap().pixel(5, 1), RED);
        assert_eq!(s.pixmap().pixel(1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn clip_rect_masks_fill() {
        let mut s = PixmapSurface::new(8, 8).unwrap();
        s.clip_rect(Rect::new(0.0, 0.0, 4.0, 8.0));
        s.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0), RED, 1.0).unwrap();

        assert_eq!(s.pixmap().pixel(2, 2), RED);
        assert_eq!(s.pixmap().pixel(6, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn clip_path_masks_fill() {
        let mut s = PixmapSurface::new(8, 8).unwrap();
        let mut triangle = BezPath::new();
        triangle.move_to((0.0, 0.0));
        triangle.line_to((8.0, 0.0));
        triangle.line_to((0.0, 8.0));
        triangle.close_path();

        s.clip_path(&triangle);
        s.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0), RED, 1.0).unwrap();

        assert_eq!(s.pixmap().pixel(1, 1), RED);
        assert_eq!(s.pixmap().pixel(7, 7), [0, 0, 0, 0]);
    }

    #[test]
    fn restore_pops_clip() {
        let mut s = PixmapSurface::new(8, 8).unwrap();
        s.save();
        s.clip_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        s.restore();
        s.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0), RED, 1.0).unwrap();
        assert_eq!(s.pixmap().pixel(7, 7), RED);
    }

    #[test]
    fn draw_image_copies_pixels_at_dst() {
        let mut img = Pixmap::new(2, 2).unwrap();
        img.set_pixel(0, 0, RED);
        img.set_pixel(1, 1, [0, 255, 0, 255]);

        let mut s = PixmapSurface::new(8, 8).unwrap();
        s.draw_image(&img, Rect::new(2.0, 2.0, 4.0, 4.0), 1.0).unwrap();

        assert_eq!(s.pixmap().pixel(2, 2), RED);
        assert_eq!(s.pixmap().pixel(3, 3), [0, 255, 0, 255]);
        assert_eq!(s.pixmap().pixel(5, 5), [0, 0, 0, 0]);
    }

    #[test]
    fn draw_image_scales_to_dst() {
        let mut img = Pixmap::new(1, 1).unwrap();
        img.set_pixel(0, 0, RED);

        let mut s = PixmapSurface::new(8, 8).unwrap();
        s.draw_image(&img, Rect::new(0.0, 0.0, 8.0, 8.0), 1.0).unwrap();
        assert_eq!(s.pixmap().pixel(0, 0), RED);
        assert_eq!(s.pixmap().pixel(7, 7), RED);
    }

    #[test]
    fn buffer_roundtrip_returns_drawn_pixels() {
        let s = PixmapSurface::new(4, 4).unwrap();
        let mut buffer = s.create_buffer(4, 4).unwrap();
        buffer
            .context()
            .fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), RED, 1.0)
            .unwrap();
        let image = buffer.into_image().unwrap();
        assert_eq!(image.pixel(2, 2), RED);
    }
}
