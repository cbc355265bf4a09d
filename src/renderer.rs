//! Node render orchestration: transform/clip/opacity application, effect
//! branching, animation-gated drawing, property observation, and hit-testing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use kurbo::{Affine, Point, Vec2};
use tracing::{debug, trace};

use crate::{
    animation::AnimationRegistry,
    compositor::{plan_effect_layout, run_filters},
    effect::{FilterOp, decompose},
    error::ScenefxResult,
    filter::{CpuFilterBackend, FilterBackend},
    node::{ClipShape, DrawParams, Node, NodeId, RenderInterval},
    observe::SubscriptionSet,
    surface::{DrawingSurface, SurfaceScope, invert_transform},
};

/// Renders one node and keeps its invalidation subscriptions.
///
/// A renderer is bound to exactly one node for its whole life; render a
/// different node by creating a new renderer. It starts observing and must be
/// [`dispose`](Self::dispose)d when the node leaves the visible graph.
pub struct NodeRenderer {
    node: Rc<Node>,
    animations: Weak<AnimationRegistry>,
    filters: Box<dyn FilterBackend>,
    invalidate: Rc<dyn Fn(NodeId)>,
    observing: Cell<bool>,
    subscriptions: RefCell<SubscriptionSet>,
    interval: Cell<Option<RenderInterval>>,
}

impl NodeRenderer {
    pub fn new(
        node: Rc<Node>,
        animations: Weak<AnimationRegistry>,
        invalidate: Rc<dyn Fn(NodeId)>,
    ) -> Self {
        let renderer = Self {
            node,
            animations,
            filters: Box::new(CpuFilterBackend),
            invalidate,
            observing: Cell::new(false),
            subscriptions: RefCell::new(SubscriptionSet::new()),
            interval: Cell::new(None),
        };
        renderer.add_observers();
        renderer
    }

    pub fn with_filter_backend(mut self, filters: Box<dyn FilterBackend>) -> Self {
        self.filters = filters;
        self
    }

    pub fn node(&self) -> &Rc<Node> {
        &self.node
    }

    pub fn set_render_interval(&self, interval: Option<RenderInterval>) {
        self.interval.set(interval);
    }

    pub fn is_observing(&self) -> bool {
        self.observing.get()
    }

    pub fn observer_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Renders the node onto `surface`.
    ///
    /// `opacity` is the accumulated ancestor opacity; the node's own opacity
    /// multiplies onto it unclamped. `force` draws even while the node is
    /// animating. `alpha_only` (also inferred from an `Alpha` marker in the
    /// chain) renders the result as an opacity mask.
    ///
    /// Surface transform/clip mutations are scoped; the prior state is
    /// restored on every exit path.
    pub fn render(
        &self,
        surface: &mut dyn DrawingSurface,
        force: bool,
        opacity: f64,
        alpha_only: bool,
    ) -> ScenefxResult<()> {
        let mut scope = SurfaceScope::new(surface);
        self.apply_place_and_clip(&mut *scope);

        let opacity = self.node.opacity.get() * opacity;
        let chain = decompose(self.node.effect.get().as_ref());
        let alpha_only = alpha_only || chain.has_alpha();
        let offset = chain.offset.unwrap_or(Vec2::ZERO);

        if chain.filters.is_empty() {
            if chain.offset.is_some() {
                scope.concat(Affine::translate(offset));
            }
            return self.direct_render(&mut *scope, force, opacity, alpha_only);
        }

        scope.concat(Affine::translate(offset));
        self.apply_effects(&chain.filters, &mut *scope, opacity, alpha_only)?;

        if chain.has_blend() {
            // The blend marker asks for the unfiltered content on top, back
            // at the original un-offset position.
            scope.concat(Affine::translate(-offset));
            self.direct_render(&mut *scope, force, opacity, alpha_only)?;
        }
        Ok(())
    }

    /// Draws the node's content, gated on animation state.
    ///
    /// While animating, property observation is suspended (the animation
    /// driver owns the redraw cadence) and the draw is skipped unless
    /// `force` is set. When not animating, observation is re-enabled before
    /// drawing.
    pub fn direct_render(
        &self,
        surface: &mut dyn DrawingSurface,
        force: bool,
        opacity: f64,
        alpha_only: bool,
    ) -> ScenefxResult<()> {
        let animating = self
            .animations
            .upgrade()
            .is_some_and(|a| a.is_animating(self.node.id()));

        if animating {
            self.remove_observers();
            if !force {
                trace!(node = ?self.node.id(), "skipping draw of animating node");
                return Ok(());
            }
        } else {
            self.add_observers();
        }

        let params = DrawParams {
            opacity,
            alpha_only,
            interval: self.interval.get(),
        };
        self.node.content().draw(surface, &params)
    }

    /// Renders content into a padded off-screen buffer, applies the filter
    /// list in chain order, and composites the result back around the node's
    /// bounds. A node without bounds is a tolerated no-op.
    fn apply_effects(
        &self,
        filters: &[FilterOp],
        surface: &mut dyn DrawingSurface,
        opacity: f64,
        alpha_only: bool,
    ) -> ScenefxResult<()> {
        let Some(bounds) = self.node.bounds() else {
            trace!(node = ?self.node.id(), "effects skipped: node has no bounds");
            return Ok(());
        };

        let layout = plan_effect_layout(bounds, filters);
        debug!(
            node = ?self.node.id(),
            inset = layout.inset,
            width = layout.buffer_width,
            height = layout.buffer_height,
            "rendering node into effect buffer"
        );

        let mut buffer = surface.create_buffer(layout.buffer_width, layout.buffer_height)?;
        {
            let ctx = buffer.context();
            ctx.concat(layout.buffer_transform);
            // force=false so an in-flight animation cannot re-enter an
            // invalidation loop while filling filter input.
            self.direct_render(ctx, false, 1.0, alpha_only)?;
        }

        // The buffer is rendered y-up; flip before filtering to match the
        // target's orientation (filters are flip-invariant per pixel column).
        let image = buffer.into_image()?.flipped_vertical();
        let image = run_filters(self.filters.as_ref(), image, filters)?;
        let image = if alpha_only {
            image.to_alpha_mask()
        } else {
            image
        };
        surface.draw_image(&image, layout.dest, opacity)
    }

    /// Returns the deepest node occupying `point`, or `None`.
    ///
    /// Non-opaque nodes do not participate; a singular placement transform
    /// yields `None` rather than failing.
    pub fn find_node_at(
        &self,
        point: Point,
        surface: &mut dyn DrawingSurface,
    ) -> Option<NodeId> {
        if !self.node.opaque.get() {
            return None;
        }
        let inverse = invert_transform(self.node.place.get())?;

        let mut scope = SurfaceScope::new(surface);
        self.apply_place_and_clip(&mut *scope);
        let local = inverse * point;

        let content = self.node.content().clone();
        content
            .find_node_at(local, &mut *scope)
            .or_else(|| content.contains(local).then(|| self.node.id()))
    }

    /// Subscribes to the node's five observable properties plus the content
    /// hook. Idempotent.
    pub fn add_observers(&self) {
        if self.observing.get() {
            return;
        }
        let on_change = self.change_callback();
        let mut set = self.subscriptions.borrow_mut();
        let node = &self.node;

        let hooked = |cb: &Rc<dyn Fn()>| {
            let cb = cb.clone();
            move || cb()
        };
        set.push(node.place.subscribe(hooked(&on_change)));
        set.push(node.opacity.subscribe(hooked(&on_change)));
        set.push(node.opaque.subscribe(hooked(&on_change)));
        set.push(node.clip.subscribe(hooked(&on_change)));
        set.push(node.effect.subscribe(hooked(&on_change)));
        node.content().add_observers(&mut set, on_change);

        self.observing.set(true);
    }

    /// Disposes every subscription atomically. Idempotent.
    pub fn remove_observers(&self) {
        if !self.observing.get() {
            return;
        }
        self.subscriptions.borrow_mut().clear();
        self.observing.set(false);
    }

    /// Unsubscribes all observations; call when the node leaves the visible
    /// graph.
    pub fn dispose(&self) {
        self.remove_observers();
    }

    fn apply_place_and_clip(&self, surface: &mut dyn DrawingSurface) {
        surface.concat(self.node.place.get());
        match self.node.clip.get() {
            Some(ClipShape::Rect(rect)) => surface.clip_rect(rect),
            Some(ClipShape::Path(path)) => surface.clip_path(&path),
            None => {}
        }
    }

    /// Property-change callback: ignore changes while the animation driver
    /// owns the cadence, otherwise signal upward.
    fn change_callback(&self) -> Rc<dyn Fn()> {
        let animations = self.animations.clone();
        let id = self.node.id();
        let invalidate = self.invalidate.clone();
        Rc::new(move || {
            let animating = animations.upgrade().is_some_and(|a| a.is_animating(id));
            if !animating {
                invalidate(id);
            }
        })
    }
}
