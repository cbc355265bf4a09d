//! Scene node model: observable properties plus a per-content-kind
//! capability interface.

use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kurbo::{Affine, BezPath, Point, Rect};

use crate::{
    effect::Effect,
    error::ScenefxResult,
    observe::{Property, SubscriptionSet},
    surface::DrawingSurface,
};

/// Shape used to clip a node's content. Rectangles get the surface's fast
/// path; anything else is applied as a general path clip.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ClipShape {
    Rect(Rect),
    Path(BezPath),
}

/// Contiguous index range for partial, interval-scoped rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderInterval {
    pub from: i64,
    pub to: i64,
}

impl RenderInterval {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, index: i64) -> bool {
        self.from <= index && index < self.to
    }
}

/// Process-unique node identity; the animation registry is keyed by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Parameters handed to content rasterization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawParams {
    /// Accumulated effective opacity. Not clamped; out-of-range values
    /// propagate as given.
    pub opacity: f64,
    /// Render as an opacity mask rather than full color.
    pub alpha_only: bool,
    pub interval: Option<RenderInterval>,
}

/// Per-content-kind hooks. Concrete node kinds implement this instead of
/// overriding a renderer base class.
pub trait NodeContent {
    /// Axis-aligned content bounds in node-local space, if known.
    fn bounds(&self) -> Option<Rect>;

    /// Rasterizes the content onto `surface` in node-local coordinates.
    fn draw(&self, surface: &mut dyn DrawingSurface, params: &DrawParams) -> ScenefxResult<()>;

    /// Whether the content itself occupies `local`.
    fn contains(&self, _local: Point) -> bool {
        false
    }

    /// Content-specific hit test; may recurse into child renderers and
    /// return the innermost hit.
    fn find_node_at(
        &self,
        _local: Point,
        _surface: &mut dyn DrawingSurface,
    ) -> Option<NodeId> {
        None
    }

    /// Hook for extra content-owned observations.
    fn add_observers(&self, _set: &mut SubscriptionSet, _on_change: Rc<dyn Fn()>) {}
}

/// One scene-graph element: placement, opacity, clip, effect chain, content.
///
/// The five properties are observable; a [`NodeRenderer`](crate::NodeRenderer)
/// subscribes to exactly this set.
pub struct Node {
    id: NodeId,
    pub place: Property<Affine>,
    pub opacity: Property<f64>,
    pub opaque: Property<bool>,
    pub clip: Property<Option<ClipShape>>,
    pub effect: Property<Option<Arc<Effect>>>,
    content: Rc<dyn NodeContent>,
}

impl Node {
    pub fn new(content: Rc<dyn NodeContent>) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::next(),
            place: Property::new(Affine::IDENTITY),
            opacity: Property::new(1.0),
            opaque: Property::new(true),
            clip: Property::new(None),
            effect: Property::new(None),
            content,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn content(&self) -> &Rc<dyn NodeContent> {
        &self.content
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.content.bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Boundless;

    impl NodeContent for Boundless {
        fn bounds(&self) -> Option<Rect> {
            None
        }

        fn draw(
            &self,
            _surface: &mut dyn DrawingSurface,
            _params: &DrawParams,
        ) -> ScenefxResult<()> {
            Ok(())
        }
    }

    #[test]
    fn node_ids_are_unique() {
        let a = Node::new(Rc::new(Boundless));
        let b = Node::new(Rc::new(Boundless));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn bounds_delegate_to_content() {
        let node = Node::new(Rc::new(Boundless));
        assert_eq!(node.bounds(), None);
    }

    #[test]
    fn interval_contains_is_half_open() {
        let iv = RenderInterval::new(2, 5);
        assert!(!iv.contains(1));
        assert!(iv.contains(2));
        assert!(iv.contains(4));
        assert!(!iv.contains(5));
    }

    #[test]
    fn clip_shape_json_roundtrip() {
        let clip = ClipShape::Rect(Rect::new(0.0, 0.0, 10.0, 5.0));
        let s = serde_json::to_string(&clip).unwrap();
        let de: ClipShape = serde_json::from_str(&s).unwrap();
        assert_eq!(de, clip);
    }
}
