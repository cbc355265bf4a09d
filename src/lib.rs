#![forbid(unsafe_code)]

pub mod animation;
pub mod compositor;
pub mod effect;
pub mod error;
pub mod filter;
pub mod node;
pub mod observe;
pub mod pixmap;
pub mod renderer;
pub mod surface;
pub mod surface_cpu;

pub use animation::AnimationRegistry;
pub use compositor::{EffectLayout, blur_inset, chain_inset, plan_effect_layout};
pub use effect::{DecomposedChain, Effect, FilterOp, decompose};
pub use error::{ScenefxError, ScenefxResult};
pub use filter::{CpuFilterBackend, FilterBackend};
pub use node::{ClipShape, DrawParams, Node, NodeContent, NodeId, RenderInterval};
pub use observe::{Property, Subscription, SubscriptionSet};
pub use pixmap::{Pixmap, PremulRgba8};
pub use renderer::NodeRenderer;
pub use surface::{DrawingSurface, OffscreenBuffer, SurfaceScope};
pub use surface_cpu::PixmapSurface;
