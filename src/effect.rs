//! Effect chain descriptors and chain decomposition.
//!
//! Effects form an immutable singly linked chain from outermost to innermost;
//! each descriptor optionally owns its upstream `input`. [`decompose`]
//! separates the chain into one combined geometric offset and the ordered
//! list of remaining filter operations.

use std::sync::Arc;

use kurbo::Vec2;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Effect {
    /// Pure geometric translation.
    Offset {
        dx: f64,
        dy: f64,
        input: Option<Arc<Effect>>,
    },
    /// Gaussian blur; radius in the same units as node bounds.
    GaussianBlur {
        radius: f64,
        input: Option<Arc<Effect>>,
    },
    /// 4x5 row-major affine color transform (R,G,B,A rows, bias column).
    ColorMatrix {
        matrix: [f32; 20],
        input: Option<Arc<Effect>>,
    },
    /// Marker: content is additionally drawn un-filtered on top of the
    /// filtered result.
    Blend { input: Option<Arc<Effect>> },
    /// Marker: filtered output is treated as an opacity mask.
    Alpha { input: Option<Arc<Effect>> },
}

impl Effect {
    pub fn offset(dx: f64, dy: f64, input: Option<Arc<Effect>>) -> Arc<Effect> {
        Arc::new(Effect::Offset { dx, dy, input })
    }

    pub fn gaussian_blur(radius: f64, input: Option<Arc<Effect>>) -> Arc<Effect> {
        Arc::new(Effect::GaussianBlur { radius, input })
    }

    pub fn color_matrix(matrix: [f32; 20], input: Option<Arc<Effect>>) -> Arc<Effect> {
        Arc::new(Effect::ColorMatrix { matrix, input })
    }

    pub fn blend(input: Option<Arc<Effect>>) -> Arc<Effect> {
        Arc::new(Effect::Blend { input })
    }

    pub fn alpha(input: Option<Arc<Effect>>) -> Arc<Effect> {
        Arc::new(Effect::Alpha { input })
    }

    pub fn input(&self) -> Option<&Arc<Effect>> {
        match self {
            Effect::Offset { input, .. }
            | Effect::GaussianBlur { input, .. }
            | Effect::ColorMatrix { input, .. }
            | Effect::Blend { input }
            | Effect::Alpha { input } => input.as_ref(),
        }
    }

    /// Iterates the chain outermost-to-innermost, starting at `self`.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter { next: Some(self) }
    }
}

pub struct ChainIter<'a> {
    next: Option<&'a Effect>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Effect;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.input().map(Arc::as_ref);
        Some(current)
    }
}

/// Flat snapshot of one non-offset chain entry.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterOp {
    Blur { radius: f64 },
    ColorMatrix { matrix: [f32; 20] },
    Blend,
    Alpha,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecomposedChain {
    /// Combined translation across every `Offset` entry; `None` iff the net
    /// sum is exactly zero.
    pub offset: Option<Vec2>,
    /// Remaining entries in original outermost-to-innermost order.
    pub filters: Vec<FilterOp>,
}

impl DecomposedChain {
    pub fn has_blend(&self) -> bool {
        self.filters.iter().any(|f| matches!(f, FilterOp::Blend))
    }

    pub fn has_alpha(&self) -> bool {
        self.filters.iter().any(|f| matches!(f, FilterOp::Alpha))
    }

    pub fn is_empty(&self) -> bool {
        self.offset.is_none() && self.filters.is_empty()
    }
}

/// Walks a chain head and splits it into combined offset plus filter list.
///
/// Offsets commute, so they are summed regardless of position; every other
/// entry is appended in traversal order.
pub fn decompose(head: Option<&Arc<Effect>>) -> DecomposedChain {
    let mut dx = 0.0;
    let mut dy = 0.0;
    let mut filters = Vec::new();

    let mut current = head.map(Arc::as_ref);
    while let Some(effect) = current {
        match effect {
            Effect::Offset { dx: x, dy: y, .. } => {
                dx += x;
                dy += y;
            }
            Effect::GaussianBlur { radius, .. } => {
                filters.push(FilterOp::Blur { radius: *radius });
            }
            Effect::ColorMatrix { matrix, .. } => {
                filters.push(FilterOp::ColorMatrix { matrix: *matrix });
            }
            Effect::Blend { .. } => filters.push(FilterOp::Blend),
            Effect::Alpha { .. } => filters.push(FilterOp::Alpha),
        }
        current = effect.input().map(Arc::as_ref);
    }

    let offset = if dx == 0.0 && dy == 0.0 {
        None
    } else {
        Some(Vec2::new(dx, dy))
    };
    DecomposedChain { offset, filters }
}
