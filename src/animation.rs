//! Registry of nodes currently mid-animation.
//!
//! The renderer holds only a `Weak` reference to the registry and treats a
//! dead registry as "nothing is animating".

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::node::NodeId;

#[derive(Debug, Default)]
pub struct AnimationRegistry {
    animating: RefCell<HashSet<NodeId>>,
}

impl AnimationRegistry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn begin(&self, id: NodeId) {
        self.animating.borrow_mut().insert(id);
    }

    pub fn end(&self, id: NodeId) {
        self.animating.borrow_mut().remove(&id);
    }

    /// Safe to query for any id, including nodes whose state changed since
    /// the last frame.
    pub fn is_animating(&self, id: NodeId) -> bool {
        self.animating.borrow().contains(&id)
    }
}
