//! Identity types for the pipeline system.
//!
//! Elements and links live independently of any orchestrator, so IDs are
//! drawn from process-wide counters rather than storage indices. Both are
//! newtypes over `u32`.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ELEMENT_ID: AtomicU32 = AtomicU32::new(0);
static NEXT_LINK_ID: AtomicU32 = AtomicU32::new(0);

/// Identifies one element for its whole lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl ElementId {
    pub const INVALID: ElementId = ElementId(u32::MAX);

    pub(crate) fn next() -> Self {
        ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ElementId(INVALID)")
        } else {
            write!(f, "ElementId({})", self.0)
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identifies one link between two ports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u32);

impl LinkId {
    pub const INVALID: LinkId = LinkId(u32::MAX);

    pub(crate) fn next() -> Self {
        LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "LinkId(INVALID)")
        } else {
            write!(f, "LinkId({})", self.0)
        }
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
