//! Selection model: character anchors inside block nodes.

use serde::{Deserialize, Serialize};

/// A position between characters. `char_offset` counts chars, not bytes, and
/// may equal the node length (end of block).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Anchor {
    pub node_index: usize,
    pub char_offset: usize,
}

impl Anchor {
    pub fn new(node_index: usize, char_offset: usize) -> Self { Self { node_index, char_offset } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: Anchor,
    pub end: Anchor,
}

impl SelectionRange {
    pub fn new(start: Anchor, end: Anchor) -> Self {
        let mut r = Self { start, end };
        r.normalize();
        r
    }

    /// Range inside a single block.
    pub fn within(node_index: usize, from: usize, to: usize) -> Self {
        Self::new(Anchor::new(node_index, from), Anchor::new(node_index, to))
    }

    pub fn caret(at: Anchor) -> Self { Self { start: at, end: at } }

    /// Backwards selections (focus before anchor) are stored start-first.
    pub fn normalize(&mut self) {
        if self.end < self.start {
            std::mem::swap(&mut self.start, &mut self.end);
        }
    }

    pub fn is_collapsed(&self) -> bool { self.start == self.end }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backwards_selection_is_normalized() {
        let r = SelectionRange::new(Anchor::new(2, 1), Anchor::new(0, 5));
        assert_eq!(r.start, Anchor::new(0, 5));
        assert_eq!(r.end, Anchor::new(2, 1));
    }

    #[test]
    fn anchors_order_by_node_then_offset() {
        assert!(Anchor::new(0, 99) < Anchor::new(1, 0));
        assert!(Anchor::new(1, 2) < Anchor::new(1, 3));
        assert!(SelectionRange::within(0, 3, 3).is_collapsed());
    }
}
