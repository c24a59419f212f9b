//! Snapshot undo/redo for document mark changes.

#[derive(Debug, Clone)]
pub struct History<D> {
    pub undo_stack: Vec<D>,
    pub redo_stack: Vec<D>,
    /// Redo entries dropped by the last `record_before_change`, kept until
    /// the next record so `discard_last` can put them back.
    cleared_redo: Vec<D>,
}

impl<D> Default for History<D> {
    fn default() -> Self { Self { undo_stack: Vec::new(), redo_stack: Vec::new(), cleared_redo: Vec::new() } }
}

impl<D: Clone> History<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current state before making a change.
    pub fn record_before_change(&mut self, current: &D) {
        self.undo_stack.push(current.clone());
        self.cleared_redo = std::mem::take(&mut self.redo_stack);
    }

    /// Drop the most recent snapshot when the change it guarded did not
    /// happen, restoring the redo entries that recording cleared.
    pub fn discard_last(&mut self) {
        self.undo_stack.pop();
        self.redo_stack = std::mem::take(&mut self.cleared_redo);
    }

    /// Undo into the provided doc. Returns true if a change occurred.
    pub fn undo(&mut self, doc: &mut D) -> bool {
        if let Some(prev) = self.undo_stack.pop() {
            let next = std::mem::replace(doc, prev);
            self.redo_stack.push(next);
            true
        } else {
            false
        }
    }

    /// Redo into the provided doc. Returns true if a change occurred.
    pub fn redo(&mut self, doc: &mut D) -> bool {
        if let Some(next) = self.redo_stack.pop() {
            let prev = std::mem::replace(doc, next);
            self.undo_stack.push(prev);
            true
        } else {
            false
        }
    }
}
