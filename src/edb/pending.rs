//! The staged, not yet committed changes of a handler.

use std::collections::HashMap;

use uuid::Uuid;

use crate::content::GenericContent;

/// A staged change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    Add(GenericContent),
    Remove(GenericContent),
}

impl PendingOp {
    pub fn content(&self) -> &GenericContent {
        match self {
            PendingOp::Add(content) | PendingOp::Remove(content) => content,
        }
    }
}

/// Staged changes keyed by uuid. Staging a uuid again replaces its earlier
/// change and moves it to the end of the staging order.
#[derive(Debug, Default)]
pub struct PendingSet {
    ops: HashMap<Uuid, (u64, PendingOp)>,
    next_seq: u64,
}

impl PendingSet {
    pub fn stage(&mut self, uuid: Uuid, op: PendingOp) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.ops.insert(uuid, (seq, op));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// the staged changes in staging order
    pub fn ordered(&self) -> Vec<PendingOp> {
        let mut ops: Vec<&(u64, PendingOp)> = self.ops.values().collect();
        ops.sort_by_key(|(seq, _)| *seq);
        ops.into_iter().map(|(_, op)| op.clone()).collect()
    }
}
