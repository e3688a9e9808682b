//! Semantic tree actions and the locator type.
//!
//! Actions are produced by an external translator from raw store events;
//! they are the only way the tree mutates.

use crate::naming::SegmentId;
use crate::types::{NodeKind, SplitPath, Status};

/// Canonical tree coordinates of a node: the section segment ids from the
/// root down to the parent, plus the target's own segment id. Never
/// filesystem path text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    /// Section segment ids from the root (root's own id first) to, and
    /// including, the target's immediate parent.
    pub parent_chain: Vec<SegmentId>,
    pub segment_id: SegmentId,
    pub kind: NodeKind,
}

impl Locator {
    pub fn new(parent_chain: Vec<SegmentId>, segment_id: SegmentId, kind: NodeKind) -> Self {
        Self {
            parent_chain,
            segment_id,
            kind,
        }
    }

    /// The locator's full segment-id chain, target included. Only
    /// meaningful for section locators.
    pub fn full_chain(&self) -> Vec<SegmentId> {
        let mut chain = self.parent_chain.clone();
        chain.push(self.segment_id.clone());
        chain
    }
}

/// One semantic mutation of the library tree.
#[derive(Debug, Clone)]
pub enum TreeAction {
    Create {
        target: Locator,
        initial_status: Option<Status>,
        observed: SplitPath,
    },
    Delete {
        target: Locator,
    },
    Rename {
        target: Locator,
        new_name: String,
    },
    Move {
        target: Locator,
        new_parent: Locator,
        new_name: String,
        observed: SplitPath,
    },
    ChangeStatus {
        target: Locator,
        status: Status,
    },
}

impl TreeAction {
    /// Short label for logs and audit records.
    pub fn label(&self) -> &'static str {
        match self {
            TreeAction::Create { .. } => "create",
            TreeAction::Delete { .. } => "delete",
            TreeAction::Rename { .. } => "rename",
            TreeAction::Move { .. } => "move",
            TreeAction::ChangeStatus { .. } => "change_status",
        }
    }

    pub fn target(&self) -> &Locator {
        match self {
            TreeAction::Create { target, .. }
            | TreeAction::Delete { target }
            | TreeAction::Rename { target, .. }
            | TreeAction::Move { target, .. }
            | TreeAction::ChangeStatus { target, .. } => target,
        }
    }
}
