//! Library tree node types.

use crate::naming::SegmentId;
use crate::types::{NodeKind, SplitPath, Status};
use std::collections::HashMap;

/// Section node: mirrors a folder. Children are keyed by segment id;
/// iteration order is irrelevant to correctness. `observed` is the split
/// path the creating event reported, kept as the event's identity so a
/// replay of that event is recognized after healing has already moved the
/// folder (implicitly created sections carry `None`).
#[derive(Debug, Clone)]
pub struct SectionNode {
    pub name: String,
    pub children: HashMap<SegmentId, TreeNode>,
    pub observed: Option<SplitPath>,
}

impl SectionNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: HashMap::new(),
            observed: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Scroll node: a markdown leaf with a trackable completion status.
#[derive(Debug, Clone)]
pub struct ScrollNode {
    pub name: String,
    pub status: Status,
    pub observed: Option<SplitPath>,
}

/// File node: a non-markdown leaf. Carries no meaningful status.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub name: String,
    pub extension: String,
    pub observed: Option<SplitPath>,
}

/// A node of the library tree. Closed sum; every consumer matches
/// exhaustively so a new kind cannot be silently mishandled.
#[derive(Debug, Clone)]
pub enum TreeNode {
    Section(SectionNode),
    Scroll(ScrollNode),
    File(FileNode),
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Section(s) => &s.name,
            TreeNode::Scroll(s) => &s.name,
            TreeNode::File(f) => &f.name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            TreeNode::Section(_) => NodeKind::Section,
            TreeNode::Scroll(_) => NodeKind::Scroll,
            TreeNode::File(_) => NodeKind::File,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            TreeNode::Section(s) => s.name = name,
            TreeNode::Scroll(s) => s.name = name,
            TreeNode::File(f) => f.name = name,
        }
    }

    /// The split path the creating (or last moving) event reported, if any.
    pub fn observed(&self) -> Option<&SplitPath> {
        match self {
            TreeNode::Section(s) => s.observed.as_ref(),
            TreeNode::Scroll(s) => s.observed.as_ref(),
            TreeNode::File(f) => f.observed.as_ref(),
        }
    }

    pub fn set_observed(&mut self, observed: Option<SplitPath>) {
        match self {
            TreeNode::Section(s) => s.observed = observed,
            TreeNode::Scroll(s) => s.observed = observed,
            TreeNode::File(f) => f.observed = observed,
        }
    }

    /// Leaf status as stored. Files report Unknown; sections have no
    /// stored status of their own (see aggregation in `tree::status`).
    pub fn status(&self) -> Option<Status> {
        match self {
            TreeNode::Section(_) => None,
            TreeNode::Scroll(s) => Some(s.status),
            TreeNode::File(_) => Some(Status::Unknown),
        }
    }
}
