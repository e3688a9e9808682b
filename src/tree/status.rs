//! Read-time status aggregation over sections.
//!
//! A section's displayed status is never stored; it is recomputed on demand
//! from its descendants.

use super::node::{SectionNode, TreeNode};
use crate::types::Status;

/// Aggregate status of a section: `Done` iff the section is non-empty and
/// every descendant is recursively `Done`. Any empty section or any
/// `NotStarted`/`Unknown` leaf forces `NotStarted`.
pub fn section_status(section: &SectionNode) -> Status {
    if section.children.is_empty() {
        return Status::NotStarted;
    }
    for child in section.children.values() {
        let done = match child {
            TreeNode::Scroll(s) => s.status == Status::Done,
            TreeNode::File(_) => false,
            TreeNode::Section(s) => section_status(s) == Status::Done,
        };
        if !done {
            return Status::NotStarted;
        }
    }
    Status::Done
}
