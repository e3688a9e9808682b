//! The Library Tree
//!
//! In-memory rooted hierarchy of sections and leaves, keyed by segment id.
//! A section exists iff it is reachable from the root: sections come into
//! being only when a leaf is created or moved beneath them and are pruned
//! automatically once emptied. The five semantic actions in
//! [`crate::actions::TreeAction`] are the only transitions; a locator that
//! addresses a missing parent chain makes the operation a benign no-op
//! (`changed=false`), which may also mean "event already applied".

pub mod node;
pub mod status;

use crate::actions::{Locator, TreeAction};
use crate::error::{NamingError, ReconcileError};
use crate::naming::{NameCodec, SegmentId};
use crate::types::{Chain, NodeKind, SplitPath, Status};
use node::{FileNode, ScrollNode, SectionNode, TreeNode};
use tracing::{debug, warn};

/// Result of applying one action.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// Whether the tree state actually changed. Replayed events and
    /// locator misses report `false`.
    pub changed: bool,
    /// Snapshot of the affected node after the mutation (the removed node
    /// for deletes). Used by the healing cascade.
    pub node: Option<TreeNode>,
    /// Name chains of sections pruned as a side effect, deepest first.
    pub pruned: Vec<Chain>,
}

impl ApplyOutcome {
    fn unchanged() -> Self {
        Self {
            changed: false,
            node: None,
            pruned: Vec::new(),
        }
    }
}

/// The library tree. Exclusively owned by the reconciliation actor; all
/// mutation goes through [`Tree::apply`].
#[derive(Debug)]
pub struct Tree {
    codec: NameCodec,
    root_id: SegmentId,
    root: SectionNode,
}

impl Tree {
    pub fn new(codec: NameCodec, root_name: &str) -> Result<Self, NamingError> {
        let root_name = codec.normalize(root_name);
        let root_id = codec.section_id(&root_name)?;
        Ok(Self {
            codec,
            root_id,
            root: SectionNode::new(root_name),
        })
    }

    pub fn root(&self) -> &SectionNode {
        &self.root
    }

    pub fn root_name(&self) -> &str {
        &self.root.name
    }

    pub fn root_id(&self) -> &SegmentId {
        &self.root_id
    }

    pub fn codec(&self) -> &NameCodec {
        &self.codec
    }

    /// Locate a section by its root-inclusive name chain.
    pub fn find_section(&self, names: &[String]) -> Option<&SectionNode> {
        let ids = self.chain_ids(names).ok()?;
        self.resolve_section(&ids)
    }

    /// Ensure every section along a root-inclusive name chain exists,
    /// creating the missing tail. Used by collaborators that bypass the
    /// normal event flow.
    pub fn ensure_section_chain(&mut self, names: &[String]) -> Result<&SectionNode, NamingError> {
        let ids = self.chain_ids(names)?;
        if ids.first() != Some(&self.root_id) {
            return Err(NamingError::InvalidChain(format!(
                "chain does not start at root '{}'",
                self.root.name
            )));
        }
        let section = self
            .ensure_chain_ids(&ids)?
            .expect("root-prefixed chain always resolves");
        Ok(&*section)
    }

    /// Resolve the node a locator addresses, if present.
    pub fn resolve_node(&self, locator: &Locator) -> Option<&TreeNode> {
        let parent = self.resolve_section(&locator.parent_chain)?;
        parent.children.get(&locator.segment_id)
    }

    /// Locate a section by a root-prefixed segment-id chain.
    pub fn section_at(&self, ids: &[SegmentId]) -> Option<&SectionNode> {
        self.resolve_section(ids)
    }

    /// Apply one semantic action. Decode failures propagate (they signal
    /// corrupted segment ids, not user conditions); locator misses are
    /// benign no-ops.
    pub fn apply(&mut self, action: &TreeAction) -> Result<ApplyOutcome, ReconcileError> {
        let outcome = match action {
            TreeAction::Create {
                target,
                initial_status,
                observed,
            } => self.apply_create(target, *initial_status, observed)?,
            TreeAction::Delete { target } => self.apply_delete(target)?,
            TreeAction::Rename { target, new_name } => self.apply_rename(target, new_name)?,
            TreeAction::Move {
                target,
                new_parent,
                new_name,
                observed,
            } => self.apply_move(target, new_parent, new_name, observed)?,
            TreeAction::ChangeStatus { target, status } => {
                self.apply_change_status(target, *status)?
            }
        };
        debug!(
            action = action.label(),
            target = %action.target().segment_id,
            changed = outcome.changed,
            pruned = outcome.pruned.len(),
            "applied tree action"
        );
        Ok(outcome)
    }

    fn apply_create(
        &mut self,
        target: &Locator,
        initial_status: Option<Status>,
        observed: &SplitPath,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let parts = self.codec.decode_segment_id(&target.segment_id)?;
        let Some(parent) = self.ensure_chain_ids(&target.parent_chain)? else {
            return Ok(ApplyOutcome::unchanged());
        };
        if let Some(existing) = parent.children.get(&target.segment_id) {
            // Same segment id means same name, kind, and extension: a
            // replayed event. Status divergence flows through ChangeStatus.
            return Ok(ApplyOutcome {
                changed: false,
                node: Some(existing.clone()),
                pruned: Vec::new(),
            });
        }
        let observed = Some(observed.clone());
        let node = match parts.kind {
            NodeKind::Section => {
                let mut section = SectionNode::new(parts.core_name);
                section.observed = observed;
                TreeNode::Section(section)
            }
            NodeKind::Scroll => TreeNode::Scroll(ScrollNode {
                name: parts.core_name,
                status: initial_status.unwrap_or(Status::Unknown),
                observed,
            }),
            NodeKind::File => {
                let extension = parts.extension.ok_or_else(|| {
                    NamingError::ParseFailed(format!("file segment '{}'", target.segment_id))
                })?;
                TreeNode::File(FileNode {
                    name: parts.core_name,
                    extension,
                    observed,
                })
            }
        };
        let snapshot = node.clone();
        parent.children.insert(target.segment_id.clone(), node);
        Ok(ApplyOutcome {
            changed: true,
            node: Some(snapshot),
            pruned: Vec::new(),
        })
    }

    fn apply_delete(&mut self, target: &Locator) -> Result<ApplyOutcome, ReconcileError> {
        let (removed, pruned) = self.detach(&target.parent_chain, &target.segment_id);
        Ok(ApplyOutcome {
            changed: removed.is_some(),
            node: removed,
            pruned,
        })
    }

    fn apply_rename(
        &mut self,
        target: &Locator,
        new_name: &str,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let parts = self.codec.decode_segment_id(&target.segment_id)?;
        let new_name = self.codec.normalize(new_name);
        if new_name == parts.core_name {
            return Ok(ApplyOutcome::unchanged());
        }
        let new_id =
            self.codec
                .encode_segment_id(&new_name, parts.kind, parts.extension.as_deref())?;
        let Some(parent) = self.resolve_section_mut(&target.parent_chain) else {
            return Ok(ApplyOutcome::unchanged());
        };
        if parent.children.contains_key(&new_id) {
            warn!(from = %target.segment_id, to = %new_id, "rename destination occupied; skipping");
            return Ok(ApplyOutcome::unchanged());
        }
        let Some(mut node) = parent.children.remove(&target.segment_id) else {
            return Ok(ApplyOutcome::unchanged());
        };
        node.set_name(new_name);
        // The creating event's identity no longer matches the re-keyed node.
        node.set_observed(None);
        let snapshot = node.clone();
        parent.children.insert(new_id, node);
        Ok(ApplyOutcome {
            changed: true,
            node: Some(snapshot),
            pruned: Vec::new(),
        })
    }

    fn apply_move(
        &mut self,
        target: &Locator,
        new_parent: &Locator,
        new_name: &str,
        observed: &SplitPath,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let parts = self.codec.decode_segment_id(&target.segment_id)?;
        let new_name = self.codec.normalize(new_name);
        let new_id =
            self.codec
                .encode_segment_id(&new_name, parts.kind, parts.extension.as_deref())?;
        let new_parent_ids = new_parent.full_chain();

        if new_parent_ids.first() != Some(&self.root_id) {
            return Ok(ApplyOutcome::unchanged());
        }
        if new_parent_ids == target.parent_chain && new_id == target.segment_id {
            return Ok(ApplyOutcome::unchanged());
        }
        if parts.kind == NodeKind::Section {
            // A section cannot be moved into its own subtree.
            let own_chain = target.full_chain();
            if new_parent_ids.len() >= own_chain.len()
                && new_parent_ids[..own_chain.len()] == own_chain[..]
            {
                warn!(target = %target.segment_id, "move into own subtree; skipping");
                return Ok(ApplyOutcome::unchanged());
            }
        }
        if let Some(dest) = self.resolve_section(&new_parent_ids) {
            if dest.children.contains_key(&new_id) {
                warn!(target = %target.segment_id, to = %new_id, "move destination occupied; skipping");
                return Ok(ApplyOutcome::unchanged());
            }
        }

        let (removed, pruned) = self.detach(&target.parent_chain, &target.segment_id);
        let Some(mut node) = removed else {
            return Ok(ApplyOutcome::unchanged());
        };
        node.set_name(new_name);
        node.set_observed(Some(observed.clone()));
        let snapshot = node.clone();
        let dest = self
            .ensure_chain_ids(&new_parent_ids)?
            .ok_or_else(|| ReconcileError::TreeInconsistent("move destination vanished".into()))?;
        dest.children.insert(new_id, node);
        Ok(ApplyOutcome {
            changed: true,
            node: Some(snapshot),
            pruned,
        })
    }

    fn apply_change_status(
        &mut self,
        target: &Locator,
        status: Status,
    ) -> Result<ApplyOutcome, ReconcileError> {
        match target.kind {
            NodeKind::File => Ok(ApplyOutcome::unchanged()),
            NodeKind::Scroll => {
                let Some(parent) = self.resolve_section_mut(&target.parent_chain) else {
                    return Ok(ApplyOutcome::unchanged());
                };
                match parent.children.get_mut(&target.segment_id) {
                    Some(TreeNode::Scroll(scroll)) => {
                        if scroll.status == status {
                            return Ok(ApplyOutcome::unchanged());
                        }
                        scroll.status = status;
                        let snapshot = TreeNode::Scroll(scroll.clone());
                        Ok(ApplyOutcome {
                            changed: true,
                            node: Some(snapshot),
                            pruned: Vec::new(),
                        })
                    }
                    _ => Ok(ApplyOutcome::unchanged()),
                }
            }
            NodeKind::Section => {
                let chain = target.full_chain();
                let Some(section) = self.resolve_section_mut(&chain) else {
                    return Ok(ApplyOutcome::unchanged());
                };
                let changed = set_descendant_status(section, status);
                let snapshot = TreeNode::Section(section.clone());
                Ok(ApplyOutcome {
                    changed,
                    node: Some(snapshot),
                    pruned: Vec::new(),
                })
            }
        }
    }

    /// Remove the node under `segment_id` inside the section addressed by
    /// `parent_ids`, then prune emptied ancestors up to (never including)
    /// the root. Returns the removed node and the pruned name chains.
    fn detach(
        &mut self,
        parent_ids: &[SegmentId],
        segment_id: &SegmentId,
    ) -> (Option<TreeNode>, Vec<Chain>) {
        if parent_ids.first() != Some(&self.root_id) {
            return (None, Vec::new());
        }
        let mut chain = vec![self.root.name.clone()];
        let mut pruned = Vec::new();
        let removed = remove_in(
            &mut self.root,
            &parent_ids[1..],
            segment_id,
            &mut chain,
            &mut pruned,
        );
        (removed, pruned)
    }

    fn resolve_section(&self, ids: &[SegmentId]) -> Option<&SectionNode> {
        if ids.first() != Some(&self.root_id) {
            return None;
        }
        let mut current = &self.root;
        for id in &ids[1..] {
            match current.children.get(id) {
                Some(TreeNode::Section(section)) => current = section,
                _ => return None,
            }
        }
        Some(current)
    }

    fn resolve_section_mut(&mut self, ids: &[SegmentId]) -> Option<&mut SectionNode> {
        if ids.first() != Some(&self.root_id) {
            return None;
        }
        let mut current = &mut self.root;
        for id in &ids[1..] {
            match current.children.get_mut(id) {
                Some(TreeNode::Section(section)) => current = section,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Walk a root-prefixed segment-id chain, creating missing sections.
    /// Returns `None` when the chain does not start at the root. Fails if
    /// a leaf occupies a segment id in an ancestor position.
    fn ensure_chain_ids(
        &mut self,
        ids: &[SegmentId],
    ) -> Result<Option<&mut SectionNode>, NamingError> {
        if ids.first() != Some(&self.root_id) {
            return Ok(None);
        }
        let codec = self.codec.clone();
        let mut current = &mut self.root;
        for id in &ids[1..] {
            let parts = codec.decode_segment_id(id)?;
            if parts.kind != NodeKind::Section {
                return Err(NamingError::InvalidChain(format!(
                    "non-section segment '{}' in parent chain",
                    id
                )));
            }
            let entry = current
                .children
                .entry(id.clone())
                .or_insert_with(|| TreeNode::Section(SectionNode::new(parts.core_name)));
            match entry {
                TreeNode::Section(section) => current = section,
                _ => {
                    return Err(NamingError::InvalidChain(format!(
                        "leaf '{}' occupies a section slot",
                        id
                    )))
                }
            }
        }
        Ok(Some(current))
    }

    fn chain_ids(&self, names: &[String]) -> Result<Vec<SegmentId>, NamingError> {
        names.iter().map(|n| self.codec.section_id(n)).collect()
    }
}

fn remove_in(
    section: &mut SectionNode,
    path: &[SegmentId],
    target: &SegmentId,
    chain: &mut Chain,
    pruned: &mut Vec<Chain>,
) -> Option<TreeNode> {
    if path.is_empty() {
        return section.children.remove(target);
    }
    let id = &path[0];
    let removed = match section.children.get_mut(id) {
        Some(TreeNode::Section(child)) => {
            chain.push(child.name.clone());
            let removed = remove_in(child, &path[1..], target, chain, pruned);
            let emptied = removed.is_some() && child.children.is_empty();
            if emptied {
                pruned.push(chain.clone());
            }
            chain.pop();
            if emptied {
                section.children.remove(id);
            }
            removed
        }
        _ => None,
    };
    removed
}

fn set_descendant_status(section: &mut SectionNode, status: Status) -> bool {
    let mut changed = false;
    for child in section.children.values_mut() {
        match child {
            TreeNode::Scroll(scroll) => {
                if scroll.status != status {
                    scroll.status = status;
                    changed = true;
                }
            }
            TreeNode::File(_) => {}
            TreeNode::Section(sub) => {
                changed |= set_descendant_status(sub, status);
            }
        }
    }
    changed
}
