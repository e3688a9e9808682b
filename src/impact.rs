//! Impact Propagator
//!
//! Computes which codex documents became stale after one tree mutation
//! without rescanning the whole tree: a small set of touched chains plus
//! their ancestor closure. A chain's codex summarizes its children, so an
//! ancestor must be re-rendered whenever any descendant chain changes.

use crate::actions::{Locator, TreeAction};
use crate::error::ReconcileError;
use crate::naming::NameCodec;
use crate::tree::ApplyOutcome;
use crate::types::{Chain, NodeKind, SplitPath, Status};

/// A section codex displaced by a rename or move. `observed_path` is the
/// codex file's physical location after the store's own folder move and
/// before any folder-level healing fix executed; deletions must target
/// where the file physically is, not where it should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedCodex {
    pub old_chain: Chain,
    pub new_chain: Chain,
    pub observed_path: Option<SplitPath>,
}

/// The set of codex documents invalidated by one tree mutation. Never
/// persisted; recomputed per action and merged across a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodexImpact {
    /// Chains whose codex content is stale.
    pub content_changed: Vec<Chain>,
    /// Section codexes that moved or were renamed.
    pub renamed: Vec<RenamedCodex>,
    /// Chains whose codex is gone with its section.
    pub deleted: Vec<Chain>,
    /// Sections whose descendant leaves had their status overwritten,
    /// with the propagated status.
    pub descendants_changed: Vec<(Chain, Status)>,
    /// Ancestor closure of every touched chain: the full set of codexes a
    /// consumer must re-render, O(depth) per action instead of O(n).
    pub impacted: Vec<Chain>,
}

impl CodexImpact {
    pub fn is_empty(&self) -> bool {
        self.content_changed.is_empty()
            && self.renamed.is_empty()
            && self.deleted.is_empty()
            && self.descendants_changed.is_empty()
            && self.impacted.is_empty()
    }

    /// Union another impact into this one, de-duplicating by chain
    /// identity. First occurrence wins for the ordering-sensitive lists.
    pub fn merge(&mut self, other: CodexImpact) {
        for chain in other.content_changed {
            push_chain(&mut self.content_changed, chain);
        }
        for renamed in other.renamed {
            if !self.renamed.iter().any(|r| r.old_chain == renamed.old_chain) {
                self.renamed.push(renamed);
            }
        }
        for chain in other.deleted {
            push_chain(&mut self.deleted, chain);
        }
        for (chain, status) in other.descendants_changed {
            if !self
                .descendants_changed
                .iter()
                .any(|(c, _)| *c == chain)
            {
                self.descendants_changed.push((chain, status));
            }
        }
        for chain in other.impacted {
            push_chain(&mut self.impacted, chain);
        }
    }
}

fn push_chain(list: &mut Vec<Chain>, chain: Chain) {
    if !list.contains(&chain) {
        list.push(chain);
    }
}

/// All root-inclusive prefixes of a chain, longest first.
fn ancestor_closure(chain: &[String]) -> Vec<Chain> {
    (1..=chain.len()).rev().map(|n| chain[..n].to_vec()).collect()
}

/// The impact propagator. Stateless apart from the codec.
#[derive(Debug, Clone)]
pub struct ImpactPropagator {
    codec: NameCodec,
}

impl ImpactPropagator {
    pub fn new(codec: NameCodec) -> Self {
        Self { codec }
    }

    /// Compute the impact of one applied action. Must be called after the
    /// mutation; pruned sections come from the apply outcome.
    pub fn impact(
        &self,
        action: &TreeAction,
        outcome: &ApplyOutcome,
    ) -> Result<CodexImpact, ReconcileError> {
        if !outcome.changed {
            return Ok(CodexImpact::default());
        }
        let mut impact = match action {
            TreeAction::Create { target, .. } | TreeAction::Delete { target }
                if target.kind != NodeKind::Section =>
            {
                self.leaf_content_impact(target)?
            }
            TreeAction::ChangeStatus { target, status } => match target.kind {
                NodeKind::Section => self.section_status_impact(target, *status)?,
                NodeKind::Scroll | NodeKind::File => self.leaf_content_impact(target)?,
            },
            TreeAction::Create { target, .. } => {
                // Section creation: the new section's codex and every
                // ancestor's listing are stale.
                let chain = self.full_name_chain(target)?;
                let mut impact = CodexImpact::default();
                impact.content_changed = ancestor_closure(&chain);
                impact.impacted = ancestor_closure(&chain);
                impact
            }
            TreeAction::Delete { target } => {
                let chain = self.full_name_chain(target)?;
                let mut impact = CodexImpact::default();
                impact.deleted.push(chain.clone());
                impact.impacted = ancestor_closure(&chain);
                impact
            }
            TreeAction::Rename { target, new_name } => match target.kind {
                NodeKind::Section => self.section_rename_impact(target, new_name, None)?,
                NodeKind::Scroll | NodeKind::File => self.leaf_content_impact(target)?,
            },
            TreeAction::Move {
                target,
                new_parent,
                new_name,
                observed,
            } => match target.kind {
                NodeKind::Section => {
                    self.section_move_impact(target, new_parent, new_name, observed)?
                }
                NodeKind::Scroll | NodeKind::File => {
                    self.leaf_move_impact(target, new_parent)?
                }
            },
        };

        // Sections pruned as a side effect lose their codex too.
        for chain in &outcome.pruned {
            push_chain(&mut impact.deleted, chain.clone());
            for ancestor in ancestor_closure(chain) {
                push_chain(&mut impact.impacted, ancestor);
            }
        }
        Ok(impact)
    }

    fn leaf_content_impact(&self, target: &Locator) -> Result<CodexImpact, ReconcileError> {
        let parent = self.codec.name_chain(&target.parent_chain)?;
        let mut impact = CodexImpact::default();
        impact.content_changed = ancestor_closure(&parent);
        impact.impacted = ancestor_closure(&parent);
        Ok(impact)
    }

    fn leaf_move_impact(
        &self,
        target: &Locator,
        new_parent: &Locator,
    ) -> Result<CodexImpact, ReconcileError> {
        let old_parent = self.codec.name_chain(&target.parent_chain)?;
        let new_parent = self.codec.name_chain(&new_parent.full_chain())?;
        let mut impact = CodexImpact::default();
        for chain in ancestor_closure(&old_parent) {
            push_chain(&mut impact.content_changed, chain);
        }
        for chain in ancestor_closure(&new_parent) {
            push_chain(&mut impact.content_changed, chain);
        }
        impact.impacted = impact.content_changed.clone();
        Ok(impact)
    }

    fn section_status_impact(
        &self,
        target: &Locator,
        status: Status,
    ) -> Result<CodexImpact, ReconcileError> {
        let chain = self.full_name_chain(target)?;
        let mut impact = CodexImpact::default();
        impact.content_changed = ancestor_closure(&chain);
        impact.impacted = ancestor_closure(&chain);
        impact.descendants_changed.push((chain, status));
        Ok(impact)
    }

    fn section_rename_impact(
        &self,
        target: &Locator,
        new_name: &str,
        observed_path: Option<SplitPath>,
    ) -> Result<CodexImpact, ReconcileError> {
        let old_chain = self.full_name_chain(target)?;
        let mut new_chain = self.codec.name_chain(&target.parent_chain)?;
        new_chain.push(self.codec.normalize(new_name));
        self.renamed_impact(old_chain, new_chain, observed_path)
    }

    fn section_move_impact(
        &self,
        target: &Locator,
        new_parent: &Locator,
        new_name: &str,
        observed: &SplitPath,
    ) -> Result<CodexImpact, ReconcileError> {
        let old_chain = self.full_name_chain(target)?;
        let mut new_chain = self.codec.name_chain(&new_parent.full_chain())?;
        new_chain.push(self.codec.normalize(new_name));

        // The stale codex physically sits inside the folder at the store's
        // intermediate position, still bearing its old-chain basename.
        let mut intermediate_parts = observed.path_parts.clone();
        intermediate_parts.push(observed.basename.clone());
        let stale = SplitPath {
            path_parts: intermediate_parts,
            basename: self.codec.codex_basename(&old_chain)?,
            kind: crate::types::PathKind::MdFile,
            extension: Some(self.codec.scroll_extension().to_string()),
        };
        self.renamed_impact(old_chain, new_chain, Some(stale))
    }

    fn renamed_impact(
        &self,
        old_chain: Chain,
        new_chain: Chain,
        observed_path: Option<SplitPath>,
    ) -> Result<CodexImpact, ReconcileError> {
        let mut impact = CodexImpact::default();
        for chain in ancestor_closure(&old_chain) {
            push_chain(&mut impact.impacted, chain);
        }
        for chain in ancestor_closure(&new_chain) {
            push_chain(&mut impact.impacted, chain);
        }
        impact.renamed.push(RenamedCodex {
            old_chain,
            new_chain,
            observed_path,
        });
        Ok(impact)
    }

    fn full_name_chain(&self, target: &Locator) -> Result<Chain, ReconcileError> {
        let parts = self.codec.decode_segment_id(&target.segment_id)?;
        let mut chain = self.codec.name_chain(&target.parent_chain)?;
        chain.push(parts.core_name);
        Ok(chain)
    }
}
