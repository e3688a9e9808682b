//! Reconciliation Transaction
//!
//! Batches tree actions, aggregates their healing actions and codex
//! impacts, and keeps an audit trail per action. There is no rollback of
//! tree mutations: a fatal error marks the batch failed for audit and
//! aborts further dispatch, and recovery is a full rebuild from scan.

use crate::actions::{Locator, TreeAction};
use crate::dedup;
use crate::error::ReconcileError;
use crate::healing::{HealingAction, HealingEngine};
use crate::impact::{CodexImpact, ImpactPropagator};
use crate::tree::node::TreeNode;
use crate::tree::Tree;
use crate::types::NodeKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

/// Audit entry for one processed action (or one dispatch failure).
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub action: String,
    pub target: String,
    pub changed: bool,
    pub healing_emitted: usize,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Aggregated result of one batch.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub healing: Vec<HealingAction>,
    pub impact: CodexImpact,
    /// Actions that changed tree state.
    pub applied: usize,
    /// Replays and locator misses, short-circuited before healing.
    pub skipped: usize,
}

/// One batch's transaction state.
pub struct ReconcileTransaction {
    engine: HealingEngine,
    propagator: ImpactPropagator,
    records: Vec<ActionRecord>,
    failed: bool,
}

impl ReconcileTransaction {
    pub fn new(engine: HealingEngine, propagator: ImpactPropagator) -> Self {
        Self {
            engine,
            propagator,
            records: Vec::new(),
            failed: false,
        }
    }

    /// Apply a batch of actions to the tree, aggregating healing actions
    /// and impacts. Stops at the first fatal error; mutations already
    /// applied stay applied.
    pub fn run(
        &mut self,
        tree: &mut Tree,
        actions: Vec<TreeAction>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut outcome = ReconcileOutcome::default();
        for action in actions {
            let action = match self.prepare(tree, action) {
                Ok(action) => action,
                Err(err) => {
                    self.abort("prepare", &err);
                    return Err(err);
                }
            };
            match self.process(tree, &action) {
                Ok((changed, healing, impact)) => {
                    self.records.push(ActionRecord {
                        action: action.label().to_string(),
                        target: action.target().segment_id.to_string(),
                        changed,
                        healing_emitted: healing.len(),
                        error: None,
                        at: Utc::now(),
                    });
                    if changed {
                        outcome.applied += 1;
                        outcome.healing.extend(healing);
                        outcome.impact.merge(impact);
                    } else {
                        outcome.skipped += 1;
                    }
                }
                Err(err) => {
                    self.records.push(ActionRecord {
                        action: action.label().to_string(),
                        target: action.target().segment_id.to_string(),
                        changed: false,
                        healing_emitted: 0,
                        error: Some(err.to_string()),
                        at: Utc::now(),
                    });
                    self.abort(action.label(), &err);
                    return Err(err);
                }
            }
        }
        info!(
            applied = outcome.applied,
            skipped = outcome.skipped,
            healing = outcome.healing.len(),
            "batch reconciled"
        );
        Ok(outcome)
    }

    fn process(
        &self,
        tree: &mut Tree,
        action: &TreeAction,
    ) -> Result<(bool, Vec<HealingAction>, CodexImpact), ReconcileError> {
        let applied = tree.apply(action)?;
        if !applied.changed {
            return Ok((false, Vec::new(), CodexImpact::default()));
        }
        let healing = self.engine.heal(action, &applied)?;
        let impact = self.propagator.impact(action, &applied)?;
        Ok((true, healing, impact))
    }

    /// Create-collision pre-pass: when the target segment id already holds
    /// an unrelated node (two distinct files canonicalizing to the same
    /// slot), the incoming node is renamed via the duplicate resolver
    /// before insertion rather than silently overwriting. A replay passes
    /// through untouched and short-circuits inside `Tree::apply`; an event
    /// replays when the occupant recorded the same observed split path at
    /// creation, or when the observed path is already canonical.
    fn prepare(&self, tree: &Tree, action: TreeAction) -> Result<TreeAction, ReconcileError> {
        let (target, initial_status, observed) = match action {
            TreeAction::Create {
                target,
                initial_status,
                observed,
            } => (target, initial_status, observed),
            other => return Ok(other),
        };
        let Some(occupant) = tree.resolve_node(&target) else {
            return Ok(TreeAction::Create {
                target,
                initial_status,
                observed,
            });
        };
        // Replay of the event that created the occupant: same segment id
        // and the same reported split path, even when that path was
        // non-canonical and healing has since vacated it.
        if occupant.observed() == Some(&observed) {
            return Ok(TreeAction::Create {
                target,
                initial_status,
                observed,
            });
        }
        let codec = tree.codec();
        let canonical = match target.kind {
            NodeKind::Section => codec.canonical_section_path(&target)?,
            NodeKind::Scroll | NodeKind::File => codec.canonical_leaf_path(&target)?,
        };
        if observed == canonical {
            return Ok(TreeAction::Create {
                target,
                initial_status,
                observed,
            });
        }

        let parts = codec.decode_segment_id(&target.segment_id)?;
        let parent = tree.section_at(&target.parent_chain).ok_or_else(|| {
            ReconcileError::TreeInconsistent("occupied slot without a parent section".to_string())
        })?;
        let mut taken: HashSet<String> = HashSet::new();
        for (id, child) in &parent.children {
            let sibling = codec.decode_segment_id(id)?;
            let same_slot_kind = match child {
                TreeNode::Section(_) => parts.kind == NodeKind::Section,
                TreeNode::Scroll(_) => parts.kind == NodeKind::Scroll,
                TreeNode::File(_) => {
                    parts.kind == NodeKind::File && sibling.extension == parts.extension
                }
            };
            if same_slot_kind {
                taken.insert(sibling.core_name);
            }
        }
        let fresh = dedup::resolve(&parts.core_name, &taken);
        warn!(
            desired = %parts.core_name,
            resolved = %fresh,
            "create collision; renaming incoming node"
        );
        let new_id = codec.encode_segment_id(&fresh, parts.kind, parts.extension.as_deref())?;
        Ok(TreeAction::Create {
            target: Locator::new(target.parent_chain, new_id, target.kind),
            initial_status,
            observed,
        })
    }

    fn abort(&mut self, stage: &str, err: &ReconcileError) {
        warn!(stage, error = %err, "batch aborted; tree mutations are not rolled back");
        self.failed = true;
    }

    /// Record a failed dispatch of a healing/codex action. Retry policy
    /// belongs to the external dispatcher.
    pub fn record_dispatch_failure(&mut self, action: &str, message: &str, recoverable: bool) {
        self.records.push(ActionRecord {
            action: action.to_string(),
            target: String::new(),
            changed: false,
            healing_emitted: 0,
            error: Some(format!(
                "dispatch failed ({}): {}",
                if recoverable { "recoverable" } else { "permanent" },
                message
            )),
            at: Utc::now(),
        });
        if !recoverable {
            self.failed = true;
        }
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn failed(&self) -> bool {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::naming::NameCodec;
    use crate::types::SplitPath;

    fn setup() -> (Tree, ReconcileTransaction) {
        let codec = NameCodec::new(&LibraryConfig::default());
        let tree = Tree::new(codec.clone(), "Library").unwrap();
        let txn = ReconcileTransaction::new(
            HealingEngine::new(codec.clone()),
            ImpactPropagator::new(codec),
        );
        (tree, txn)
    }

    fn scroll_create(tree: &Tree, parents: &[&str], name: &str, observed_base: &str) -> TreeAction {
        let chain = parents
            .iter()
            .map(|n| tree.codec().section_id(n).unwrap())
            .collect();
        let target = Locator::new(
            chain,
            tree.codec().scroll_id(name).unwrap(),
            NodeKind::Scroll,
        );
        let observed = SplitPath::md_file(
            parents.iter().map(|s| s.to_string()).collect(),
            observed_base,
        );
        TreeAction::Create {
            target,
            initial_status: None,
            observed,
        }
    }

    #[test]
    fn replayed_batch_is_all_skips() {
        let (mut tree, mut txn) = setup();
        let action = scroll_create(&tree, &["Library", "a"], "x", "x-a");
        let first = txn.run(&mut tree, vec![action.clone()]).unwrap();
        assert_eq!(first.applied, 1);
        let second = txn.run(&mut tree, vec![action]).unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.skipped, 1);
        assert!(second.healing.is_empty());
        assert!(second.impact.is_empty());
    }

    #[test]
    fn replayed_drifted_create_stays_a_noop() {
        let (mut tree, mut txn) = setup();
        // Observed at a non-canonical path: the first application heals it.
        let action = scroll_create(&tree, &["Library", "a"], "x", "x");
        let first = txn.run(&mut tree, vec![action.clone()]).unwrap();
        assert_eq!(first.applied, 1);
        assert_eq!(first.healing.len(), 1);

        // The same event again: no phantom sibling, no second rename.
        let second = txn.run(&mut tree, vec![action]).unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.skipped, 1);
        assert!(second.healing.is_empty());
        assert!(second.impact.is_empty());
    }

    #[test]
    fn create_collision_renames_incoming_node() {
        let (mut tree, mut txn) = setup();
        let first = scroll_create(&tree, &["Library"], "Untitled", "Untitled-Library");
        txn.run(&mut tree, vec![first]).unwrap();

        // A second, unrelated "Untitled" observed at a different path.
        let second = scroll_create(&tree, &["Library"], "Untitled", "Untitled");
        let outcome = txn.run(&mut tree, vec![second]).unwrap();
        assert_eq!(outcome.applied, 1);
        // The incoming node was renamed and healed to its deduplicated
        // canonical basename.
        assert_eq!(outcome.healing.len(), 1);
        match &outcome.healing[0] {
            HealingAction::RenameMdFile { from, to } => {
                assert_eq!(from.basename, "Untitled");
                assert_eq!(to.basename, "Untitled 2-Library");
            }
            other => panic!("unexpected healing action: {:?}", other),
        }
    }

    #[test]
    fn audit_records_every_action() {
        let (mut tree, mut txn) = setup();
        let a = scroll_create(&tree, &["Library", "a"], "x", "x-a");
        let b = scroll_create(&tree, &["Library", "a"], "x", "x-a");
        txn.run(&mut tree, vec![a, b]).unwrap();
        assert_eq!(txn.records().len(), 2);
        assert!(txn.records()[0].changed);
        assert!(!txn.records()[1].changed);
        assert!(!txn.failed());
    }

    #[test]
    fn dispatch_failure_is_audited_not_retried() {
        let (_, mut txn) = setup();
        txn.record_dispatch_failure("rename_md_file", "store offline", true);
        assert_eq!(txn.records().len(), 1);
        assert!(!txn.failed());
        txn.record_dispatch_failure("rename_md_file", "store gone", false);
        assert!(txn.failed());
    }
}
