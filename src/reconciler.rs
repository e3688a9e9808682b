//! Reconciler
//!
//! Single-writer, run-to-completion actor owning the library tree.
//! External event batches are serialized through a channel: one batch is
//! fully processed (tree mutation, healing computation, impact
//! computation, external dispatch) before the next is admitted. There is
//! no locking because nothing else ever touches the tree, and no
//! cancellation; replayed events short-circuit via `changed=false`.

use crate::actions::TreeAction;
use crate::error::ReconcileError;
use crate::healing::{HealingAction, HealingEngine};
use crate::impact::{CodexImpact, ImpactPropagator};
use crate::transaction::{ActionRecord, ReconcileOutcome, ReconcileTransaction};
use crate::tree::Tree;
use crate::types::{PathKind, SplitPath, Status};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Codex maintenance instruction for the external generator. Content
/// formatting lives outside the core; each action is addressed by the
/// codex document's canonical split path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodexAction {
    Ensure { path: SplitPath },
    Regenerate { path: SplitPath },
    WriteStatus { path: SplitPath, status: Status },
}

/// Outbound boundary: executes healing renames/deletes and codex
/// maintenance against the real store.
#[async_trait]
pub trait VaultDispatcher: Send + Sync {
    async fn apply_healing(&self, actions: &[HealingAction]) -> Result<(), ReconcileError>;
    async fn apply_codex(&self, actions: &[CodexAction]) -> Result<(), ReconcileError>;
}

/// Reconciler counters.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerStats {
    pub batches: usize,
    pub applied: usize,
    pub skipped: usize,
    pub healing_dispatched: usize,
    pub codex_dispatched: usize,
    pub dispatch_failures: usize,
}

/// Translate a merged impact into concrete outbound work: stale-codex
/// deletions (expressed as healing `DeleteMdFile`s, targeting where each
/// file physically is) plus ensure/regenerate/write-status codex actions.
pub fn codex_plan(
    impact: &CodexImpact,
    tree: &Tree,
) -> Result<(Vec<HealingAction>, Vec<CodexAction>), ReconcileError> {
    let codec = tree.codec();
    let mut deletions = Vec::new();
    let mut actions = Vec::new();
    let mut regenerated: HashSet<Vec<String>> = HashSet::new();

    for renamed in &impact.renamed {
        // Without an observed intermediate path the folder was renamed in
        // place: the stale codex sits at the new location under its
        // old-chain basename.
        let stale = match &renamed.observed_path {
            Some(path) => path.clone(),
            None => SplitPath {
                path_parts: renamed.new_chain.clone(),
                basename: codec.codex_basename(&renamed.old_chain)?,
                kind: PathKind::MdFile,
                extension: Some(codec.scroll_extension().to_string()),
            },
        };
        deletions.push(HealingAction::DeleteMdFile { path: stale });
        let path = codec.canonical_codex_path(&renamed.new_chain)?;
        actions.push(CodexAction::Ensure { path: path.clone() });
        actions.push(CodexAction::Regenerate { path });
        regenerated.insert(renamed.new_chain.clone());
    }

    for chain in &impact.impacted {
        if impact.deleted.contains(chain) || regenerated.contains(chain) {
            continue;
        }
        // A codex only exists for sections still in the tree; ancestors of
        // a renamed chain's old position may have gone with it.
        if tree.find_section(chain).is_none() {
            continue;
        }
        regenerated.insert(chain.clone());
        actions.push(CodexAction::Regenerate {
            path: codec.canonical_codex_path(chain)?,
        });
    }

    for (chain, status) in &impact.descendants_changed {
        actions.push(CodexAction::WriteStatus {
            path: codec.canonical_codex_path(chain)?,
            status: *status,
        });
    }

    Ok((deletions, actions))
}

/// The reconciliation actor. Exclusively owns the tree.
pub struct Reconciler<D: VaultDispatcher> {
    tree: Tree,
    dispatcher: D,
    stats: Arc<RwLock<ReconcilerStats>>,
    audit: Vec<ActionRecord>,
}

impl<D: VaultDispatcher> Reconciler<D> {
    pub fn new(tree: Tree, dispatcher: D) -> Self {
        Self {
            tree,
            dispatcher,
            stats: Arc::new(RwLock::new(ReconcilerStats::default())),
            audit: Vec::new(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Collaborator escape hatch for programmatic section creation,
    /// bypassing the normal event flow.
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats.read().clone()
    }

    pub fn audit(&self) -> &[ActionRecord] {
        &self.audit
    }

    /// The audit trail as pretty-printed JSON, for inspection tooling.
    pub fn audit_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.audit)
    }

    /// Process one batch to completion: apply, heal, propagate, dispatch.
    /// The computation itself is synchronous CPU work; only the dispatch
    /// suspends.
    pub async fn process_batch(
        &mut self,
        batch: Vec<TreeAction>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let codec = self.tree.codec().clone();
        let mut txn = ReconcileTransaction::new(
            HealingEngine::new(codec.clone()),
            ImpactPropagator::new(codec),
        );

        let result = txn.run(&mut self.tree, batch);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.audit.extend(txn.records().iter().cloned());
                self.stats.write().batches += 1;
                return Err(err);
            }
        };

        let (codex_deletions, codex_actions) = codex_plan(&outcome.impact, &self.tree)?;
        let mut healing = outcome.healing.clone();
        healing.extend(codex_deletions);

        if !healing.is_empty() {
            if let Err(err) = self.dispatcher.apply_healing(&healing).await {
                self.record_dispatch_failure(&mut txn, "healing", &err);
            } else {
                self.stats.write().healing_dispatched += healing.len();
            }
        }
        if !codex_actions.is_empty() {
            if let Err(err) = self.dispatcher.apply_codex(&codex_actions).await {
                self.record_dispatch_failure(&mut txn, "codex", &err);
            } else {
                self.stats.write().codex_dispatched += codex_actions.len();
            }
        }

        self.audit.extend(txn.records().iter().cloned());
        {
            let mut stats = self.stats.write();
            stats.batches += 1;
            stats.applied += outcome.applied;
            stats.skipped += outcome.skipped;
        }
        debug!(
            applied = outcome.applied,
            skipped = outcome.skipped,
            healing = healing.len(),
            codex = codex_actions.len(),
            "batch processed"
        );
        Ok(outcome)
    }

    fn record_dispatch_failure(
        &self,
        txn: &mut ReconcileTransaction,
        stage: &str,
        err: &ReconcileError,
    ) {
        let recoverable = match err {
            ReconcileError::VaultFailed { recoverable, .. } => *recoverable,
            _ => false,
        };
        txn.record_dispatch_failure(stage, &err.to_string(), recoverable);
        self.stats.write().dispatch_failures += 1;
    }

    /// Drive the actor from a channel of batches until it closes. A fatal
    /// error stops the actor: the in-memory tree may have diverged from
    /// the store and requires a rebuild from scan.
    pub async fn run(mut self, mut batches: mpsc::Receiver<Vec<TreeAction>>) {
        info!(root = %self.tree.root_name(), "reconciler started");
        while let Some(batch) = batches.recv().await {
            match self.process_batch(batch).await {
                Ok(_) => {}
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "fatal reconciliation error; rebuild required");
                    break;
                }
                Err(err) => {
                    error!(error = %err, "batch failed");
                }
            }
        }
        info!("reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Locator;
    use crate::config::LibraryConfig;
    use crate::naming::NameCodec;
    use crate::types::NodeKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        healing: Mutex<Vec<HealingAction>>,
        codex: Mutex<Vec<CodexAction>>,
        fail_healing: bool,
    }

    #[async_trait]
    impl VaultDispatcher for RecordingDispatcher {
        async fn apply_healing(&self, actions: &[HealingAction]) -> Result<(), ReconcileError> {
            if self.fail_healing {
                return Err(ReconcileError::VaultFailed {
                    message: "store offline".to_string(),
                    recoverable: true,
                });
            }
            self.healing.lock().extend(actions.iter().cloned());
            Ok(())
        }

        async fn apply_codex(&self, actions: &[CodexAction]) -> Result<(), ReconcileError> {
            self.codex.lock().extend(actions.iter().cloned());
            Ok(())
        }
    }

    fn reconciler(fail_healing: bool) -> Reconciler<RecordingDispatcher> {
        let codec = NameCodec::new(&LibraryConfig::default());
        let tree = Tree::new(codec, "Library").unwrap();
        Reconciler::new(
            tree,
            RecordingDispatcher {
                fail_healing,
                ..Default::default()
            },
        )
    }

    fn create_action(tree: &Tree, parents: &[&str], name: &str) -> TreeAction {
        let chain = parents
            .iter()
            .map(|n| tree.codec().section_id(n).unwrap())
            .collect();
        let target = Locator::new(chain, tree.codec().scroll_id(name).unwrap(), NodeKind::Scroll);
        let observed = tree.codec().canonical_leaf_path(&target).unwrap();
        TreeAction::Create {
            target,
            initial_status: None,
            observed,
        }
    }

    #[tokio::test]
    async fn canonical_batch_dispatches_codex_regeneration_only() {
        let mut reconciler = reconciler(false);
        let action = create_action(reconciler.tree(), &["Library", "a"], "x");
        let outcome = reconciler.process_batch(vec![action]).await.unwrap();
        assert_eq!(outcome.applied, 1);
        assert!(outcome.healing.is_empty());
        let codex = reconciler.dispatcher.codex.lock();
        assert!(codex
            .iter()
            .all(|a| matches!(a, CodexAction::Regenerate { .. })));
        assert_eq!(codex.len(), 2); // ["Library","a"] and ["Library"]
    }

    #[tokio::test]
    async fn dispatch_failure_is_recorded_not_fatal() {
        let mut reconciler = reconciler(true);
        let chain = vec![reconciler.tree().codec().section_id("Library").unwrap()];
        let target = Locator::new(
            chain,
            reconciler.tree().codec().scroll_id("x").unwrap(),
            NodeKind::Scroll,
        );
        let observed = SplitPath::md_file(vec!["Library".to_string()], "wrong-name");
        let outcome = reconciler
            .process_batch(vec![TreeAction::Create {
                target,
                initial_status: None,
                observed,
            }])
            .await
            .unwrap();
        assert_eq!(outcome.healing.len(), 1);
        assert_eq!(reconciler.stats().dispatch_failures, 1);
        assert!(reconciler
            .audit()
            .iter()
            .any(|record| record.error.is_some()));
    }

    #[tokio::test]
    async fn audit_exports_as_json() {
        let mut reconciler = reconciler(false);
        let action = create_action(reconciler.tree(), &["Library", "a"], "x");
        reconciler.process_batch(vec![action]).await.unwrap();
        let json = reconciler.audit_json().unwrap();
        assert!(json.contains("\"action\": \"create\""));
        assert!(json.contains("\"changed\": true"));
    }

    #[tokio::test]
    async fn batches_are_serialized_through_the_channel() {
        let codec = NameCodec::new(&LibraryConfig::default());
        let tree = Tree::new(codec, "Library").unwrap();
        let dispatcher = RecordingDispatcher::default();
        let reconciler = Reconciler::new(tree, dispatcher);
        let stats = reconciler.stats.clone();

        let (tx, rx) = mpsc::channel(8);
        let scratch = Tree::new(NameCodec::new(&LibraryConfig::default()), "Library").unwrap();
        tx.send(vec![create_action(&scratch, &["Library", "a"], "x")])
            .await
            .unwrap();
        tx.send(vec![create_action(&scratch, &["Library", "a"], "x")])
            .await
            .unwrap();
        drop(tx);
        reconciler.run(rx).await;

        let stats = stats.read();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.skipped, 1);
    }
}
