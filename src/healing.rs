//! Diff/Healing Engine
//!
//! For a tree action that actually changed state, decides whether the
//! store needs correction and emits the minimal rename actions. Renaming
//! or moving a section shifts the encoded suffix of every descendant leaf,
//! so those actions recurse over the mutated subtree comparing what each
//! file is still named (old suffix, current location) against what it
//! should be named (new suffix, canonical location).

use crate::actions::{Locator, TreeAction};
use crate::error::ReconcileError;
use crate::naming::NameCodec;
use crate::tree::node::{SectionNode, TreeNode};
use crate::tree::ApplyOutcome;
use crate::types::{Chain, NodeKind, PathKind, SplitPath};
use tracing::debug;

/// Concrete store-level instruction for the external dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealingAction {
    RenameFolder { from: SplitPath, to: SplitPath },
    RenameFile { from: SplitPath, to: SplitPath },
    RenameMdFile { from: SplitPath, to: SplitPath },
    DeleteMdFile { path: SplitPath },
}

impl HealingAction {
    pub fn label(&self) -> &'static str {
        match self {
            HealingAction::RenameFolder { .. } => "rename_folder",
            HealingAction::RenameFile { .. } => "rename_file",
            HealingAction::RenameMdFile { .. } => "rename_md_file",
            HealingAction::DeleteMdFile { .. } => "delete_md_file",
        }
    }
}

/// The healing engine. Stateless apart from the codec; reads the mutated
/// subtree snapshot produced by `Tree::apply`.
#[derive(Debug, Clone)]
pub struct HealingEngine {
    codec: NameCodec,
}

impl HealingEngine {
    pub fn new(codec: NameCodec) -> Self {
        Self { codec }
    }

    /// Compute corrective actions for an applied tree action. Callers
    /// short-circuit on `changed=false` outcomes; passing one here yields
    /// no actions.
    pub fn heal(
        &self,
        action: &TreeAction,
        outcome: &ApplyOutcome,
    ) -> Result<Vec<HealingAction>, ReconcileError> {
        if !outcome.changed {
            return Ok(Vec::new());
        }
        let actions = match action {
            TreeAction::Create {
                target, observed, ..
            } => self.heal_create(target, observed)?,
            TreeAction::Delete { .. } | TreeAction::ChangeStatus { .. } => Vec::new(),
            TreeAction::Rename { target, new_name } => match target.kind {
                NodeKind::Section => self.heal_section_rename(target, new_name, outcome)?,
                NodeKind::Scroll | NodeKind::File => self.heal_leaf_rename(target, new_name)?,
            },
            TreeAction::Move {
                target,
                new_parent,
                new_name,
                observed,
            } => match target.kind {
                NodeKind::Section => {
                    self.heal_section_move(target, new_parent, new_name, observed, outcome)?
                }
                NodeKind::Scroll | NodeKind::File => {
                    self.heal_leaf_move(target, new_parent, new_name, observed)?
                }
            },
        };
        if !actions.is_empty() {
            debug!(
                action = action.label(),
                corrections = actions.len(),
                "healing actions computed"
            );
        }
        Ok(actions)
    }

    fn heal_create(
        &self,
        target: &Locator,
        observed: &SplitPath,
    ) -> Result<Vec<HealingAction>, ReconcileError> {
        let canonical = match target.kind {
            NodeKind::Section => self.codec.canonical_section_path(target)?,
            NodeKind::Scroll | NodeKind::File => self.codec.canonical_leaf_path(target)?,
        };
        if *observed == canonical {
            return Ok(Vec::new());
        }
        Ok(vec![self.rename_for(observed.clone(), canonical)])
    }

    fn heal_leaf_rename(
        &self,
        target: &Locator,
        new_name: &str,
    ) -> Result<Vec<HealingAction>, ReconcileError> {
        let parts = self.codec.decode_segment_id(&target.segment_id)?;
        let from = self.codec.canonical_leaf_path(target)?;
        let new_id =
            self.codec
                .encode_segment_id(new_name, parts.kind, parts.extension.as_deref())?;
        let renamed = Locator::new(target.parent_chain.clone(), new_id, target.kind);
        let to = self.codec.canonical_leaf_path(&renamed)?;
        if from == to {
            return Ok(Vec::new());
        }
        Ok(vec![self.rename_for(from, to)])
    }

    fn heal_section_rename(
        &self,
        target: &Locator,
        new_name: &str,
        outcome: &ApplyOutcome,
    ) -> Result<Vec<HealingAction>, ReconcileError> {
        let parts = self.codec.decode_segment_id(&target.segment_id)?;
        let parent_names = self.codec.name_chain(&target.parent_chain)?;
        let mut old_chain = parent_names.clone();
        old_chain.push(parts.core_name);
        let mut new_chain = parent_names;
        new_chain.push(self.codec.normalize(new_name));
        // The store renamed the folder in place; descendants physically sit
        // under the new folder name already.
        let location = new_chain.clone();
        let section = section_snapshot(outcome)?;
        let mut actions = Vec::new();
        self.cascade(section, &old_chain, &new_chain, &location, &mut actions)?;
        Ok(actions)
    }

    fn heal_leaf_move(
        &self,
        target: &Locator,
        new_parent: &Locator,
        new_name: &str,
        observed: &SplitPath,
    ) -> Result<Vec<HealingAction>, ReconcileError> {
        let parts = self.codec.decode_segment_id(&target.segment_id)?;
        let new_id =
            self.codec
                .encode_segment_id(new_name, parts.kind, parts.extension.as_deref())?;
        let moved = Locator::new(new_parent.full_chain(), new_id, target.kind);
        let to = self.codec.canonical_leaf_path(&moved)?;
        if *observed == to {
            return Ok(Vec::new());
        }
        Ok(vec![self.rename_for(observed.clone(), to)])
    }

    fn heal_section_move(
        &self,
        target: &Locator,
        new_parent: &Locator,
        new_name: &str,
        observed: &SplitPath,
        outcome: &ApplyOutcome,
    ) -> Result<Vec<HealingAction>, ReconcileError> {
        let parts = self.codec.decode_segment_id(&target.segment_id)?;
        let new_parent_names = self.codec.name_chain(&new_parent.full_chain())?;
        let new_name = self.codec.normalize(new_name);

        let mut actions = Vec::new();

        // Folder-level fix: where the store's own move left the folder vs
        // where it canonically belongs. Emitted before the cascade; the
        // store carries descendants along with a folder rename, so the
        // cascade below assumes this fix has already taken effect.
        let observed_folder =
            SplitPath::folder(observed.path_parts.clone(), observed.basename.clone());
        let canonical_folder = SplitPath::folder(new_parent_names.clone(), new_name.clone());
        if observed_folder != canonical_folder {
            actions.push(HealingAction::RenameFolder {
                from: observed_folder,
                to: canonical_folder,
            });
        }

        let old_parent_names = self.codec.name_chain(&target.parent_chain)?;
        let mut old_chain = old_parent_names;
        old_chain.push(parts.core_name);
        let mut new_chain = new_parent_names;
        new_chain.push(new_name);
        let location = new_chain.clone();
        let section = section_snapshot(outcome)?;
        self.cascade(section, &old_chain, &new_chain, &location, &mut actions)?;
        Ok(actions)
    }

    /// Descendant suffix cascade. `old_chain` and `new_chain` are the
    /// container's pre- and post-mutation name chains; `location` is where
    /// descendants physically sit. A leaf's observed path is its old-suffix
    /// basename crossed with the current location; its canonical path uses
    /// the new chain for both. The store never renames descendants itself.
    fn cascade(
        &self,
        section: &SectionNode,
        old_chain: &Chain,
        new_chain: &Chain,
        location: &[String],
        out: &mut Vec<HealingAction>,
    ) -> Result<(), ReconcileError> {
        for child in section.children.values() {
            match child {
                TreeNode::Section(sub) => {
                    let mut old_sub = old_chain.clone();
                    old_sub.push(sub.name.clone());
                    let mut new_sub = new_chain.clone();
                    new_sub.push(sub.name.clone());
                    let mut sub_location = location.to_vec();
                    sub_location.push(sub.name.clone());
                    self.cascade(sub, &old_sub, &new_sub, &sub_location, out)?;
                }
                TreeNode::Scroll(scroll) => {
                    let observed = self.scroll_path(
                        location.to_vec(),
                        self.codec.leaf_basename(&scroll.name, old_chain)?,
                    );
                    let canonical = self.scroll_path(
                        new_chain.clone(),
                        self.codec.leaf_basename(&scroll.name, new_chain)?,
                    );
                    if observed != canonical {
                        out.push(HealingAction::RenameMdFile {
                            from: observed,
                            to: canonical,
                        });
                    }
                }
                TreeNode::File(file) => {
                    let observed = SplitPath::file(
                        location.to_vec(),
                        self.codec.leaf_basename(&file.name, old_chain)?,
                        file.extension.clone(),
                    );
                    let canonical = SplitPath::file(
                        new_chain.clone(),
                        self.codec.leaf_basename(&file.name, new_chain)?,
                        file.extension.clone(),
                    );
                    if observed != canonical {
                        out.push(HealingAction::RenameFile {
                            from: observed,
                            to: canonical,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn rename_for(&self, from: SplitPath, to: SplitPath) -> HealingAction {
        match to.kind {
            PathKind::Folder => HealingAction::RenameFolder { from, to },
            PathKind::MdFile => HealingAction::RenameMdFile { from, to },
            PathKind::File => HealingAction::RenameFile { from, to },
        }
    }

    /// Scroll-leaf path carrying the configured scroll extension.
    fn scroll_path(&self, path_parts: Vec<String>, basename: String) -> SplitPath {
        SplitPath {
            path_parts,
            basename,
            kind: PathKind::MdFile,
            extension: Some(self.codec.scroll_extension().to_string()),
        }
    }
}

fn section_snapshot(outcome: &ApplyOutcome) -> Result<&SectionNode, ReconcileError> {
    match &outcome.node {
        Some(TreeNode::Section(section)) => Ok(section),
        _ => Err(ReconcileError::TreeInconsistent(
            "section action produced a non-section snapshot".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::tree::Tree;
    use crate::types::{NodeKind, Status};

    fn setup() -> (Tree, HealingEngine) {
        let codec = NameCodec::new(&LibraryConfig::default());
        let tree = Tree::new(codec.clone(), "Library").unwrap();
        (tree, HealingEngine::new(codec))
    }

    fn scroll_locator(tree: &Tree, parents: &[&str], name: &str) -> Locator {
        let chain = parents
            .iter()
            .map(|n| tree.codec().section_id(n).unwrap())
            .collect();
        Locator::new(chain, tree.codec().scroll_id(name).unwrap(), NodeKind::Scroll)
    }

    fn create_canonical(tree: &mut Tree, engine: &HealingEngine, parents: &[&str], name: &str) {
        let target = scroll_locator(tree, parents, name);
        let observed = tree.codec().canonical_leaf_path(&target).unwrap();
        let action = TreeAction::Create {
            target,
            initial_status: Some(Status::Unknown),
            observed,
        };
        let outcome = tree.apply(&action).unwrap();
        assert!(outcome.changed);
        assert!(engine.heal(&action, &outcome).unwrap().is_empty());
    }

    #[test]
    fn canonical_create_heals_nothing() {
        let (mut tree, engine) = setup();
        create_canonical(&mut tree, &engine, &["Library", "a"], "x");
    }

    #[test]
    fn misplaced_create_emits_one_rename() {
        let (mut tree, engine) = setup();
        let target = scroll_locator(&tree, &["Library", "a"], "x");
        let observed = SplitPath::md_file(
            vec!["Library".to_string(), "a".to_string()],
            "x", // missing suffix
        );
        let action = TreeAction::Create {
            target: target.clone(),
            initial_status: None,
            observed,
        };
        let outcome = tree.apply(&action).unwrap();
        let actions = engine.heal(&action, &outcome).unwrap();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            HealingAction::RenameMdFile { from, to } => {
                assert_eq!(from.basename, "x");
                assert_eq!(to.basename, "x-a");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn unchanged_outcome_heals_nothing() {
        let (mut tree, engine) = setup();
        create_canonical(&mut tree, &engine, &["Library", "a"], "x");
        let target = scroll_locator(&tree, &["Library", "a"], "x");
        let observed = tree.codec().canonical_leaf_path(&target).unwrap();
        let action = TreeAction::Create {
            target,
            initial_status: None,
            observed,
        };
        let outcome = tree.apply(&action).unwrap();
        assert!(!outcome.changed);
        assert!(engine.heal(&action, &outcome).unwrap().is_empty());
    }

    #[test]
    fn section_rename_cascades_to_descendant_scroll() {
        let (mut tree, engine) = setup();
        create_canonical(
            &mut tree,
            &engine,
            &["Library", "parents", "mommy", "kid1"],
            "ReName",
        );
        let target = Locator::new(
            ["Library", "parents", "mommy"]
                .iter()
                .map(|n| tree.codec().section_id(n).unwrap())
                .collect(),
            tree.codec().section_id("kid1").unwrap(),
            NodeKind::Section,
        );
        let action = TreeAction::Rename {
            target,
            new_name: "kid3".to_string(),
        };
        let outcome = tree.apply(&action).unwrap();
        let actions = engine.heal(&action, &outcome).unwrap();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            HealingAction::RenameMdFile { from, to } => {
                assert_eq!(from.basename, "ReName-kid1-mommy-parents");
                assert_eq!(to.basename, "ReName-kid3-mommy-parents");
                assert_eq!(
                    from.path_parts,
                    vec!["Library", "parents", "mommy", "kid3"]
                );
                assert_eq!(to.path_parts, from.path_parts);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn cascade_reaches_nested_sections_and_file_leaves() {
        let (mut tree, engine) = setup();
        create_canonical(&mut tree, &engine, &["Library", "top"], "a");
        create_canonical(&mut tree, &engine, &["Library", "top", "inner"], "b");
        let file_target = Locator::new(
            ["Library", "top", "inner"]
                .iter()
                .map(|n| tree.codec().section_id(n).unwrap())
                .collect(),
            tree.codec().file_id("pic", "png").unwrap(),
            NodeKind::File,
        );
        let observed = tree.codec().canonical_leaf_path(&file_target).unwrap();
        tree.apply(&TreeAction::Create {
            target: file_target,
            initial_status: None,
            observed,
        })
        .unwrap();

        let action = TreeAction::Rename {
            target: Locator::new(
                vec![tree.codec().section_id("Library").unwrap()],
                tree.codec().section_id("top").unwrap(),
                NodeKind::Section,
            ),
            new_name: "fresh".to_string(),
        };
        let outcome = tree.apply(&action).unwrap();
        let actions = engine.heal(&action, &outcome).unwrap();

        // Every descendant leaf, at every depth, gets exactly one rename.
        assert_eq!(actions.len(), 3);
        let mut renames: Vec<(&'static str, String, String)> = actions
            .iter()
            .map(|a| match a {
                HealingAction::RenameMdFile { from, to } => {
                    (a.label(), from.basename.clone(), to.basename.clone())
                }
                HealingAction::RenameFile { from, to } => {
                    (a.label(), from.basename.clone(), to.basename.clone())
                }
                other => panic!("unexpected action: {:?}", other),
            })
            .collect();
        renames.sort();
        assert_eq!(
            renames,
            vec![
                (
                    "rename_file",
                    "pic-inner-top".to_string(),
                    "pic-inner-fresh".to_string()
                ),
                (
                    "rename_md_file",
                    "a-top".to_string(),
                    "a-fresh".to_string()
                ),
                (
                    "rename_md_file",
                    "b-inner-top".to_string(),
                    "b-inner-fresh".to_string()
                ),
            ]
        );
        // Locations track the renamed folder, not the old chain.
        for action in &actions {
            let (from, to) = match action {
                HealingAction::RenameMdFile { from, to }
                | HealingAction::RenameFile { from, to } => (from, to),
                _ => unreachable!(),
            };
            assert_eq!(from.path_parts, to.path_parts);
            assert_eq!(from.path_parts[1], "fresh");
        }
    }

    #[test]
    fn leaf_rename_diffs_old_and_new_canonical() {
        let (mut tree, engine) = setup();
        create_canonical(&mut tree, &engine, &["Library", "a"], "old");
        let target = scroll_locator(&tree, &["Library", "a"], "old");
        let action = TreeAction::Rename {
            target,
            new_name: "new".to_string(),
        };
        let outcome = tree.apply(&action).unwrap();
        let actions = engine.heal(&action, &outcome).unwrap();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            HealingAction::RenameMdFile { from, to } => {
                assert_eq!(from.basename, "old-a");
                assert_eq!(to.basename, "new-a");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }
}
