//! Bootstrap Scan
//!
//! Rebuilds the in-memory tree from the store by walking the vault
//! directory and translating every folder and file into a `Create`
//! action. Running the resulting batch through a transaction both
//! populates the tree and heals any drift accumulated while the engine
//! was not running.

use crate::actions::{Locator, TreeAction};
use crate::config::LibraryConfig;
use crate::error::ReconcileError;
use crate::naming::NameCodec;
use crate::types::{NodeKind, PathKind, SplitPath};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Walk `root_dir` and produce one `Create` per folder and file, parents
/// before children. Hidden entries and codex documents are skipped; codex
/// documents are derived state and are re-ensured by the impact side.
pub fn scan_library(
    root_dir: &Path,
    config: &LibraryConfig,
) -> Result<Vec<TreeAction>, ReconcileError> {
    let codec = NameCodec::new(config);
    let root_name = config.root_name.clone();
    let mut actions = Vec::new();

    let walker = WalkDir::new(root_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name().to_string_lossy().as_ref()));

    for entry in walker {
        let entry = entry.map_err(|e| {
            ReconcileError::VaultFailed {
                message: format!("scan failed: {}", e),
                recoverable: true,
            }
        })?;
        let Some(name) = entry.file_name().to_str() else {
            warn!(path = %entry.path().display(), "skipping non-UTF-8 entry");
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(root_dir) else {
            continue;
        };
        let Some(parent_names) = parent_folder_names(&root_name, relative) else {
            warn!(path = %entry.path().display(), "skipping entry with non-UTF-8 ancestry");
            continue;
        };

        let mut parent_chain = Vec::with_capacity(parent_names.len());
        for parent in &parent_names {
            parent_chain.push(codec.section_id(parent)?);
        }

        if entry.file_type().is_dir() {
            let target = Locator::new(parent_chain, codec.section_id(name)?, NodeKind::Section);
            let observed = SplitPath::folder(parent_names, name);
            actions.push(TreeAction::Create {
                target,
                initial_status: None,
                observed,
            });
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let (stem, extension) = split_extension(name);
        if extension == Some(config.scroll_extension.as_str()) {
            if codec.is_codex_basename(stem) {
                continue;
            }
            // The suffix on disk may be stale; the core name is authoritative.
            let (core, _suffix) = codec.split_basename(stem);
            let target = Locator::new(parent_chain, codec.scroll_id(&core)?, NodeKind::Scroll);
            let observed = SplitPath {
                path_parts: parent_names,
                basename: stem.to_string(),
                kind: PathKind::MdFile,
                extension: Some(config.scroll_extension.clone()),
            };
            actions.push(TreeAction::Create {
                target,
                initial_status: None,
                observed,
            });
        } else {
            let Some(ext) = extension else {
                debug!(path = %entry.path().display(), "skipping extensionless file");
                continue;
            };
            let (core, _suffix) = codec.split_basename(stem);
            let target = Locator::new(parent_chain, codec.file_id(&core, ext)?, NodeKind::File);
            let observed = SplitPath::file(parent_names, stem, ext);
            actions.push(TreeAction::Create {
                target,
                initial_status: None,
                observed,
            });
        }
    }

    debug!(actions = actions.len(), "library scan complete");
    Ok(actions)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Observed folder chain of an entry's parent, root name first. `None`
/// if any ancestor folder name is not valid UTF-8.
fn parent_folder_names(root_name: &str, relative: &Path) -> Option<Vec<String>> {
    let mut names = vec![root_name.to_string()];
    let components: Vec<_> = relative.components().collect();
    for component in components.iter().take(components.len().saturating_sub(1)) {
        names.push(component.as_os_str().to_str()?.to_string());
    }
    Some(names)
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scan(dir: &Path) -> Vec<TreeAction> {
        scan_library(dir, &LibraryConfig::default()).unwrap()
    }

    #[test]
    fn folders_become_sections_and_files_become_leaves() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("parents/mommy")).unwrap();
        fs::write(temp.path().join("parents/mommy/kid1-mommy-parents.md"), "").unwrap();
        fs::write(temp.path().join("parents/scan.png"), []).unwrap();

        let actions = scan(temp.path());
        assert_eq!(actions.len(), 4);
        let kinds: Vec<_> = actions.iter().map(|a| a.target().kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Section,
                NodeKind::Section,
                NodeKind::Scroll,
                NodeKind::File
            ]
        );
    }

    #[test]
    fn scroll_core_name_drops_the_suffix() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/x-a.md"), "").unwrap();

        let actions = scan(temp.path());
        let scroll = actions
            .iter()
            .find(|a| a.target().kind == NodeKind::Scroll)
            .unwrap();
        let codec = NameCodec::new(&LibraryConfig::default());
        let parts = codec.decode_segment_id(&scroll.target().segment_id).unwrap();
        assert_eq!(parts.core_name, "x");
        match scroll {
            TreeAction::Create { observed, .. } => {
                assert_eq!(observed.basename, "x-a");
                assert_eq!(observed.path_parts, vec!["Library", "a"]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn codex_and_hidden_entries_are_skipped() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("a/.obsidian")).unwrap();
        fs::write(temp.path().join("a/__-a.md"), "").unwrap();
        fs::write(temp.path().join("a/.hidden.md"), "").unwrap();
        fs::write(temp.path().join("a/.obsidian/cache.md"), "").unwrap();

        let actions = scan(temp.path());
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target().kind, NodeKind::Section);
    }

    #[test]
    fn configured_scroll_extension_selects_scrolls() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/x-a.mdx"), "").unwrap();

        let config = LibraryConfig {
            scroll_extension: "mdx".to_string(),
            ..LibraryConfig::default()
        };
        let actions = scan_library(temp.path(), &config).unwrap();
        let scroll = actions
            .iter()
            .find(|a| a.target().kind == NodeKind::Scroll)
            .unwrap();
        match scroll {
            TreeAction::Create { observed, .. } => {
                assert_eq!(observed.extension.as_deref(), Some("mdx"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn parents_are_emitted_before_children() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("z/inner")).unwrap();
        fs::write(temp.path().join("z/inner/leaf-inner-z.md"), "").unwrap();

        let actions = scan(temp.path());
        let positions: Vec<_> = actions.iter().map(|a| a.target().parent_chain.len()).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }
}
