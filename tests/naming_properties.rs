//! Property checks over the naming codec, duplicate resolver, and tree
//! pruning behavior.

use proptest::prelude::*;
use std::collections::HashSet;

use scriptorium::actions::{Locator, TreeAction};
use scriptorium::config::LibraryConfig;
use scriptorium::dedup;
use scriptorium::naming::NameCodec;
use scriptorium::tree::Tree;
use scriptorium::types::{NodeKind, SplitPath};

fn codec() -> NameCodec {
    NameCodec::new(&LibraryConfig::default())
}

// Node names exclude '/', the suffix delimiter, and the structural
// separator; lowercase keeps every generated name distinct from the
// "Library" root.
fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9 ]{1,8}".prop_filter("non-blank", |s| !s.trim().is_empty())
}

fn chain_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(name_strategy(), 1..6).prop_map(|mut tail| {
        let mut chain = vec!["Library".to_string()];
        chain.append(&mut tail);
        chain
    })
}

proptest! {
    #[test]
    fn suffix_round_trips_through_chain(chain in chain_strategy()) {
        let codec = codec();
        let suffix = codec.suffix_from_chain(&chain).unwrap();
        let rebuilt = codec.chain_from_suffix("Library", &suffix).unwrap();
        prop_assert_eq!(rebuilt, chain);
    }

    #[test]
    fn basename_splits_back_into_core_and_suffix(
        core in name_strategy(),
        chain in chain_strategy(),
    ) {
        let codec = codec();
        let basename = codec.leaf_basename(&core, &chain).unwrap();
        let (split_core, split_suffix) = codec.split_basename(&basename);
        prop_assert_eq!(split_core, core);
        prop_assert_eq!(split_suffix, codec.suffix_from_chain(&chain).unwrap());
    }

    #[test]
    fn segment_ids_round_trip(core in name_strategy()) {
        let codec = codec();
        for kind in [NodeKind::Section, NodeKind::Scroll] {
            let id = codec.encode_segment_id(&core, kind, None).unwrap();
            let parts = codec.decode_segment_id(&id).unwrap();
            prop_assert_eq!(&parts.core_name, &core);
            prop_assert_eq!(parts.kind, kind);
        }
        let id = codec.file_id(&core, "png").unwrap();
        let parts = codec.decode_segment_id(&id).unwrap();
        prop_assert_eq!(parts.extension.as_deref(), Some("png"));
    }

    #[test]
    fn resolved_duplicate_is_always_free(
        desired in name_strategy(),
        taken in prop::collection::hash_set(name_strategy(), 0..12),
    ) {
        let resolved = dedup::resolve(&desired, &taken);
        prop_assert!(!taken.contains(&resolved));
    }

    #[test]
    fn unmarked_free_name_passes_through_untouched(
        // Letters only: a trailing numeric token is a dedup marker and
        // may be rewritten.
        desired in "[a-z]{1,8}",
    ) {
        let resolved = dedup::resolve(&desired, &HashSet::new());
        prop_assert_eq!(resolved, desired);
    }

    #[test]
    fn create_then_delete_leaves_an_empty_root(chain in chain_strategy()) {
        let mut tree = Tree::new(codec(), "Library").unwrap();
        let parent_chain: Vec<_> = chain
            .iter()
            .map(|n| tree.codec().section_id(n).unwrap())
            .collect();
        let target = Locator::new(
            parent_chain,
            tree.codec().scroll_id("leaf").unwrap(),
            NodeKind::Scroll,
        );
        let observed = SplitPath::md_file(chain.clone(), "leaf");
        tree.apply(&TreeAction::Create {
            target: target.clone(),
            initial_status: None,
            observed,
        })
        .unwrap();
        let outcome = tree.apply(&TreeAction::Delete { target }).unwrap();
        prop_assert!(outcome.changed);
        // Every section below the root held only the deleted leaf's chain.
        prop_assert_eq!(outcome.pruned.len(), chain.len() - 1);
        prop_assert!(tree.root().is_empty());
    }
}
