//! Name Codec
//!
//! Bidirectional mapping between tree coordinates and store-level names:
//! segment ids (the key a node occupies inside its parent) and canonical
//! basenames (core name joined with a delimited ancestor suffix). Every
//! canonical basename in the engine is computed here; no other code path
//! derives one.

use crate::actions::Locator;
use crate::config::LibraryConfig;
use crate::error::NamingError;
use crate::types::{Chain, NodeKind, SplitPath};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Separator between the fields of an encoded segment id. Excluded from
/// node names, so decoding is unambiguous.
const SEGMENT_SEPARATOR: char = '\u{1f}';

const KIND_SECTION: &str = "section";
const KIND_SCROLL: &str = "scroll";
const KIND_FILE: &str = "file";

/// Encoded key identifying a node's name+kind+extension within its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control separator is unreadable in logs; print a pipe instead.
        write!(f, "{}", self.0.replace(SEGMENT_SEPARATOR, "|"))
    }
}

/// Decoded fields of a segment id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentParts {
    pub core_name: String,
    pub kind: NodeKind,
    pub extension: Option<String>,
}

/// The codec itself. Delimiter and index prefix come from configuration;
/// the codec is cheap to clone and carries no other state.
#[derive(Debug, Clone)]
pub struct NameCodec {
    delimiter: String,
    index_prefix: String,
    scroll_extension: String,
}

impl NameCodec {
    pub fn new(config: &LibraryConfig) -> Self {
        Self {
            delimiter: config.suffix_delimiter.clone(),
            index_prefix: config.index_prefix.clone(),
            scroll_extension: config.scroll_extension.clone(),
        }
    }

    pub fn scroll_extension(&self) -> &str {
        &self.scroll_extension
    }

    pub fn index_prefix(&self) -> &str {
        &self.index_prefix
    }

    /// NFC-normalize observed text before it enters the tree. Some
    /// platforms report NFD filenames; segment ids must round-trip.
    pub fn normalize(&self, raw: &str) -> String {
        raw.nfc().collect()
    }

    /// A node name is non-empty and excludes the structural separator and
    /// the suffix delimiter.
    fn validate_name(&self, name: &str) -> Result<(), NamingError> {
        if name.is_empty() {
            return Err(NamingError::InvalidChain("empty node name".to_string()));
        }
        if name.contains(SEGMENT_SEPARATOR) || name.contains('/') {
            return Err(NamingError::InvalidChain(format!(
                "node name '{}' contains a reserved character",
                name.replace(SEGMENT_SEPARATOR, "|")
            )));
        }
        if name.contains(&self.delimiter) {
            return Err(NamingError::InvalidChain(format!(
                "node name '{}' contains the suffix delimiter '{}'",
                name, self.delimiter
            )));
        }
        Ok(())
    }

    /// Encode a segment id from its fields.
    pub fn encode_segment_id(
        &self,
        core_name: &str,
        kind: NodeKind,
        extension: Option<&str>,
    ) -> Result<SegmentId, NamingError> {
        let core_name = self.normalize(core_name);
        self.validate_name(&core_name)?;
        match kind {
            NodeKind::Section => {
                if extension.is_some() {
                    return Err(NamingError::ParseFailed(format!(
                        "section '{}' cannot carry an extension",
                        core_name
                    )));
                }
                Ok(SegmentId(format!(
                    "{}{}{}",
                    KIND_SECTION, SEGMENT_SEPARATOR, core_name
                )))
            }
            NodeKind::Scroll => Ok(SegmentId(format!(
                "{}{}{}{}{}",
                KIND_SCROLL, SEGMENT_SEPARATOR, core_name, SEGMENT_SEPARATOR, self.scroll_extension
            ))),
            NodeKind::File => {
                let ext = extension.ok_or_else(|| {
                    NamingError::ParseFailed(format!("file '{}' requires an extension", core_name))
                })?;
                if ext.is_empty() {
                    return Err(NamingError::ParseFailed(format!(
                        "file '{}' has an empty extension",
                        core_name
                    )));
                }
                Ok(SegmentId(format!(
                    "{}{}{}{}{}",
                    KIND_FILE, SEGMENT_SEPARATOR, core_name, SEGMENT_SEPARATOR, ext
                )))
            }
        }
    }

    pub fn section_id(&self, name: &str) -> Result<SegmentId, NamingError> {
        self.encode_segment_id(name, NodeKind::Section, None)
    }

    pub fn scroll_id(&self, name: &str) -> Result<SegmentId, NamingError> {
        self.encode_segment_id(name, NodeKind::Scroll, None)
    }

    pub fn file_id(&self, name: &str, extension: &str) -> Result<SegmentId, NamingError> {
        self.encode_segment_id(name, NodeKind::File, Some(extension))
    }

    /// Decode a segment id back into its fields. Fails with `ParseFailed`
    /// on wrong separator arity or an unknown kind tag.
    pub fn decode_segment_id(&self, id: &SegmentId) -> Result<SegmentParts, NamingError> {
        let fields: Vec<&str> = id.0.split(SEGMENT_SEPARATOR).collect();
        let parts = match fields.as_slice() {
            [KIND_SECTION, core] => SegmentParts {
                core_name: (*core).to_string(),
                kind: NodeKind::Section,
                extension: None,
            },
            [KIND_SCROLL, core, ext] => SegmentParts {
                core_name: (*core).to_string(),
                kind: NodeKind::Scroll,
                extension: Some((*ext).to_string()),
            },
            [KIND_FILE, core, ext] => SegmentParts {
                core_name: (*core).to_string(),
                kind: NodeKind::File,
                extension: Some((*ext).to_string()),
            },
            _ => return Err(NamingError::ParseFailed(id.to_string())),
        };
        if parts.core_name.is_empty() {
            return Err(NamingError::ParseFailed(id.to_string()));
        }
        Ok(parts)
    }

    /// Decode a chain of section segment ids into the ancestor-name chain.
    pub fn name_chain(&self, ids: &[SegmentId]) -> Result<Chain, NamingError> {
        let mut names = Vec::with_capacity(ids.len());
        for id in ids {
            let parts = self.decode_segment_id(id)?;
            if parts.kind != NodeKind::Section {
                return Err(NamingError::InvalidChain(format!(
                    "non-section segment '{}' in ancestor position",
                    id
                )));
            }
            names.push(parts.core_name);
        }
        Ok(names)
    }

    /// Suffix parts for a node whose container chain (root-inclusive) is
    /// `chain`: the chain unchanged when its length is at most one,
    /// otherwise the chain minus its root, reversed (nearest ancestor
    /// first).
    pub fn suffix_from_chain(&self, chain: &[String]) -> Result<Vec<String>, NamingError> {
        if chain.is_empty() {
            return Err(NamingError::EmptyChain);
        }
        for name in chain {
            self.validate_name(name)?;
        }
        if chain.len() == 1 {
            return Ok(chain.to_vec());
        }
        Ok(chain[1..].iter().rev().cloned().collect())
    }

    /// Exact inverse of [`suffix_from_chain`] given the root name.
    pub fn chain_from_suffix(
        &self,
        root: &str,
        suffix: &[String],
    ) -> Result<Chain, NamingError> {
        if suffix.is_empty() {
            return Err(NamingError::EmptyChain);
        }
        if suffix.len() == 1 && suffix[0] == root {
            return Ok(vec![root.to_string()]);
        }
        let mut chain = Vec::with_capacity(suffix.len() + 1);
        chain.push(root.to_string());
        chain.extend(suffix.iter().rev().cloned());
        Ok(chain)
    }

    /// Canonical basename of a leaf with the given core name inside the
    /// container chain.
    pub fn leaf_basename(&self, core_name: &str, chain: &[String]) -> Result<String, NamingError> {
        self.validate_name(core_name)?;
        let suffix = self.suffix_from_chain(chain)?;
        Ok(self.join_basename(core_name, &suffix))
    }

    /// Canonical basename of a section's codex document. `chain` is the
    /// section's own full chain, root included.
    pub fn codex_basename(&self, chain: &[String]) -> Result<String, NamingError> {
        let suffix = self.suffix_from_chain(chain)?;
        Ok(self.join_basename(&self.index_prefix, &suffix))
    }

    fn join_basename(&self, head: &str, suffix: &[String]) -> String {
        let mut out = String::from(head);
        for part in suffix {
            out.push_str(&self.delimiter);
            out.push_str(part);
        }
        out
    }

    /// Canonical split path of the leaf a locator addresses.
    pub fn canonical_leaf_path(&self, locator: &Locator) -> Result<SplitPath, NamingError> {
        let parts = self.decode_segment_id(&locator.segment_id)?;
        let chain = self.name_chain(&locator.parent_chain)?;
        let basename = self.leaf_basename(&parts.core_name, &chain)?;
        match parts.kind {
            NodeKind::Scroll => Ok(SplitPath {
                path_parts: chain,
                basename,
                kind: crate::types::PathKind::MdFile,
                extension: Some(self.scroll_extension.clone()),
            }),
            NodeKind::File => {
                let ext = parts.extension.ok_or_else(|| {
                    NamingError::ParseFailed(format!("file segment '{}'", locator.segment_id))
                })?;
                Ok(SplitPath::file(chain, basename, ext))
            }
            NodeKind::Section => Err(NamingError::InvalidChain(format!(
                "leaf path requested for section '{}'",
                locator.segment_id
            ))),
        }
    }

    /// Canonical folder path of the section a locator addresses.
    pub fn canonical_section_path(&self, locator: &Locator) -> Result<SplitPath, NamingError> {
        let parts = self.decode_segment_id(&locator.segment_id)?;
        if parts.kind != NodeKind::Section {
            return Err(NamingError::InvalidChain(format!(
                "folder path requested for leaf '{}'",
                locator.segment_id
            )));
        }
        let chain = self.name_chain(&locator.parent_chain)?;
        Ok(SplitPath::folder(chain, parts.core_name))
    }

    /// Canonical path of the codex document of the section with the given
    /// full name chain.
    pub fn canonical_codex_path(&self, chain: &[String]) -> Result<SplitPath, NamingError> {
        let basename = self.codex_basename(chain)?;
        Ok(SplitPath {
            path_parts: chain.to_vec(),
            basename,
            kind: crate::types::PathKind::MdFile,
            extension: Some(self.scroll_extension.clone()),
        })
    }

    /// Split an observed basename into its core name and suffix parts.
    /// Legal because node names exclude the delimiter.
    pub fn split_basename(&self, basename: &str) -> (String, Vec<String>) {
        let basename = self.normalize(basename);
        let mut parts = basename.split(&self.delimiter);
        let core = parts.next().unwrap_or_default().to_string();
        (core, parts.map(|p| p.to_string()).collect())
    }

    /// Whether an observed basename is a codex document.
    pub fn is_codex_basename(&self, basename: &str) -> bool {
        basename == self.index_prefix
            || basename.starts_with(&format!("{}{}", self.index_prefix, self.delimiter))
    }
}
