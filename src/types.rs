//! Core types shared across the reconciliation engine.

use serde::{Deserialize, Serialize};

/// Completion status carried by scroll leaves and aggregated over sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Done,
    NotStarted,
    Unknown,
}

/// The three node kinds of the library tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Container node, mirrors a folder.
    Section,
    /// Markdown leaf with a trackable completion status.
    Scroll,
    /// Non-markdown leaf, status always Unknown.
    File,
}

/// Filesystem-level kind of an observed or canonical path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Folder,
    File,
    MdFile,
}

/// Ancestor-name chain, root-inclusive. The canonical address of a section
/// on the impact/codex side of the engine.
pub type Chain = Vec<String>;

/// Store-level coordinates of a node: where a file or folder physically is
/// (observed) or should be (canonical). Never tree coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPath {
    /// Ordered folder names from the library root down to the container.
    pub path_parts: Vec<String>,
    /// Basename without extension.
    pub basename: String,
    pub kind: PathKind,
    pub extension: Option<String>,
}

impl SplitPath {
    pub fn folder(path_parts: Vec<String>, basename: impl Into<String>) -> Self {
        SplitPath {
            path_parts,
            basename: basename.into(),
            kind: PathKind::Folder,
            extension: None,
        }
    }

    /// Markdown path with the default `md` extension. Call sites wired to
    /// a configured scroll extension build the `SplitPath` directly.
    pub fn md_file(path_parts: Vec<String>, basename: impl Into<String>) -> Self {
        SplitPath {
            path_parts,
            basename: basename.into(),
            kind: PathKind::MdFile,
            extension: Some("md".to_string()),
        }
    }

    pub fn file(
        path_parts: Vec<String>,
        basename: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        SplitPath {
            path_parts,
            basename: basename.into(),
            kind: PathKind::File,
            extension: Some(extension.into()),
        }
    }

    /// Render as a display path for logs and audit records.
    pub fn display(&self) -> String {
        let mut s = self.path_parts.join("/");
        if !s.is_empty() {
            s.push('/');
        }
        s.push_str(&self.basename);
        if let Some(ext) = &self.extension {
            s.push('.');
            s.push_str(ext);
        }
        s
    }
}
