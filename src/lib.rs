//! Scriptorium: Self-Healing Canonical Naming
//!
//! A reconciliation engine for a hierarchical library vault: an in-memory
//! tree of sections and leaves, a canonical-naming codec, and a healing
//! pipeline that renames drifted files back to canon and keeps per-section
//! codex documents fresh.

pub mod actions;
pub mod bootstrap;
pub mod config;
pub mod dedup;
pub mod error;
pub mod healing;
pub mod impact;
pub mod logging;
pub mod naming;
pub mod reconciler;
pub mod transaction;
pub mod tree;
pub mod types;
