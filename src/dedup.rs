//! Duplicate Resolver
//!
//! Pure name disambiguation for create collisions: two distinct files can
//! canonicalize to the same segment id, and the incoming one must be
//! renamed before insertion rather than silently overwriting.
//!
//! Convention: "base" + trailing integer marker, with the bare name being
//! marker 1 implicitly ("Untitled" = 1, "Untitled 2" = 2). The host store
//! auto-deduplicates by stacking a second marker ("Untitled 2" becomes
//! "Untitled 2 1"); such names are collapsed to their root base and
//! renumbered into the root's own sequence.

use std::collections::HashSet;

/// Split a name into its base and trailing integer marker, if any.
/// "Untitled 2" -> ("Untitled", Some(2)); "Untitled" -> ("Untitled", None).
fn split_marker(name: &str) -> (&str, Option<u32>) {
    if let Some((base, tail)) = name.rsplit_once(' ') {
        if !base.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = tail.parse::<u32>() {
                return (base, Some(n));
            }
        }
    }
    (name, None)
}

/// Strip markers until none remain: "Untitled 2 1" -> "Untitled".
fn root_base(name: &str) -> &str {
    let mut current = name;
    loop {
        let (base, marker) = split_marker(current);
        if marker.is_none() {
            return current;
        }
        current = base;
    }
}

/// Whether a name carries two stacked markers, the artifact of the host
/// auto-deduplicating an already-deduplicated name.
fn has_stacked_markers(name: &str) -> bool {
    let (base, marker) = split_marker(name);
    marker.is_some() && split_marker(base).1.is_some()
}

fn render(base: &str, marker: u32) -> String {
    if marker == 1 {
        base.to_string()
    } else {
        format!("{} {}", base, marker)
    }
}

/// Compute a free disambiguated name for `desired` given the sibling core
/// names already `taken`. No I/O; the caller supplies the sibling set for
/// the target kind and extension.
pub fn resolve(desired: &str, taken: &HashSet<String>) -> String {
    let desired = if has_stacked_markers(desired) {
        root_base(desired)
    } else {
        desired
    };
    if !taken.contains(desired) {
        return desired.to_string();
    }

    let (split_base, marker) = split_marker(desired);
    let base = if marker.is_some() { split_base } else { desired };

    // Markers already in use within this base's sequence; the bare name
    // occupies marker 1.
    let mut used: HashSet<u32> = HashSet::new();
    for name in taken {
        if name == base {
            used.insert(1);
        } else if let (b, Some(n)) = split_marker(name) {
            if b == base {
                used.insert(n);
            }
        }
    }

    let mut candidate = 1u32;
    while used.contains(&candidate) {
        candidate += 1;
    }
    render(base, candidate)
}
