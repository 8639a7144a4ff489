//! Structural snapshots and the pre/post safety comparison.
//!
//! The comparison is a detector, not a guard: it reports drift as warning
//! strings and never fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::rules::Safety;

/// Structural fingerprint of an open document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub paragraph_count: usize,
    pub bookmark_count: usize,
    pub inline_shape_count: usize,
    pub content_control_count: usize,
    pub tables_count: usize,
    /// Heading style name to number of paragraphs using it.
    pub headings_by_level: BTreeMap<String, usize>,
}

/// One warning per structural invariant the safety policy requires and the
/// run violated. Empty when nothing drifted.
pub fn compare(pre: &Snapshot, post: &Snapshot, safety: &Safety) -> Vec<String> {
    let checks = [
        (
            safety.require_same_paragraph_count,
            "Paragraph",
            pre.paragraph_count,
            post.paragraph_count,
        ),
        (
            safety.require_same_bookmark_count,
            "Bookmark",
            pre.bookmark_count,
            post.bookmark_count,
        ),
        (
            safety.require_same_inline_shape_count,
            "Inline shape",
            pre.inline_shape_count,
            post.inline_shape_count,
        ),
    ];
    checks
        .into_iter()
        .filter(|(required, _, before, after)| *required && before != after)
        .map(|(_, label, before, after)| format!("{label} count changed: {before} -> {after}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(paragraphs: usize, bookmarks: usize, shapes: usize) -> Snapshot {
        Snapshot {
            paragraph_count: paragraphs,
            bookmark_count: bookmarks,
            inline_shape_count: shapes,
            ..Snapshot::default()
        }
    }

    #[test]
    fn identical_snapshots_produce_no_warnings() {
        let pre = snapshot(3, 1, 0);
        assert!(compare(&pre, &pre.clone(), &Safety::default()).is_empty());
    }

    #[test]
    fn added_bookmark_yields_exactly_one_warning() {
        let warnings = compare(&snapshot(3, 1, 0), &snapshot(3, 2, 0), &Safety::default());
        assert_eq!(warnings, vec!["Bookmark count changed: 1 -> 2".to_string()]);
    }

    #[test]
    fn drift_outside_policy_is_ignored() {
        let safety = Safety {
            require_same_paragraph_count: false,
            ..Safety::default()
        };
        assert!(compare(&snapshot(3, 0, 0), &snapshot(5, 0, 0), &safety).is_empty());
    }

    #[test]
    fn reports_each_violated_invariant() {
        let warnings = compare(&snapshot(3, 1, 1), &snapshot(4, 1, 0), &Safety::default());
        assert_eq!(
            warnings,
            vec![
                "Paragraph count changed: 3 -> 4".to_string(),
                "Inline shape count changed: 1 -> 0".to_string(),
            ]
        );
    }
}
