//! Property-based tests for lock path scoping and overlap.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use nerve_core::coordination::lock_path::{
    check_scope, is_descendant, normalize, overlaps, ScopeRejection,
};
use proptest::prelude::*;

// =============================================================================
// STRATEGIES
// =============================================================================

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}"
}

fn dir_path(min: usize, max: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), min..=max).prop_map(|segments| segments.join("/"))
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn prop_overlap_is_symmetric(a in dir_path(1, 4), b in dir_path(1, 4)) {
        prop_assert_eq!(overlaps(&a, &b), overlaps(&b, &a));
    }

    #[test]
    fn prop_path_overlaps_everything_beneath_it(base in dir_path(2, 3), rest in dir_path(1, 3)) {
        let child = format!("{base}/{rest}");
        prop_assert!(is_descendant(&child, &base));
        prop_assert!(overlaps(&base, &child));
        prop_assert!(!is_descendant(&base, &child));
    }

    #[test]
    fn prop_shared_name_prefix_is_not_nesting(base in dir_path(2, 3), suffix in "[a-z0-9]{1,4}") {
        let sibling = format!("{base}{suffix}");
        prop_assert!(!overlaps(&base, &sibling));
    }

    #[test]
    fn prop_trailing_slashes_do_not_change_the_key(path in dir_path(2, 4), slashes in 0usize..3) {
        let raw = format!("{path}{}", "/".repeat(slashes));
        prop_assert_eq!(normalize(&raw), path.clone());
        prop_assert_eq!(check_scope(&raw), Ok(path));
    }

    #[test]
    fn prop_single_directory_is_too_broad(name in segment()) {
        let rejected = matches!(check_scope(&name), Err(ScopeRejection::TooBroad { depth: 1, .. }));
        prop_assert!(rejected);
    }

    #[test]
    fn prop_top_level_files_are_lockable(name in segment(), ext in "[a-z]{1,4}") {
        let file = format!("{name}.{ext}");
        prop_assert_eq!(check_scope(&file), Ok(file.clone()));
    }
}
