//! Property-based test generators using proptest.

use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for code names.
pub fn code_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("valid regex")
}

/// Strategy for sets of distinct code names.
pub fn name_set_strategy(max: usize) -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(code_name_strategy(), 0..=max)
}

/// Strategy for a pair of name sets: what the target holds and what the
/// source sends. The sets overlap often enough to exercise in-place updates.
pub fn target_and_source_strategy(
    max: usize,
) -> impl Strategy<Value = (BTreeSet<String>, BTreeSet<String>)> {
    (name_set_strategy(max), name_set_strategy(max), any::<bool>()).prop_map(
        move |(target, mut source, share)| {
            if share {
                source.extend(target.iter().take(max / 2).cloned());
            }
            (target, source)
        },
    )
}

/// Strategy for optional display names.
pub fn display_name_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::string::string_regex("[A-Za-z ]{1,16}").expect("valid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn name_sets_stay_bounded(set in name_set_strategy(6)) {
            prop_assert!(set.len() <= 6);
            prop_assert!(set.iter().all(|n| !n.is_empty()));
        }

        #[test]
        fn shared_names_stay_within_bound((target, source) in target_and_source_strategy(6)) {
            prop_assert!(target.len() <= 6);
            prop_assert!(source.len() <= 9);
        }
    }
}
