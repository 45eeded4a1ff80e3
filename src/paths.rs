//! Action path enumeration
//!
//! Produces every order-preserving subsequence of an action list.
//! n actions yield exactly 2^n paths, from the full path down to the empty one.

use crate::error::TrackwiseError;
use crate::models::{Action, Path};
use crate::Result;
use tracing::debug;

/// Default ceiling on the number of actions accepted by [`PathEnumerator`].
pub const DEFAULT_MAX_ACTIONS: usize = 20;

/// Highest ceiling that may be configured: 2^24 paths.
pub const MAX_ACTIONS_LIMIT: usize = 24;

const PREALLOCATE_LIMIT: usize = 1 << 16;

/// Number of paths produced for `n` actions, `None` if it does not fit in a `usize`.
pub fn path_count(n: usize) -> Option<usize> {
    u32::try_from(n).ok().and_then(|n| 1usize.checked_shl(n))
}

/// Enumerate all order-preserving subsequences of `actions`.
///
/// Walks the include/exclude decision tree depth first with an explicit
/// stack, taking the include branch before the exclude branch at every
/// position. Total over finite input; the caller owns the size bound.
pub fn explore_action_paths(actions: &[Action]) -> Vec<Path> {
    let n = actions.len();
    let mut paths = Vec::with_capacity(path_count(n).map_or(0, |c| c.min(PREALLOCATE_LIMIT)));

    // (next index to decide, positions included so far)
    let mut stack: Vec<(usize, Vec<usize>)> = vec![(0, Vec::with_capacity(n))];

    while let Some((index, selected)) = stack.pop() {
        if index == n {
            paths.push(Path::new(
                selected.iter().map(|&i| actions[i].clone()).collect(),
            ));
            continue;
        }

        let mut included = selected.clone();
        included.push(index);

        stack.push((index + 1, selected));
        stack.push((index + 1, included));
    }

    paths
}

/// Size-checked front door to [`explore_action_paths`].
#[derive(Debug, Clone, Copy)]
pub struct PathEnumerator {
    max_actions: usize,
}

impl PathEnumerator {
    pub fn new(max_actions: usize) -> Self {
        Self { max_actions }
    }

    pub fn max_actions(&self) -> usize {
        self.max_actions
    }

    /// Fails fast when `actions` is longer than the configured ceiling.
    pub fn enumerate(&self, actions: &[Action]) -> Result<Vec<Path>> {
        if actions.len() > self.max_actions {
            return Err(TrackwiseError::ActionLimitExceeded {
                count: actions.len(),
                max: self.max_actions,
            });
        }

        let paths = explore_action_paths(actions);

        debug!(
            action_count = actions.len(),
            path_count = paths.len(),
            "Enumerated action paths"
        );

        Ok(paths)
    }
}

impl Default for PathEnumerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACTIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn actions(names: &[&str]) -> Vec<Action> {
        names
            .iter()
            .map(|n| Action::new(*n, format!("{} description", n)))
            .collect()
    }

    fn name_sets(paths: &[Path]) -> HashSet<Vec<String>> {
        paths
            .iter()
            .map(|p| p.names().map(str::to_string).collect())
            .collect()
    }

    fn expected(groups: &[&[&str]]) -> HashSet<Vec<String>> {
        groups
            .iter()
            .map(|g| g.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_empty_input_yields_single_empty_path() {
        let paths = explore_action_paths(&[]);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].is_empty());
    }

    #[test]
    fn test_single_action() {
        let paths = explore_action_paths(&actions(&["A"]));
        assert_eq!(name_sets(&paths), expected(&[&[], &["A"]]));
    }

    #[test]
    fn test_two_actions_preserve_order() {
        let paths = explore_action_paths(&actions(&["A", "B"]));
        assert_eq!(paths.len(), 4);
        assert_eq!(
            name_sets(&paths),
            expected(&[&[], &["A"], &["B"], &["A", "B"]])
        );
    }

    #[test]
    fn test_three_actions_relative_order() {
        let input = actions(&["A", "B", "C"]);
        let paths = explore_action_paths(&input);
        assert_eq!(paths.len(), 8);
        assert_eq!(name_sets(&paths).len(), 8);

        for path in &paths {
            let positions: Vec<usize> = path
                .actions()
                .iter()
                .map(|a| input.iter().position(|i| i == a).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_count_is_power_of_two() {
        for n in 0..=10 {
            let names: Vec<String> = (0..n).map(|i| format!("action-{}", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let paths = explore_action_paths(&actions(&refs));
            assert_eq!(paths.len(), 1 << n);
            assert_eq!(Some(paths.len()), path_count(n));
        }
    }

    #[test]
    fn test_include_first_order() {
        let paths = explore_action_paths(&actions(&["A", "B"]));
        let order: Vec<Vec<&str>> = paths.iter().map(|p| p.names().collect()).collect();
        assert_eq!(order, vec![vec!["A", "B"], vec!["A"], vec!["B"], vec![]]);
    }

    #[test]
    fn test_idempotent() {
        let input = actions(&["Pay debt", "Build fund", "Invest"]);
        let mut first = explore_action_paths(&input);
        let mut second = explore_action_paths(&input);
        first.sort_by_key(|p| p.to_string());
        second.sort_by_key(|p| p.to_string());
        assert_eq!(first, second);
    }

    #[test]
    fn test_paths_only_contain_input_actions() {
        let input = actions(&["A", "B", "C", "D"]);
        for path in explore_action_paths(&input) {
            assert!(path.len() <= input.len());
            assert!(path.actions().iter().all(|a| input.contains(a)));
        }
    }

    #[test]
    fn test_duplicate_actions_are_positional() {
        let input = vec![Action::new("Save", "same"), Action::new("Save", "same")];
        assert_eq!(explore_action_paths(&input).len(), 4);
    }

    #[test]
    fn test_enumerator_rejects_oversized_input() {
        let enumerator = PathEnumerator::new(3);
        let err = enumerator
            .enumerate(&actions(&["A", "B", "C", "D"]))
            .unwrap_err();
        assert!(matches!(
            err,
            TrackwiseError::ActionLimitExceeded { count: 4, max: 3 }
        ));

        assert_eq!(enumerator.enumerate(&actions(&["A", "B", "C"])).unwrap().len(), 8);
    }

    #[test]
    fn test_path_count_overflow() {
        assert_eq!(path_count(0), Some(1));
        assert_eq!(path_count(usize::BITS as usize), None);
    }
}
