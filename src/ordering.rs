//! Dense ordering of groups and links.
//!
//! Every parent scope (a user's groups, a group's links) keeps `order`
//! values `0..n` with no gaps. The functions here only plan the final
//! sequence of ids; the caller writes `position = index` for each.

use std::collections::HashSet;

/// Final sequence after an explicit reorder request.
///
/// Ids in `requested` that are not in `current` are ignored, as are
/// duplicates. Members of `current` the request does not mention keep their
/// relative order and go after the requested ones. Applying the same
/// request twice yields the same sequence.
pub fn reorder(current: &[i64], requested: &[i64]) -> Vec<i64> {
    let known: HashSet<i64> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(current.len());
    let mut result = Vec::with_capacity(current.len());

    for id in requested {
        if known.contains(id) && seen.insert(*id) {
            result.push(*id);
        }
    }
    for id in current {
        if seen.insert(*id) {
            result.push(*id);
        }
    }
    result
}

/// Inserts `item` at `index`, clamped into `0..=len`. Any existing
/// occurrence is removed first.
pub fn insert_at(sequence: &[i64], item: i64, index: i64) -> Vec<i64> {
    let mut result: Vec<i64> = sequence.iter().copied().filter(|id| *id != item).collect();
    let index = index.clamp(0, result.len() as i64) as usize;
    result.insert(index, item);
    result
}

/// Sequences to write after moving one item between (or within) scopes.
#[derive(Debug, PartialEq, Eq)]
pub struct MovePlan {
    /// New sequence of the source scope, or `None` when source and target are the same.
    pub source: Option<Vec<i64>>,
    pub target: Vec<i64>,
}

pub fn plan_move(source: &[i64], target: &[i64], item: i64, index: i64, same_scope: bool) -> MovePlan {
    if same_scope {
        return MovePlan {
            source: None,
            target: insert_at(source, item, index),
        };
    }

    MovePlan {
        source: Some(source.iter().copied().filter(|id| *id != item).collect()),
        target: insert_at(target, item, index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_follows_request() {
        assert_eq!(reorder(&[1, 2, 3], &[3, 1, 2]), vec![3, 1, 2]);
    }

    #[test]
    fn reorder_is_idempotent() {
        let once = reorder(&[1, 2, 3, 4], &[4, 2]);
        let twice = reorder(&once, &[4, 2]);
        assert_eq!(once, twice);
        assert_eq!(once, vec![4, 2, 1, 3]);
    }

    #[test]
    fn reorder_drops_foreign_and_duplicate_ids() {
        assert_eq!(reorder(&[5, 6], &[9, 6, 6, 5, 7]), vec![6, 5]);
    }

    #[test]
    fn reorder_of_empty_request_keeps_current() {
        assert_eq!(reorder(&[2, 1], &[]), vec![2, 1]);
    }

    #[test]
    fn insert_at_clamps_index() {
        assert_eq!(insert_at(&[1, 2], 9, -4), vec![9, 1, 2]);
        assert_eq!(insert_at(&[1, 2], 9, 99), vec![1, 2, 9]);
        assert_eq!(insert_at(&[1, 2], 9, 1), vec![1, 9, 2]);
    }

    #[test]
    fn move_within_scope_reinserts() {
        let plan = plan_move(&[1, 2, 3, 4], &[], 1, 2, true);
        assert_eq!(plan.source, None);
        assert_eq!(plan.target, vec![2, 3, 1, 4]);
    }

    #[test]
    fn move_across_scopes_closes_gap() {
        let plan = plan_move(&[1, 2, 3], &[10, 11], 2, 1, false);
        assert_eq!(plan.source, Some(vec![1, 3]));
        assert_eq!(plan.target, vec![10, 2, 11]);
    }
}
