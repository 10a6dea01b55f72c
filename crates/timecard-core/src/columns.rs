//! Column assigner
//!
//! Each distinct composite key of a block gets a column slot in order of its
//! first appearance in the week's entries. The order is never re-sorted, so
//! identical input always lands in identical columns. Keys past the last slot
//! are dropped from the sheet and kept in [`ColumnAssignment::dropped`].

use std::collections::HashSet;

use crate::layout::{Slot, SLOT_COUNT};
use crate::{Block, CompositeKey, Entry};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnAssignment {
    keys: Vec<CompositeKey>,
    dropped: Vec<CompositeKey>,
}

impl ColumnAssignment {
    /// Keys that received a slot, in slot order
    pub fn keys(&self) -> &[CompositeKey] {
        &self.keys
    }

    /// Keys that appeared after every slot was taken
    pub fn dropped(&self) -> &[CompositeKey] {
        &self.dropped
    }

    pub fn slots(&self) -> impl Iterator<Item = (Slot, &CompositeKey)> {
        Slot::all().zip(self.keys.iter())
    }

}

/// Assign slots to the distinct keys of `block`, in first-seen order.
///
/// Entry dates are not consulted: an entry with an unparsable date still
/// claims a column even though it contributes no hours.
pub fn assign_columns(entries: &[Entry], block: Block) -> ColumnAssignment {
    let mut seen = HashSet::new();
    let mut assignment = ColumnAssignment::default();

    for entry in entries.iter().filter(|e| e.block() == block) {
        let key = entry.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        if assignment.keys.len() < SLOT_COUNT {
            assignment.keys.push(key);
        } else {
            assignment.dropped.push(key);
        }
    }

    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DATE: &str = "2025-01-06T00:00:00Z";

    fn labels(assignment: &ColumnAssignment) -> Vec<String> {
        assignment.keys().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn first_seen_order() {
        let entries = vec![
            Entry::new(DATE, "300", 1.0),
            Entry::new(DATE, "100", 1.0),
            Entry::new(DATE, "300", 1.0),
            Entry::new(DATE, "200", 1.0),
        ];
        let assignment = assign_columns(&entries, Block::Regular);
        assert_eq!(labels(&assignment), vec!["300", "100", "200"]);
        let (slot, _) = assignment.slots().nth(2).unwrap();
        assert_eq!(slot.index(), 2);
    }

    #[test]
    fn night_key_gets_its_own_column() {
        let entries = vec![
            Entry::new(DATE, "29699", 1.0).night(),
            Entry::new(DATE, "29699", 1.0),
        ];
        let assignment = assign_columns(&entries, Block::Regular);
        assert_eq!(labels(&assignment), vec!["N29699", "29699"]);
    }

    #[test]
    fn blocks_assigned_independently() {
        let entries = vec![
            Entry::new(DATE, "A", 1.0),
            Entry::new(DATE, "B", 1.0).overtime(),
            Entry::new(DATE, "C", 1.0),
            Entry::new(DATE, "A", 1.0).overtime(),
        ];
        assert_eq!(labels(&assign_columns(&entries, Block::Regular)), vec!["A", "C"]);
        assert_eq!(labels(&assign_columns(&entries, Block::Overtime)), vec!["B", "A"]);
    }

    #[test]
    fn truncates_after_sixteen() {
        let entries: Vec<Entry> = (0..17).map(|i| Entry::new(DATE, format!("J{i}"), 1.0)).collect();
        let assignment = assign_columns(&entries, Block::Regular);
        assert_eq!(assignment.keys().len(), SLOT_COUNT);
        assert_eq!(assignment.keys()[15].job_code, "J15");
        assert_eq!(assignment.dropped(), &[CompositeKey::new("J16", false)]);
        assert!(assignment.slots().all(|(_, key)| key.job_code != "J16"));
    }

    #[test]
    fn repeated_runs_agree() {
        let entries: Vec<Entry> = (0..20)
            .map(|i| Entry::new(DATE, format!("{}", i % 7), 1.0))
            .collect();
        assert_eq!(
            assign_columns(&entries, Block::Regular),
            assign_columns(&entries, Block::Regular)
        );
    }

    #[test]
    fn bad_dates_still_claim_columns() {
        let entries = vec![Entry::new("garbage", "1", 1.0)];
        assert_eq!(labels(&assign_columns(&entries, Block::Regular)), vec!["1"]);
    }
}
