//! Key aggregator
//!
//! Sums hours per `(calendar day, composite key)` for one block of a week.
//! Entries belonging to the other block are ignored entirely; the caller runs
//! the aggregator once per block.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::observer::ProjectionObserver;
use crate::time::calendar_day;
use crate::{Block, CompositeKey, Entry};

/// Hour totals for one block, by day then key
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockTotals {
    days: BTreeMap<NaiveDate, HashMap<CompositeKey, f64>>,
    skipped: usize,
}

impl BlockTotals {
    /// Summed hours for `key` on `day`, if any entry contributed
    pub fn hours(&self, day: NaiveDate, key: &CompositeKey) -> Option<f64> {
        self.days.get(&day).and_then(|keys| keys.get(key)).copied()
    }

    pub fn day(&self, day: NaiveDate) -> Option<&HashMap<CompositeKey, f64>> {
        self.days.get(&day)
    }

    /// Days with at least one contributing entry, ascending
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }

    /// Entries of this block dropped because their date did not parse
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Sum the hours of every `block` entry by day and composite key.
///
/// Entries whose date fails to parse are reported to `observer` and left out.
pub fn aggregate_block(
    entries: &[Entry],
    block: Block,
    observer: &mut dyn ProjectionObserver,
) -> BlockTotals {
    let mut totals = BlockTotals::default();

    for entry in entries.iter().filter(|e| e.block() == block) {
        let timestamp = match entry.timestamp() {
            Ok(t) => t,
            Err(err) => {
                observer.entry_skipped(entry, &err);
                totals.skipped += 1;
                continue;
            }
        };

        *totals
            .days
            .entry(calendar_day(&timestamp))
            .or_default()
            .entry(entry.key())
            .or_default() += entry.hours;
    }

    totals
}
