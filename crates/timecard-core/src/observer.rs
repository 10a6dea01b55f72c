//! Projection observer hook
//!
//! The projection engine never logs on its own. It reports what it does to a
//! [`ProjectionObserver`], and the caller decides whether that becomes log
//! output (see `TracingObserver` in `timecard-render`), a collected list for
//! assertions, or nothing at all.

use std::fmt::Display;

use crate::{Block, CellRange, CellRef, CompositeKey, Entry, TimestampError};

/// Receives projection progress. Every method defaults to a no-op.
pub trait ProjectionObserver {
    /// A week is about to be written to `sheet`
    fn week_started(&mut self, _sheet: &str, _week_number: i64, _entries: usize) {}

    /// The week's start date could not be parsed; nothing was written for it
    fn week_skipped(&mut self, _week_number: i64, _error: &TimestampError) {}

    /// An entry's date could not be parsed; its hours are not counted
    fn entry_skipped(&mut self, _entry: &Entry, _error: &TimestampError) {}

    /// A label/job-number header pair was written for `key`
    fn header_written(&mut self, _block: Block, _cell: CellRef, _label: &str, _key: &CompositeKey) {}

    /// `key` got a column but its job code has no entry in the job list
    fn unknown_job(&mut self, _block: Block, _key: &CompositeKey) {}

    /// An hour total was written
    fn hours_written(&mut self, _block: Block, _cell: CellRef, _key: &CompositeKey, _hours: f64) {}

    /// Keys beyond the last column slot were left off the sheet
    fn keys_dropped(&mut self, _block: Block, _keys: &[CompositeKey]) {}

    /// Applying the border style failed; cell values are unaffected
    fn style_failed(&mut self, _sheet: &str, _range: CellRange, _error: &dyn Display) {}

    fn week_finished(&mut self, _sheet: &str, _week_number: i64) {}

    /// The template was unusable and the basic workbook was produced instead
    fn fallback_used(&mut self, _reason: &dyn Display) {}
}

/// Observer that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ProjectionObserver for NoopObserver {}

/// Owned record of one observer callback
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionEvent {
    WeekStarted { sheet: String, week_number: i64 },
    WeekSkipped { week_number: i64, reason: String },
    EntrySkipped { job_code: String, date: String },
    HeaderWritten { block: Block, cell: CellRef, label: String },
    UnknownJob { block: Block, key: CompositeKey },
    HoursWritten { block: Block, cell: CellRef, key: CompositeKey, hours: f64 },
    KeysDropped { block: Block, keys: Vec<CompositeKey> },
    StyleFailed { sheet: String, range: CellRange, reason: String },
    WeekFinished { sheet: String, week_number: i64 },
    FallbackUsed { reason: String },
}

/// Observer that records every callback, in order
#[derive(Clone, Debug, Default)]
pub struct CollectingObserver {
    pub events: Vec<ProjectionEvent>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written_hours(&self) -> impl Iterator<Item = (&CellRef, f64)> {
        self.events.iter().filter_map(|event| match event {
            ProjectionEvent::HoursWritten { cell, hours, .. } => Some((cell, *hours)),
            _ => None,
        })
    }
}

impl ProjectionObserver for CollectingObserver {
    fn week_started(&mut self, sheet: &str, week_number: i64, _entries: usize) {
        self.events.push(ProjectionEvent::WeekStarted {
            sheet: sheet.to_string(),
            week_number,
        });
    }

    fn week_skipped(&mut self, week_number: i64, error: &TimestampError) {
        self.events.push(ProjectionEvent::WeekSkipped {
            week_number,
            reason: error.to_string(),
        });
    }

    fn entry_skipped(&mut self, entry: &Entry, _error: &TimestampError) {
        self.events.push(ProjectionEvent::EntrySkipped {
            job_code: entry.job_code.clone(),
            date: entry.date.clone(),
        });
    }

    fn header_written(&mut self, block: Block, cell: CellRef, label: &str, _key: &CompositeKey) {
        self.events.push(ProjectionEvent::HeaderWritten {
            block,
            cell,
            label: label.to_string(),
        });
    }

    fn unknown_job(&mut self, block: Block, key: &CompositeKey) {
        self.events.push(ProjectionEvent::UnknownJob {
            block,
            key: key.clone(),
        });
    }

    fn hours_written(&mut self, block: Block, cell: CellRef, key: &CompositeKey, hours: f64) {
        self.events.push(ProjectionEvent::HoursWritten {
            block,
            cell,
            key: key.clone(),
            hours,
        });
    }

    fn keys_dropped(&mut self, block: Block, keys: &[CompositeKey]) {
        self.events.push(ProjectionEvent::KeysDropped {
            block,
            keys: keys.to_vec(),
        });
    }

    fn style_failed(&mut self, sheet: &str, range: CellRange, error: &dyn Display) {
        self.events.push(ProjectionEvent::StyleFailed {
            sheet: sheet.to_string(),
            range,
            reason: error.to_string(),
        });
    }

    fn week_finished(&mut self, sheet: &str, week_number: i64) {
        self.events.push(ProjectionEvent::WeekFinished {
            sheet: sheet.to_string(),
            week_number,
        });
    }

    fn fallback_used(&mut self, reason: &dyn Display) {
        self.events.push(ProjectionEvent::FallbackUsed {
            reason: reason.to_string(),
        });
    }
}
