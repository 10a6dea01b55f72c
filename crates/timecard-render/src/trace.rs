//! `tracing` bridge for projection events

use std::fmt::Display;

use timecard_core::{Block, CellRange, CellRef, CompositeKey, Entry, ProjectionObserver, TimestampError};
use tracing::{debug, info, warn};

/// Forwards projection progress to `tracing`: `info` per week, `debug` per
/// cell, `warn` for anything that lost data.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ProjectionObserver for TracingObserver {
    fn week_started(&mut self, sheet: &str, week_number: i64, entries: usize) {
        info!(sheet, week = week_number, entries, "projecting week");
    }

    fn week_skipped(&mut self, week_number: i64, error: &TimestampError) {
        warn!(week = week_number, %error, "skipping week");
    }

    fn entry_skipped(&mut self, entry: &Entry, error: &TimestampError) {
        warn!(job = %entry.job_code, hours = entry.hours, %error, "skipping entry");
    }

    fn header_written(&mut self, block: Block, cell: CellRef, label: &str, key: &CompositeKey) {
        debug!(%block, %cell, label, %key, "header");
    }

    fn unknown_job(&mut self, block: Block, key: &CompositeKey) {
        warn!(%block, %key, "job code not in job list; header left blank");
    }

    fn hours_written(&mut self, block: Block, cell: CellRef, key: &CompositeKey, hours: f64) {
        debug!(%block, %cell, %key, hours, "hours");
    }

    fn keys_dropped(&mut self, block: Block, keys: &[CompositeKey]) {
        let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
        warn!(%block, dropped = ?keys, "more keys than columns");
    }

    fn style_failed(&mut self, sheet: &str, range: CellRange, error: &dyn Display) {
        warn!(sheet, %range, %error, "could not apply border");
    }

    fn week_finished(&mut self, sheet: &str, week_number: i64) {
        debug!(sheet, week = week_number, "week done");
    }

    fn fallback_used(&mut self, reason: &dyn Display) {
        warn!(%reason, "template unavailable, writing basic workbook");
    }
}
