//! # timecard-core
//!
//! Core domain model and cell-mapping engine for timecard sheets.
//!
//! This crate provides:
//! - Domain types: `TimecardRequest`, `WeekData`, `Entry`, `Job`, `CompositeKey`
//! - Input decoding that folds every accepted field spelling into one canonical record
//! - The job index, key aggregator and column assigner
//! - Template layout (`CellRef`, `Block`, `Slot`) and spreadsheet date serials
//! - The `ProjectionObserver` hook used to report projection progress
//!
//! Nothing in this crate performs I/O; the render crate drives a workbook with
//! the addresses and totals computed here.
//!
//! ## Example
//!
//! ```rust
//! use timecard_core::{assign_columns, decode_request, Block};
//!
//! let request = decode_request(br#"{
//!     "employee_name": "Ada",
//!     "jobs": [{"job_code": "29699", "job_name": "201"}],
//!     "weeks": [{
//!         "week_number": 1,
//!         "week_start_date": "2025-01-06T00:00:00Z",
//!         "week_label": "WEEK 1",
//!         "entries": [
//!             {"date": "2025-01-06T00:00:00Z", "job_code": "29699", "hours": 8},
//!             {"date": "2025-01-07T00:00:00Z", "code": "29699", "hours": 4, "isNightShift": true}
//!         ]
//!     }]
//! }"#).unwrap();
//!
//! let columns = assign_columns(&request.weeks[0].entries, Block::Regular);
//! let keys: Vec<String> = columns.keys().iter().map(|k| k.to_string()).collect();
//! assert_eq!(keys, vec!["29699", "N29699"]);
//! ```

pub mod aggregate;
pub mod columns;
pub mod jobs;
pub mod layout;
pub mod observer;
pub mod time;

mod decode;

pub use aggregate::{aggregate_block, BlockTotals};
pub use columns::{assign_columns, ColumnAssignment};
pub use decode::{decode_email_request, decode_request, DecodeError};
pub use jobs::JobIndex;
pub use layout::{
    Block, CellRange, CellRef, InvalidCellRef, Slot, TemplateLayout, DAYS_PER_WEEK, SLOT_COUNT,
};
pub use observer::{CollectingObserver, NoopObserver, ProjectionEvent, ProjectionObserver};
pub use time::{add_days, calendar_day, date_serial, parse_timestamp, TimestampError};

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// Job number as it appears on the timecard (e.g. "29699")
pub type JobCode = String;

// ============================================================================
// Jobs and Entries
// ============================================================================

/// A job the employee may book hours against
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job number, unique within a request
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub job_code: JobCode,
    /// Display label written into the header row (the labour code, e.g. "201")
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub job_name: String,
}

impl Job {
    pub fn new(job_code: impl Into<JobCode>, job_name: impl Into<String>) -> Self {
        Self {
            job_code: job_code.into(),
            job_name: job_name.into(),
        }
    }
}

/// A single booking of hours against a job on one day.
///
/// Decoding accepts several spellings for the job reference and the flags;
/// see [`decode_request`] for the precedence rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "decode::RawEntry")]
pub struct Entry {
    /// RFC 3339 timestamp, kept verbatim so a bad value only drops this entry
    pub date: String,
    pub job_code: JobCode,
    pub hours: f64,
    pub overtime: bool,
    #[serde(rename = "is_night_shift")]
    pub night_shift: bool,
}

impl Entry {
    pub fn new(date: impl Into<String>, job_code: impl Into<JobCode>, hours: f64) -> Self {
        Self {
            date: date.into(),
            job_code: job_code.into(),
            hours,
            overtime: false,
            night_shift: false,
        }
    }

    /// Mark the entry as overtime
    pub fn overtime(mut self) -> Self {
        self.overtime = true;
        self
    }

    /// Mark the entry as a night shift
    pub fn night(mut self) -> Self {
        self.night_shift = true;
        self
    }

    /// The grouping key for aggregation and column assignment
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.job_code.clone(), self.night_shift)
    }

    /// The block this entry's hours belong to
    pub fn block(&self) -> Block {
        Block::from_overtime(self.overtime)
    }

    pub fn timestamp(&self) -> Result<DateTime<FixedOffset>, TimestampError> {
        parse_timestamp(&self.date)
    }
}

/// Job code plus night-shift flag.
///
/// Night-shift hours for a job occupy their own column, separate from the
/// day-shift hours for the same job. The display form prefixes `N`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    pub job_code: JobCode,
    pub night_shift: bool,
}

impl CompositeKey {
    pub fn new(job_code: impl Into<JobCode>, night_shift: bool) -> Self {
        Self {
            job_code: job_code.into(),
            night_shift,
        }
    }

    /// Header label for this key given the job's display name
    pub fn label(&self, job_name: &str) -> String {
        if self.night_shift {
            format!("N{job_name}")
        } else {
            job_name.to_string()
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.night_shift {
            write!(f, "N{}", self.job_code)
        } else {
            f.write_str(&self.job_code)
        }
    }
}

// ============================================================================
// Weeks and Requests
// ============================================================================

/// One week of entries, projected onto one sheet of the template
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekData {
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub week_number: i64,
    /// RFC 3339 timestamp of the first day; a bad value skips the whole week
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub week_start_date: String,
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub week_label: String,
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub entries: Vec<Entry>,
}

impl WeekData {
    pub fn new(week_number: i64, week_start_date: impl Into<String>, week_label: impl Into<String>) -> Self {
        Self {
            week_number,
            week_start_date: week_start_date.into(),
            week_label: week_label.into(),
            entries: Vec::new(),
        }
    }

    pub fn entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn start(&self) -> Result<DateTime<FixedOffset>, TimestampError> {
        parse_timestamp(&self.week_start_date)
    }
}

/// A complete timecard as submitted by the client
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimecardRequest {
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub employee_name: String,
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub pay_period_num: i64,
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub year: i64,
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub jobs: Vec<Job>,
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub weeks: Vec<WeekData>,

    /// Single-week shape used by older clients; ignored when `weeks` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_number_label: Option<String>,
    #[serde(default, deserialize_with = "decode::null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<Entry>,
}

impl TimecardRequest {
    pub fn new(employee_name: impl Into<String>) -> Self {
        Self {
            employee_name: employee_name.into(),
            ..Self::default()
        }
    }

    pub fn job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn week(mut self, week: WeekData) -> Self {
        self.weeks.push(week);
        self
    }

    /// Weeks to project, in sheet order.
    ///
    /// Falls back to the legacy top-level week when `weeks` is empty and a
    /// top-level start date was supplied.
    pub fn effective_weeks(&self) -> Cow<'_, [WeekData]> {
        if !self.weeks.is_empty() {
            return Cow::Borrowed(&self.weeks);
        }
        match self.week_start_date.as_deref() {
            Some(start) if !start.is_empty() => Cow::Owned(vec![WeekData {
                week_number: 1,
                week_start_date: start.to_string(),
                week_label: self.week_number_label.clone().unwrap_or_default(),
                entries: self.entries.clone(),
            }]),
            _ => Cow::Borrowed(&[]),
        }
    }
}

/// A timecard plus the message that should carry it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailTimecardRequest {
    #[serde(flatten)]
    pub timecard: TimecardRequest,
    /// Comma-separated recipient list
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub to: String,
    /// Comma-separated carbon-copy list
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "decode::null_as_default")]
    pub body: String,
}

// ============================================================================
// Tests
// ============================================================================
