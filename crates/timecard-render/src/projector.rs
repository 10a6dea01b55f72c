//! Sheet projector
//!
//! Writes one week onto one sheet of the template:
//!
//! ```text
//!        B            C     D      E     F     ...  AG    AH       AJ
//!  2                              (M2 employee name)              pay period
//!  3                                                              year
//!  4   week start   label  job#   label  job#  ...                week label
//!  5   day 0 serial hours         hours
//!  ...
//! 11   day 6 serial
//! 15   (overtime block: same shape, rows 15-22)
//! ```
//!
//! Every address comes from [`TemplateLayout`]; nothing here spells out a
//! cell reference.

use thiserror::Error;
use timecard_core::{
    add_days, aggregate_block, assign_columns, calendar_day, date_serial, Block, CompositeKey,
    JobIndex, ProjectionObserver, TemplateLayout, TimecardRequest, TimestampError, WeekData,
    DAYS_PER_WEEK,
};

use crate::workbook::{Border, CellStyle, CellValue, Workbook, WorkbookError};

/// Why a week could not be projected
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("week {week_number} has an unusable start date: {source}")]
    WeekStart {
        week_number: i64,
        #[source]
        source: TimestampError,
    },

    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

/// What was written for one week
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeekReport {
    pub sheet: String,
    pub week_number: i64,
    /// Hour cells written across both blocks
    pub hours_written: usize,
    /// Regular-block keys that did not fit in the sixteen slots
    pub dropped_regular: Vec<CompositeKey>,
    /// Overtime-block keys that did not fit in the sixteen slots
    pub dropped_overtime: Vec<CompositeKey>,
    /// Entries whose date could not be parsed
    pub skipped_entries: usize,
    /// Keys that got a column but have no job label
    pub unknown_jobs: Vec<CompositeKey>,
    pub style_failures: usize,
}

impl WeekReport {
    pub fn dropped(&self, block: Block) -> &[CompositeKey] {
        match block {
            Block::Regular => &self.dropped_regular,
            Block::Overtime => &self.dropped_overtime,
        }
    }

    fn dropped_mut(&mut self, block: Block) -> &mut Vec<CompositeKey> {
        match block {
            Block::Regular => &mut self.dropped_regular,
            Block::Overtime => &mut self.dropped_overtime,
        }
    }
}

/// Projects the weeks of one request
#[derive(Clone, Debug)]
pub struct SheetProjector<'a> {
    request: &'a TimecardRequest,
    jobs: JobIndex<'a>,
    style: CellStyle,
}

impl<'a> SheetProjector<'a> {
    pub fn new(request: &'a TimecardRequest) -> Self {
        Self {
            request,
            jobs: JobIndex::new(&request.jobs),
            style: CellStyle::bordered(Border::thin()),
        }
    }

    /// Border drawn around both blocks (thin black by default)
    pub fn border(mut self, border: Border) -> Self {
        self.style = CellStyle::bordered(border);
        self
    }

    /// Write `week` onto `sheet`.
    ///
    /// A bad week start date fails before anything is written. Style
    /// failures are reported to `observer` and otherwise ignored.
    pub fn project_week<W: Workbook + ?Sized>(
        &self,
        workbook: &mut W,
        sheet: &str,
        week: &WeekData,
        observer: &mut dyn ProjectionObserver,
    ) -> Result<WeekReport, ProjectionError> {
        let start = match week.start() {
            Ok(start) => start,
            Err(source) => {
                observer.week_skipped(week.week_number, &source);
                return Err(ProjectionError::WeekStart {
                    week_number: week.week_number,
                    source,
                });
            }
        };
        observer.week_started(sheet, week.week_number, week.entries.len());

        let mut report = WeekReport {
            sheet: sheet.to_string(),
            week_number: week.week_number,
            ..WeekReport::default()
        };

        let request = self.request;
        workbook.set_cell_value(sheet, TemplateLayout::EMPLOYEE_NAME, request.employee_name.as_str().into())?;
        workbook.set_cell_value(sheet, TemplateLayout::PAY_PERIOD, request.pay_period_num.into())?;
        workbook.set_cell_value(sheet, TemplateLayout::YEAR, request.year.into())?;
        workbook.set_cell_value(sheet, TemplateLayout::WEEK_START, date_serial(&start).into())?;
        workbook.set_cell_value(sheet, TemplateLayout::WEEK_LABEL, week.week_label.as_str().into())?;

        for block in Block::ALL {
            let columns = assign_columns(&week.entries, block);
            if !columns.dropped().is_empty() {
                observer.keys_dropped(block, columns.dropped());
                report.dropped_mut(block).extend_from_slice(columns.dropped());
            }

            for (slot, key) in columns.slots() {
                match self.jobs.name(&key.job_code) {
                    Some(name) => {
                        let label = key.label(name);
                        let label_cell = TemplateLayout::label_cell(block, slot);
                        workbook.set_cell_value(sheet, label_cell, label.as_str().into())?;
                        workbook.set_cell_value(
                            sheet,
                            TemplateLayout::job_cell(block, slot),
                            key.job_code.as_str().into(),
                        )?;
                        observer.header_written(block, label_cell, &label, key);
                    }
                    None => {
                        observer.unknown_job(block, key);
                        report.unknown_jobs.push(key.clone());
                    }
                }
            }

            let totals = aggregate_block(&week.entries, block, observer);
            report.skipped_entries += totals.skipped();

            for day in 0..DAYS_PER_WEEK {
                let date = add_days(&start, day);
                workbook.set_cell_value(
                    sheet,
                    TemplateLayout::date_cell(block, day),
                    CellValue::Number(date_serial(&date)),
                )?;

                let calendar_date = calendar_day(&date);
                for (slot, key) in columns.slots() {
                    // Zero totals leave the template cell as it was.
                    let Some(hours) = totals.hours(calendar_date, key).filter(|h| *h != 0.0) else {
                        continue;
                    };
                    let cell = TemplateLayout::hours_cell(block, slot, day);
                    workbook.set_cell_value(sheet, cell, hours.into())?;
                    observer.hours_written(block, cell, key, hours);
                    report.hours_written += 1;
                }
            }
        }

        for block in Block::ALL {
            let range = block.border_range();
            if let Err(err) = workbook.set_cell_style(sheet, range, &self.style) {
                observer.style_failed(sheet, range, &err);
                report.style_failures += 1;
            }
        }

        observer.week_finished(sheet, week.week_number);
        Ok(report)
    }
}
