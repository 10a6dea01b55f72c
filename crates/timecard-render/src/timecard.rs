//! Request → workbook bytes

use std::fmt::Display;

use timecard_core::{Block, CompositeKey, ProjectionObserver, TimecardRequest};

use crate::fallback::basic_workbook;
use crate::projector::{ProjectionError, SheetProjector, WeekReport};
use crate::workbook::{TemplateSource, Workbook};
use crate::RenderError;

/// The template has one sheet per week, and only two of them.
pub const MAX_WEEK_SHEETS: usize = 2;

/// A week that was not projected because its start date did not parse
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedWeek {
    pub week_number: i64,
    pub reason: String,
}

/// Summary of one projection
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectionReport {
    /// The basic workbook was produced because the template was unusable
    pub fallback: bool,
    pub weeks: Vec<WeekReport>,
    pub skipped_weeks: Vec<SkippedWeek>,
    /// Weeks beyond the sheets the template provides
    pub ignored_weeks: usize,
}

impl ProjectionReport {
    pub fn hours_written(&self) -> usize {
        self.weeks.iter().map(|w| w.hours_written).sum()
    }

    /// Every key left off a sheet for lack of columns, with its week and block
    pub fn dropped_keys(&self) -> impl Iterator<Item = (i64, Block, &CompositeKey)> {
        self.weeks.iter().flat_map(|week| {
            Block::ALL.into_iter().flat_map(move |block| {
                week.dropped(block)
                    .iter()
                    .map(move |key| (week.week_number, block, key))
            })
        })
    }
}

/// Serialized workbook plus what went into it
#[derive(Clone, Debug)]
pub struct RenderedTimecard {
    pub bytes: Vec<u8>,
    pub report: ProjectionReport,
}

fn fallback(
    request: &TimecardRequest,
    reason: &dyn Display,
    observer: &mut dyn ProjectionObserver,
) -> Result<RenderedTimecard, RenderError> {
    observer.fallback_used(reason);
    let bytes = basic_workbook(&request.employee_name).map_err(RenderError::Fallback)?;
    Ok(RenderedTimecard {
        bytes,
        report: ProjectionReport {
            fallback: true,
            ..ProjectionReport::default()
        },
    })
}

/// Project `request` onto a fresh copy of `template` and serialize it.
///
/// Week *n* goes to sheet *n*, for at most [`MAX_WEEK_SHEETS`] weeks. A
/// template that cannot be opened, or has no sheets, yields the basic
/// workbook instead of an error. Weeks with an unusable start date are
/// skipped and listed in the report; only workbook failures abort.
pub fn render_timecard<T: TemplateSource + ?Sized>(
    request: &TimecardRequest,
    template: &T,
    observer: &mut dyn ProjectionObserver,
) -> Result<RenderedTimecard, RenderError> {
    let mut workbook = match template.open() {
        Ok(workbook) => workbook,
        Err(err) => return fallback(request, &err, observer),
    };
    let sheets = workbook.sheet_names();
    if sheets.is_empty() {
        return fallback(request, &"template has no sheets", observer);
    }

    let weeks = request.effective_weeks();
    let projector = SheetProjector::new(request);
    let mut report = ProjectionReport::default();

    let projected = weeks.len().min(sheets.len()).min(MAX_WEEK_SHEETS);
    report.ignored_weeks = weeks.len() - projected;

    for (week, sheet) in weeks.iter().zip(&sheets).take(projected) {
        match projector.project_week(&mut workbook, sheet, week, observer) {
            Ok(week_report) => report.weeks.push(week_report),
            Err(ProjectionError::WeekStart { week_number, source }) => {
                report.skipped_weeks.push(SkippedWeek {
                    week_number,
                    reason: source.to_string(),
                });
            }
            Err(ProjectionError::Workbook(err)) => return Err(err.into()),
        }
    }

    let bytes = workbook.serialize()?;
    Ok(RenderedTimecard { bytes, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::recording::RecordingWorkbook;
    use crate::workbook::WorkbookError;
    use pretty_assertions::assert_eq;
    use timecard_core::{CollectingObserver, Entry, Job, NoopObserver, ProjectionEvent, WeekData};

    struct Fixed(Vec<&'static str>);

    impl TemplateSource for Fixed {
        type Workbook = RecordingWorkbook;

        fn open(&self) -> Result<RecordingWorkbook, WorkbookError> {
            Ok(RecordingWorkbook::with_sheets(&self.0))
        }
    }

    struct Missing;

    impl TemplateSource for Missing {
        type Workbook = RecordingWorkbook;

        fn open(&self) -> Result<RecordingWorkbook, WorkbookError> {
            Err(WorkbookError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "template.xlsx",
            )))
        }
    }

    fn two_weeks() -> TimecardRequest {
        TimecardRequest::new("Ada")
            .job(Job::new("29699", "201"))
            .week(WeekData::new(1, "2025-01-06T00:00:00Z", "W1").entry(Entry::new("2025-01-06T08:00:00Z", "29699", 8.0)))
            .week(WeekData::new(2, "2025-01-13T00:00:00Z", "W2").entry(Entry::new("2025-01-14T08:00:00Z", "29699", 4.0)))
    }

    #[test]
    fn weeks_map_to_sheets_in_order() {
        let rendered = render_timecard(&two_weeks(), &Fixed(vec!["A", "B"]), &mut NoopObserver).unwrap();
        let sheets: Vec<&str> = rendered.report.weeks.iter().map(|w| w.sheet.as_str()).collect();
        assert_eq!(sheets, vec!["A", "B"]);
        assert_eq!(rendered.report.hours_written(), 2);
        assert!(!rendered.report.fallback);
    }

    #[test]
    fn second_week_needs_a_second_sheet() {
        let rendered = render_timecard(&two_weeks(), &Fixed(vec!["Only"]), &mut NoopObserver).unwrap();
        assert_eq!(rendered.report.weeks.len(), 1);
        assert_eq!(rendered.report.ignored_weeks, 1);
    }

    #[test]
    fn third_week_is_ignored() {
        let request = two_weeks().week(WeekData::new(3, "2025-01-20T00:00:00Z", "W3"));
        let rendered = render_timecard(&request, &Fixed(vec!["A", "B", "C"]), &mut NoopObserver).unwrap();
        assert_eq!(rendered.report.weeks.len(), 2);
        assert_eq!(rendered.report.ignored_weeks, 1);
    }

    #[test]
    fn bad_week_is_skipped_and_others_proceed() {
        let mut request = two_weeks();
        request.weeks[0].week_start_date = "garbage".into();
        let rendered = render_timecard(&request, &Fixed(vec!["A", "B"]), &mut NoopObserver).unwrap();

        assert_eq!(rendered.report.skipped_weeks.len(), 1);
        assert_eq!(rendered.report.skipped_weeks[0].week_number, 1);
        assert_eq!(rendered.report.weeks.len(), 1);
        assert_eq!(rendered.report.weeks[0].sheet, "B");
    }

    #[test]
    fn missing_template_falls_back() {
        let mut observer = CollectingObserver::new();
        let rendered = render_timecard(&two_weeks(), &Missing, &mut observer).unwrap();
        assert!(rendered.report.fallback);
        assert!(rendered.bytes.starts_with(b"PK"));
        assert!(matches!(observer.events.as_slice(), [ProjectionEvent::FallbackUsed { .. }]));
    }

    #[test]
    fn sheetless_template_falls_back() {
        let rendered = render_timecard(&two_weeks(), &Fixed(vec![]), &mut NoopObserver).unwrap();
        assert!(rendered.report.fallback);
    }

    #[test]
    fn dropped_keys_are_listed() {
        let mut week = WeekData::new(1, "2025-01-06T00:00:00Z", "W1");
        week.entries = (0..18).map(|i| Entry::new("2025-01-06T00:00:00Z", format!("{i}"), 1.0)).collect();
        let request = TimecardRequest::new("Ada").week(week);
        let rendered = render_timecard(&request, &Fixed(vec!["A"]), &mut NoopObserver).unwrap();

        let dropped: Vec<String> = rendered
            .report
            .dropped_keys()
            .map(|(week, block, key)| format!("{week}/{block}/{key}"))
            .collect();
        assert_eq!(dropped, vec!["1/regular/16", "1/regular/17"]);
    }
}
