//! # timecard-render
//!
//! Writes timecards into the fixed xlsx template.
//!
//! This crate provides:
//! - The `Workbook` / `TemplateSource` capability the projector writes through
//! - `SheetProjector`, which lays one week onto one sheet
//! - `render_timecard`, the request → workbook bytes entry point
//! - `XlsxTemplate`, an in-place patcher for existing `.xlsx` templates
//! - The basic fallback workbook and a `tracing` observer
//!
//! ## Example
//!
//! ```rust,ignore
//! use timecard_core::decode_request;
//! use timecard_render::{render_timecard, TracingObserver, XlsxTemplate};
//!
//! let request = decode_request(&std::fs::read("request.json")?)?;
//! let template = XlsxTemplate::from_path("template.xlsx");
//! let rendered = render_timecard(&request, &template, &mut TracingObserver)?;
//! std::fs::write("timecard.xlsx", &rendered.bytes)?;
//! ```

pub mod fallback;
pub mod projector;
pub mod timecard;
pub mod trace;
pub mod workbook;
pub mod xlsx;

pub use fallback::basic_workbook;
pub use projector::{ProjectionError, SheetProjector, WeekReport};
pub use timecard::{render_timecard, ProjectionReport, RenderedTimecard, SkippedWeek, MAX_WEEK_SHEETS};
pub use trace::TracingObserver;
pub use workbook::{
    Border, BorderStyle, CellStyle, CellValue, TemplateSource, Workbook, WorkbookError,
};
pub use xlsx::{XlsxTemplate, XlsxWorkbook};

use thiserror::Error;

/// Rendering error
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("workbook error: {0}")]
    Workbook(#[from] WorkbookError),

    #[error("could not build fallback workbook: {0}")]
    Fallback(#[source] WorkbookError),
}
