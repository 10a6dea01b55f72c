//! The three timecard operations: spreadsheet, PDF, email

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use timecard_core::{EmailTimecardRequest, TimecardRequest};
use timecard_render::{render_timecard, ProjectionReport, RenderedTimecard, TracingObserver, XlsxTemplate};
use tracing::{info, warn};

use crate::config::Settings;
use crate::convert::DocumentConverter;
use crate::mail::{attachment_file_name, build_message, split_recipients, Envelope, MailError, MailTransport};

/// Printed on stdout after a successful `email`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailStatus {
    pub status: &'static str,
    pub message: String,
}

impl EmailStatus {
    fn sent(to: &str) -> Self {
        Self {
            status: "success",
            message: format!("Email sent to {to}"),
        }
    }
}

/// `timecard_<employee>.<extension>`, with path separators replaced
pub fn output_name(employee_name: &str, extension: &str) -> String {
    let name: String = employee_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("timecard_{name}.{extension}")
}

fn log_report(report: &ProjectionReport) {
    if report.fallback {
        warn!("template unusable; wrote basic workbook");
        return;
    }
    info!(
        weeks = report.weeks.len(),
        skipped_weeks = report.skipped_weeks.len(),
        ignored_weeks = report.ignored_weeks,
        hours_written = report.hours_written(),
        dropped_keys = report.dropped_keys().count(),
        "timecard rendered"
    );
}

pub fn generate(request: &TimecardRequest, settings: &Settings) -> Result<RenderedTimecard> {
    let template = XlsxTemplate::from_path(&settings.template);
    let rendered = render_timecard(request, &template, &mut TracingObserver)
        .with_context(|| format!("rendering timecard from {}", settings.template.display()))?;
    log_report(&rendered.report);
    Ok(rendered)
}

pub fn pdf(
    request: &TimecardRequest,
    settings: &Settings,
    converter: &dyn DocumentConverter,
) -> Result<Vec<u8>> {
    let rendered = generate(request, settings)?;
    converter
        .convert(&rendered.bytes, &output_name(&request.employee_name, "xlsx"))
        .context("converting to PDF")
}

pub fn email(
    request: &EmailTimecardRequest,
    settings: &Settings,
    transport: &dyn MailTransport,
    today: NaiveDate,
) -> Result<EmailStatus> {
    let from = settings.mail.sender().ok_or(MailError::NoSender)?;
    let to = split_recipients(&request.to);
    let cc = request.cc.as_deref().map(split_recipients).unwrap_or_default();
    let envelope = Envelope::new(from, to.iter().chain(&cc).cloned().collect())?;

    let rendered = generate(&request.timecard, settings)?;
    let file_name = attachment_file_name(&request.timecard.employee_name, today);
    let message = build_message(
        from,
        &to,
        &cc,
        &request.subject,
        &request.body,
        &rendered.bytes,
        &file_name,
    );

    transport
        .send(&envelope, message.as_bytes())
        .context("sending email")?;
    info!(to = %request.to, attachment = %file_name, "email sent");
    Ok(EmailStatus::sent(&request.to))
}
