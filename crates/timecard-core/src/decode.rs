//! Request decoding
//!
//! Clients send entries with snake_case or camelCase flags and with the job
//! reference under `job_code` or `code`. Every spelling is read into one raw
//! record and folded into [`Entry`] exactly once:
//!
//! | Field     | Precedence                                          |
//! |-----------|-----------------------------------------------------|
//! | job code  | `job_code` (when non-empty), `code`, empty string   |
//! | overtime  | `overtime`, `isOvertime`, false                     |
//! | night     | `night_shift`, `is_night_shift`, `isNightShift`, false |
//! | hours     | `hours` (must be a number when present), 0.0        |
//!
//! An explicit `null` reads as the field's zero value everywhere, so a null
//! date drops one entry and a null week start drops one week instead of
//! rejecting the whole request.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::{EmailTimecardRequest, Entry, TimecardRequest};

/// The request body could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid request: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a timecard request body
pub fn decode_request(body: &[u8]) -> Result<TimecardRequest, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

/// Decode an email request body (a timecard plus message fields)
pub fn decode_email_request(body: &[u8]) -> Result<EmailTimecardRequest, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

/// `#[serde(deserialize_with)]` helper: `null` or a missing key → `T::default()`
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawEntry {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    job_code: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    hours: Option<f64>,
    #[serde(default)]
    overtime: Option<bool>,
    #[serde(default, rename = "isOvertime")]
    is_overtime_camel: Option<bool>,
    #[serde(default)]
    night_shift: Option<bool>,
    #[serde(default)]
    is_night_shift: Option<bool>,
    #[serde(default, rename = "isNightShift")]
    is_night_shift_camel: Option<bool>,
}

impl From<RawEntry> for Entry {
    fn from(raw: RawEntry) -> Self {
        let job_code = raw
            .job_code
            .filter(|code| !code.is_empty())
            .or(raw.code)
            .unwrap_or_default();

        Entry {
            date: raw.date.unwrap_or_default(),
            job_code,
            hours: raw.hours.unwrap_or(0.0),
            overtime: raw.overtime.or(raw.is_overtime_camel).unwrap_or(false),
            night_shift: raw
                .night_shift
                .or(raw.is_night_shift)
                .or(raw.is_night_shift_camel)
                .unwrap_or(false),
        }
    }
}
