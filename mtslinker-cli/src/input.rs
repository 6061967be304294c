use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

static RECORD_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"record-new/(\d+)(?:/record-file/(\d+))?").unwrap());

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

/// Session and recording IDs named by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingTarget {
    pub session_id: String,
    /// Empty selects the whole session
    pub recording_id: String,
}

/// Resolve the positional argument and `--record-id` into a target.
///
/// A recording ID embedded in the URL wins over `--record-id`.
pub fn parse_target(input: &str, record_id: Option<&str>) -> Result<RecordingTarget, AppError> {
    let input = input.trim();
    let record_id = record_id.map(str::trim).unwrap_or_default();

    if let Some(caps) = RECORD_URL.captures(input) {
        let session_id = caps[1].to_string();
        let recording_id = caps
            .get(2)
            .map_or(record_id, |m| m.as_str())
            .to_string();
        return Ok(RecordingTarget {
            session_id,
            recording_id,
        });
    }

    if BARE_ID.is_match(input) {
        return Ok(RecordingTarget {
            session_id: input.to_string(),
            recording_id: record_id.to_string(),
        });
    }

    Err(AppError::InvalidInput(format!(
        "expected a webinar URL containing `record-new/<session>` or a numeric session ID, got `{input}`"
    )))
}
