use chrono::{DateTime, Utc};

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Renders a unix timestamp as RFC 3339, falling back to the raw number when it
/// is out of chrono's range.
pub fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

pub fn format_optional_timestamp(secs: Option<i64>) -> String {
    secs.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}
