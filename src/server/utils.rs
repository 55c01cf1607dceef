use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;

/// Format an [`OffsetDateTime`] in the canonical UTC display format.
pub fn format_datetime_utc(dt: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02} UTC",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute()
    )
}

/// Format a stored Unix timestamp; out-of-range values render as an empty string.
pub fn format_timestamp_utc(timestamp: i64) -> String {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .map(format_datetime_utc)
        .unwrap_or_default()
}

/// Canonical application server error response body.
pub fn server_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Unable to process your request. Please try again later.",
    )
        .into_response()
}

/// Generic rejection for forged or malformed submissions. Deliberately says nothing about
/// which check failed.
pub fn bad_request_response() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

/// Form body larger than [`MAX_FORM_BODY_BYTES`](super::constants::MAX_FORM_BODY_BYTES).
pub fn payload_too_large_response() -> Response {
    (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response()
}

/// Convenience for attaching a `Retry-After` header to rate-limited responses.
pub fn attach_retry_after(response: &mut Response, seconds: u64) {
    if let Ok(value) = HeaderValue::from_str(&seconds.max(1).to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
}
