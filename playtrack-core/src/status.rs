use std::time::Duration;

use reqwest::{Client, StatusCode};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Coarse buckets for non-2xx responses shared by both API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    /// 403: private or inaccessible data. Retrying will not help.
    Forbidden,
    RateLimit,
    Transient,
    Permanent,
}

pub(crate) fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if status == StatusCode::FORBIDDEN {
        ApiErrorClass::Forbidden
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

pub(crate) fn build_http(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}
