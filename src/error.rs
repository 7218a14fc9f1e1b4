use anyhow::anyhow;
use reqwest::StatusCode;
use std::fmt;

/// Broad class of a server-side error code.
///
/// The Inventory API reports failures as string codes such as
/// `AUTH_UNAUTHORIZED` or `DATASET_INVALID`; they are folded into this closed
/// set so callers can `match` on the kind of failure instead of on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Auth,
    Dataset,
    Download,
    Export,
    Metadata,
    Search,
    Order,
    RateLimit,
    Unknown,
}

impl ErrorCategory {
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        // Rate limits first: DOWNLOAD_RATE_LIMIT would otherwise land in Download.
        if code == "RATE_LIMIT" || code.ends_with("_RATE_LIMIT") {
            return ErrorCategory::RateLimit;
        }
        if code.starts_with("AUTH_") {
            return ErrorCategory::Auth;
        }
        if code.starts_with("DATASET_") {
            return ErrorCategory::Dataset;
        }
        if code.starts_with("DOWNLOAD_")
            || code.starts_with("ITEM_BASKET_")
            || code == "PRODUCTS_EMPTY"
        {
            return ErrorCategory::Download;
        }
        if code.starts_with("EXPORT_") {
            return ErrorCategory::Export;
        }
        if code.starts_with("METADATA_") {
            return ErrorCategory::Metadata;
        }
        if code.starts_with("SEARCH_") {
            return ErrorCategory::Search;
        }
        if code.starts_with("ORDER_") || code == "INVALID_ORDER" || code.starts_with("SUBSCRIPTION_")
        {
            return ErrorCategory::Order;
        }
        ErrorCategory::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::Dataset => "dataset",
            ErrorCategory::Download => "download",
            ErrorCategory::Export => "export",
            ErrorCategory::Metadata => "metadata",
            ErrorCategory::Search => "search",
            ErrorCategory::Order => "order",
            ErrorCategory::RateLimit => "rate-limit",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the API in the response envelope (`errorCode` + `error`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("USGS API {category} error {code}: {message}")]
pub struct ApiError {
    pub category: ErrorCategory,
    /// Raw server code, e.g. `AUTH_UNAUTHORIZED`.
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            category: ErrorCategory::from_code(&code),
            code,
            message: message.into(),
        }
    }

    /// An invalid or expired API key was used.
    pub fn is_unauthorized(&self) -> bool {
        self.code.eq_ignore_ascii_case("AUTH_UNAUTHORIZED")
    }
}

/// Finds an [`ApiError`] anywhere in an `anyhow` chain.
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|e| e.downcast_ref::<ApiError>())
}

pub(crate) fn format_http_error(status: StatusCode, url: &str, body: &str) -> anyhow::Error {
    let body = body.trim();

    if status == StatusCode::NOT_FOUND {
        return anyhow!(
            "USGS API method not found (HTTP 404).\n- The endpoint URL may be wrong or the method is not offered by this API version\n- Default endpoint: {}\n\nrequest: {}\n{}",
            crate::config::DEFAULT_ENDPOINT,
            url,
            body
        );
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return anyhow!(
            "USGS API refused the request (HTTP {}).\n- Log in again to obtain a fresh API key (keys expire after one hour)\n- Make sure the account has machine-to-machine access\n\nrequest: {}\n{}",
            status.as_u16(),
            url,
            body
        );
    }

    anyhow!(
        "API request failed: HTTP {} for url ({})\n{}",
        status.as_u16(),
        url,
        body
    )
}
