use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse grouping of [`ErrorCode`] values, one per thousand-range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Request,
    Subscription,
    Quota,
    /// 9xxx and any range nothing is assigned to
    System,
}

impl ErrorCategory {
    pub fn of(code: u16) -> Self {
        match code / 1000 {
            0 => Self::Request,
            3 => Self::Subscription,
            4 => Self::Quota,
            _ => Self::System,
        }
    }
}

/// Numeric error code carried in every error body
///
/// Serialized as a bare number; SDKs and the dashboard match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    Unknown = 1,
    ValidationFailed = 2,
    NotFound = 3,
    InvalidRequest = 4,

    /// Tenant has no subscription row
    SubscriptionNotFound = 3001,
    /// Subscription points at a plan that is gone
    PlanNotFound = 3002,
    /// Disabled, or status is suspended / cancelled / expired
    SubscriptionSuspended = 3003,

    /// A meter reached its hard limit
    QuotaExceeded = 4001,
    UnknownMeter = 4002,

    InternalError = 9001,
    DatabaseError = 9002,
}

const ALL_CODES: [ErrorCode; 12] = [
    ErrorCode::Success,
    ErrorCode::Unknown,
    ErrorCode::ValidationFailed,
    ErrorCode::NotFound,
    ErrorCode::InvalidRequest,
    ErrorCode::SubscriptionNotFound,
    ErrorCode::PlanNotFound,
    ErrorCode::SubscriptionSuspended,
    ErrorCode::QuotaExceeded,
    ErrorCode::UnknownMeter,
    ErrorCode::InternalError,
    ErrorCode::DatabaseError,
];

impl ErrorCode {
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    pub fn category(self) -> ErrorCategory {
        ErrorCategory::of(self.code())
    }

    /// Message used when the caller does not supply one
    pub const fn message(self) -> &'static str {
        match self {
            Self::Success => "OK",
            Self::Unknown => "Unexpected error",
            Self::ValidationFailed => "Request validation failed",
            Self::NotFound => "Not found",
            Self::InvalidRequest => "Malformed request",
            Self::SubscriptionNotFound => "Tenant has no subscription",
            Self::PlanNotFound => "Subscription plan does not exist",
            Self::SubscriptionSuspended => "Subscription suspended. Please contact support.",
            Self::QuotaExceeded => "Quota exceeded",
            Self::UnknownMeter => "Unknown meter",
            Self::InternalError => "Internal error",
            Self::DatabaseError => "Storage unavailable",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,
            Self::ValidationFailed | Self::InvalidRequest | Self::UnknownMeter => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound | Self::SubscriptionNotFound | Self::PlanNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::SubscriptionSuspended => StatusCode::FORBIDDEN,
            Self::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::Unknown | Self::InternalError | Self::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.code(), f)
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unassigned error code {0}")]
pub struct InvalidErrorCode(pub u16);

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        ALL_CODES
            .into_iter()
            .find(|c| c.code() == value)
            .ok_or(InvalidErrorCode(value))
    }
}
