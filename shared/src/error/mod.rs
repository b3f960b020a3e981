//! Error codes and the wire error shared by every tenant-meter surface
//!
//! Codes are grouped in ranges so SDKs can branch on the range alone:
//!
//! | Range | Group        | Typical status |
//! |-------|--------------|----------------|
//! | 0xxx  | request      | 400 / 404      |
//! | 3xxx  | subscription | 403 / 404      |
//! | 4xxx  | quota        | 429 / 400      |
//! | 9xxx  | system       | 500            |
//!
//! ```
//! use shared::error::{AppError, ErrorBody, ErrorCode};
//!
//! let err = AppError::with_message(ErrorCode::QuotaExceeded, "Quota exceeded: 10/10 devices")
//!     .with_detail("meter", "devices")
//!     .with_retry_after(3600);
//!
//! assert_eq!(ErrorBody::from(&err).code, 4001);
//! ```

mod app_error;
mod codes;

pub use app_error::{AppError, ErrorBody};
pub use codes::{ErrorCategory, ErrorCode, InvalidErrorCode};
