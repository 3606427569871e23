//! Request validation at the transport boundary.
//!
//! The processor trusts its inputs; whatever feeds it requests is expected
//! to run them through [`validate_request`] first.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::TransactionRequest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transaction id must not be nil")]
    NilTransactionId,

    #[error("client id must not be nil")]
    NilClientId,

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("request time {request_time} is in the future (now {now})")]
    FutureRequestTime {
        request_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

/// Checks a movement request against `now`.
///
/// Ids must be non-nil, the amount strictly positive, and the client's
/// request time must not lie in the future. A request stamped exactly `now`
/// is accepted.
pub fn validate_request(
    request: &TransactionRequest,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if request.id.is_nil() {
        return Err(ValidationError::NilTransactionId);
    }
    if request.client_id.is_nil() {
        return Err(ValidationError::NilClientId);
    }
    if request.amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(request.amount));
    }
    if request.request_time > now {
        return Err(ValidationError::FutureRequestTime {
            request_time: request.request_time,
            now,
        });
    }
    Ok(())
}
