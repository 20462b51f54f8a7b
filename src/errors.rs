use std::{io, sync::PoisonError, time::SystemTimeError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RvError {
    #[error("Physical configuration item is missing.")]
    ErrPhysicalConfigItemMissing,
    #[error("Physical type is invalid.")]
    ErrPhysicalTypeInvalid,
    #[error("Physical backend prefix is invalid.")]
    ErrPhysicalBackendPrefixInvalid,
    #[error("Physical backend key is invalid.")]
    ErrPhysicalBackendKeyInvalid,
    #[error("Storage key sanity check failed.")]
    ErrStorageKeySanityCheckFailed,
    #[error("Router mount conflict.")]
    ErrRouterMountConflict,
    #[error("Router mount not found.")]
    ErrRouterMountNotFound,
    #[error("Request is invalid.")]
    ErrRequestInvalid,
    #[error("Request is not ready.")]
    ErrRequestNotReady,
    #[error("Request has no data.")]
    ErrRequestNoData,
    #[error("Request has no such data field.")]
    ErrRequestNoDataField,
    #[error("Request field is not found.")]
    ErrRequestFieldNotFound,
    #[error("Request field is invalid.")]
    ErrRequestFieldInvalid,
    #[error("Auth token is not found.")]
    ErrAuthTokenNotFound,
    #[error("Token store is not initialized.")]
    ErrTokenStoreUninitialized,
    #[error("Auth token id is already in use.")]
    ErrAuthTokenIdInUse,
    #[error("Lease is not found.")]
    ErrLeaseNotFound,
    #[error("Lease is not renewable.")]
    ErrLeaseNotRenewable,
    #[error("Logical backend path is not supported.")]
    ErrLogicalPathUnsupported,
    #[error("Logical backend operation is not supported.")]
    ErrLogicalOperationUnsupported,
    #[error("RwLock was poisoned.")]
    ErrRwLockPoison,
    #[error("{0}")]
    ErrResponse(String),
    #[error("Some IO error happened, {:?}", .source)]
    IO {
        #[from]
        source: io::Error,
    },
    #[error("Some serde error happened, {:?}", .source)]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("Some openssl error happened, {:?}", .source)]
    OpenSSL {
        #[from]
        source: openssl::error::ErrorStack,
    },
    #[error("Some regex error happened, {:?}", .source)]
    Regex {
        #[from]
        source: regex::Error,
    },
    #[error("Some duration parse error happened, {:?}", .source)]
    ParseDuration {
        #[from]
        source: humantime::DurationError,
    },
    #[error("Some system time error happened, {:?}", .source)]
    SystemTime {
        #[from]
        source: SystemTimeError,
    },
    #[error("Unknown error.")]
    ErrUnknown,
}

impl<T> From<PoisonError<T>> for RvError {
    fn from(_: PoisonError<T>) -> Self {
        RvError::ErrRwLockPoison
    }
}

impl PartialEq for RvError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RvError::ErrResponse(a), RvError::ErrResponse(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

/// Builds the `RvError::ErrResponse` that carries a request-shape
/// violation back to the client as the `error` field of the reply.
#[macro_export]
macro_rules! rv_error_response {
    ($msg:expr) => {
        $crate::errors::RvError::ErrResponse($msg.to_string())
    };
}
