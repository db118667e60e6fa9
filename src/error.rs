//! Errors raised by [`VaultClient`](crate::client::VaultClient).

use thiserror::Error;

/// A failed exchange with the vault server.
///
/// Every status outside 2xx is reported the same way; 401 and 404 get no
/// special treatment.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault request failed: {status} {reason}")]
    RequestFailed { status: u16, reason: String },

    #[error("vault unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected vault response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl VaultError {
    /// HTTP status for [`VaultError::RequestFailed`], `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            VaultError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;
