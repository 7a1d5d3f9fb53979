//! Error taxonomy for keychain operations.

use thiserror::Error;

use crate::status::{BackendError, SecStatus};
use crate::types::ProtectionLevel;

/// Result type for keychain operations.
pub type KeychainResult<T> = Result<T, KeychainError>;

/// Errors returned by [`crate::KeychainStore`] and [`crate::KeychainFactory`].
///
/// Authentication related kinds are meant to reach the UI verbatim. `Other`
/// wraps infrastructure failures, which should be shown as a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum KeychainError {
    /// The item key is empty.
    #[error("invalid_key")]
    InvalidKey,

    /// The store identifier was already requested with a different access group.
    #[error("invalid_access_group: {identifier}")]
    InvalidAccessGroup {
        /// Store identifier whose access group binding was violated.
        identifier: String,
    },

    /// An item already exists for the key and replacing was not requested.
    #[error("item_exists")]
    ItemExists,

    /// The backing keychain changed underneath the operation (another process
    /// or writer added or removed the item).
    #[error("changed_from_elsewhere")]
    ChangedFromElsewhere,

    /// The existing item is protected and cannot be updated in place; remove
    /// it first and add it again.
    #[error("remove_protected_item_first")]
    RemoveProtectedItemFirst,

    /// Biometric evaluation is not possible right now.
    #[error("biometry_not_available")]
    BiometryNotAvailable,

    /// A protected item was accessed without an authentication prompt.
    #[error("missing_authentication")]
    MissingAuthentication,

    /// The authentication prompt forbids user interaction.
    #[error("disabled_authentication")]
    DisabledAuthentication,

    /// The user dismissed the authentication prompt.
    #[error("user_cancel")]
    UserCancel,

    /// The user failed to authenticate.
    #[error("authentication_failed")]
    AuthenticationFailed,

    /// The store was invalidated by its factory; fetch a new one.
    #[error("instance_no_longer_valid")]
    InstanceNoLongerValid,

    /// Infrastructure or internal invariant failure.
    #[error("other: {failure}")]
    Other {
        /// What went wrong.
        failure: InternalFailure,
    },
}

/// Details carried by [`KeychainError::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Enum)]
pub enum InternalFailure {
    /// The backend reported a status without a dedicated error kind.
    #[error("backend status {status}")]
    Backend {
        /// The reported status.
        status: SecStatus,
    },

    /// The platform refused to create an access-control descriptor.
    #[error("could not create access control for {protection} ({code})")]
    AccessControlCreation {
        /// Requested protection.
        protection: ProtectionLevel,
        /// Raw status code returned by the platform, `0` if none was given.
        code: i32,
    },

    /// The prompt's reuse window exceeds the platform maximum.
    #[error("reuse duration {requested_ms}ms exceeds maximum {maximum_ms}ms")]
    ReuseDurationTooLong {
        /// Requested window in milliseconds.
        requested_ms: u64,
        /// Allowed maximum in milliseconds.
        maximum_ms: u64,
    },

    /// Two mutually exclusive query options were combined.
    #[error("conflicting query options: {first} and {second}")]
    ConflictingQueryOptions {
        /// First option set on the query.
        first: String,
        /// Option that conflicts with it.
        second: String,
    },

    /// A data query succeeded but returned no payload.
    #[error("backend returned no payload")]
    MissingPayload,

    /// A host callback failed outside the keychain API.
    #[error("callback failed: {reason}")]
    Callback {
        /// Description of the failure.
        reason: String,
    },
}

impl From<InternalFailure> for KeychainError {
    fn from(failure: InternalFailure) -> Self {
        Self::Other { failure }
    }
}

/// Backend call being translated; decides how ambiguous statuses are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackendCall {
    Query,
    Insert,
    Update,
    Delete,
}

impl KeychainError {
    /// Translates a backend failure observed during `call`.
    ///
    /// A duplicate during insert and a missing item during update mean the
    /// item changed after it was looked up under the store lock.
    pub(crate) fn from_backend(error: BackendError, call: BackendCall) -> Self {
        let status = match error {
            BackendError::Status { code } => SecStatus::from_code(code),
            BackendError::Callback { reason } => {
                log::warn!("keychain backend callback failed during {call:?}: {reason}");
                return InternalFailure::Callback { reason }.into();
            }
        };

        let translated = match (status, call) {
            (SecStatus::DuplicateItem, BackendCall::Insert)
            | (SecStatus::ItemNotFound, BackendCall::Update) => Self::ChangedFromElsewhere,
            (SecStatus::DuplicateItem, _) => Self::ItemExists,
            (SecStatus::UserCanceled, _) => Self::UserCancel,
            (SecStatus::AuthFailed, _) => Self::AuthenticationFailed,
            (SecStatus::InteractionNotAllowed, _) => Self::DisabledAuthentication,
            (SecStatus::InteractionRequired, _) => Self::MissingAuthentication,
            (status, _) => InternalFailure::Backend { status }.into(),
        };

        if let Self::Other { failure } = &translated {
            log::warn!("keychain {call:?} failed: {failure}");
        }
        translated
    }

    /// Whether the error comes from user authentication rather than from the
    /// caller or the infrastructure.
    #[must_use]
    pub const fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::BiometryNotAvailable
                | Self::MissingAuthentication
                | Self::DisabledAuthentication
                | Self::UserCancel
                | Self::AuthenticationFailed
        )
    }
}
