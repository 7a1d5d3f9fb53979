//! Backend status codes.
//!
//! The platform keychain reports failures as `OSStatus` integers. Backends
//! hand the raw code back through [`BackendError::Status`]; the store maps it
//! onto [`SecStatus`] and from there onto the domain error taxonomy
//! ([`crate::KeychainError`]).

use strum::IntoStaticStr;
use thiserror::Error;

/// Failure reported by a [`crate::platform::KeychainBackend`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum BackendError {
    /// The platform returned a non-success status code.
    #[error("backend status {code}")]
    Status {
        /// Raw `OSStatus` value.
        code: i32,
    },

    /// The foreign implementation failed outside the keychain API.
    #[error("backend callback failed: {reason}")]
    Callback {
        /// Description of the failure.
        reason: String,
    },
}

impl BackendError {
    /// Builds a status error from a known status.
    #[must_use]
    pub const fn status(status: SecStatus) -> Self {
        Self::Status {
            code: status.code(),
        }
    }

    /// Status carried by this error, if it is a status error.
    #[must_use]
    pub const fn sec_status(&self) -> Option<SecStatus> {
        match self {
            Self::Status { code } => Some(SecStatus::from_code(*code)),
            Self::Callback { .. } => None,
        }
    }
}

impl From<SecStatus> for BackendError {
    fn from(status: SecStatus) -> Self {
        Self::status(status)
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for BackendError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Callback {
            reason: error.reason,
        }
    }
}

/// Enumerated keychain status space.
///
/// Codes without a dedicated variant are preserved in
/// [`SecStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum SecStatus {
    /// `errSecDuplicateItem`
    DuplicateItem,
    /// `errSecItemNotFound`
    ItemNotFound,
    /// `errSecInteractionNotAllowed`
    InteractionNotAllowed,
    /// `errSecInteractionRequired`
    InteractionRequired,
    /// `errSecUserCanceled`
    UserCanceled,
    /// `errSecAuthFailed`
    AuthFailed,
    /// `errSecDiskFull`
    DiskFull,
    /// `errSecIO`
    Io,
    /// `errSecParam`
    Param,
    /// `errSecWrPerm`
    Permission,
    /// `errSecAllocate`
    Allocate,
    /// `errSecBadReq`
    BadRequest,
    /// `errSecMissingEntitlement`
    MissingEntitlement,
    /// `errSecRestrictedAPI`
    RestrictedApi,
    /// `errSecNotAvailable`
    NotAvailable,
    /// `errSecReadOnly`
    ReadOnly,
    /// `errSecBufferTooSmall`
    BufferTooSmall,
    /// `errSecDataTooLarge`
    DataTooLarge,
    /// `errSecNoSuchAttr`
    NoSuchAttribute,
    /// `errSecNoSuchClass`
    NoSuchClass,
    /// `errSecNoDefaultKeychain`
    NoDefaultKeychain,
    /// `errSecDataNotAvailable`
    DataNotAvailable,
    /// `errSecDataNotModifiable`
    DataNotModifiable,
    /// `errSecNoAccessForItem`
    NoAccessForItem,
    /// `errSecDecode`
    DecodeFailure,
    /// `errSecUnimplemented`
    Unimplemented,
    /// Any other status code.
    Unknown {
        /// Raw `OSStatus` value.
        code: i32,
    },
}

impl SecStatus {
    /// Maps a raw `OSStatus` onto the status space.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -25299 => Self::DuplicateItem,
            -25300 => Self::ItemNotFound,
            -25308 => Self::InteractionNotAllowed,
            -25315 => Self::InteractionRequired,
            -128 => Self::UserCanceled,
            -25293 => Self::AuthFailed,
            -34 => Self::DiskFull,
            -36 => Self::Io,
            -50 => Self::Param,
            -61 => Self::Permission,
            -108 => Self::Allocate,
            -909 => Self::BadRequest,
            -34018 => Self::MissingEntitlement,
            -34020 => Self::RestrictedApi,
            -25291 => Self::NotAvailable,
            -25292 => Self::ReadOnly,
            -25301 => Self::BufferTooSmall,
            -25302 => Self::DataTooLarge,
            -25303 => Self::NoSuchAttribute,
            -25306 => Self::NoSuchClass,
            -25307 => Self::NoDefaultKeychain,
            -25316 => Self::DataNotAvailable,
            -25317 => Self::DataNotModifiable,
            -25243 => Self::NoAccessForItem,
            -26275 => Self::DecodeFailure,
            -4 => Self::Unimplemented,
            code => Self::Unknown { code },
        }
    }

    /// Raw `OSStatus` value of this status.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::DuplicateItem => -25299,
            Self::ItemNotFound => -25300,
            Self::InteractionNotAllowed => -25308,
            Self::InteractionRequired => -25315,
            Self::UserCanceled => -128,
            Self::AuthFailed => -25293,
            Self::DiskFull => -34,
            Self::Io => -36,
            Self::Param => -50,
            Self::Permission => -61,
            Self::Allocate => -108,
            Self::BadRequest => -909,
            Self::MissingEntitlement => -34018,
            Self::RestrictedApi => -34020,
            Self::NotAvailable => -25291,
            Self::ReadOnly => -25292,
            Self::BufferTooSmall => -25301,
            Self::DataTooLarge => -25302,
            Self::NoSuchAttribute => -25303,
            Self::NoSuchClass => -25306,
            Self::NoDefaultKeychain => -25307,
            Self::DataNotAvailable => -25316,
            Self::DataNotModifiable => -25317,
            Self::NoAccessForItem => -25243,
            Self::DecodeFailure => -26275,
            Self::Unimplemented => -4,
            Self::Unknown { code } => code,
        }
    }

    /// Short snake-case name, used in logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for SecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
