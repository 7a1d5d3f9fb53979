//! Biometric capability queries.
//!
//! The host evaluates biometric policies (`LAContext.canEvaluatePolicy` on
//! Apple platforms) through [`BiometryEvaluator`]. The store never talks to the
//! evaluator directly; it asks a [`BiometryOracle`], which folds every
//! evaluator failure into a [`BiometryStatus`] and never fails itself.
//!
//! Two oracles are provided:
//!
//! - [`EvaluatorOracle`]: backed by a host evaluator (iOS, macOS).
//! - [`UnsupportedBiometry`]: always reports `(none, not_supported)`, for
//!   platforms without biometry (watchOS, tvOS).
//!
//! Biometric state is read fresh on every call. Enrollment and lockout can
//! change between two operations, so nothing is cached.

use std::sync::Arc;

use thiserror::Error;

/// Kind of biometric sensor available on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum BiometryType {
    /// No biometric sensor.
    None,
    /// Fingerprint sensor (Touch ID).
    Fingerprint,
    /// Face recognition (Face ID).
    Face,
}

/// Whether biometric authentication can currently be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum BiometryStatus {
    /// The device has no biometric hardware.
    NotSupported,
    /// Biometry exists but cannot be evaluated right now, for an unknown or
    /// transient reason.
    NotAvailable,
    /// No biometric identity is enrolled.
    NotEnrolled,
    /// Too many failed attempts; the passcode is required to unlock biometry.
    Lockout,
    /// Biometric authentication can be evaluated.
    Available,
}

/// `LAError` codes the status mapping understands.
mod la_error {
    pub const BIOMETRY_NOT_AVAILABLE: i64 = -6;
    pub const BIOMETRY_NOT_ENROLLED: i64 = -7;
    pub const BIOMETRY_LOCKOUT: i64 = -8;
}

impl BiometryStatus {
    /// Maps a failed policy evaluation onto a status.
    #[must_use]
    pub const fn from_policy_error(code: i64, biometry_type: BiometryType) -> Self {
        match code {
            la_error::BIOMETRY_NOT_ENROLLED => Self::NotEnrolled,
            la_error::BIOMETRY_LOCKOUT => Self::Lockout,
            la_error::BIOMETRY_NOT_AVAILABLE if matches!(biometry_type, BiometryType::None) => {
                Self::NotSupported
            }
            _ => Self::NotAvailable,
        }
    }
}

/// Snapshot of the device's biometric capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct BiometryInfo {
    /// Sensor kind.
    pub biometry_type: BiometryType,
    /// Current availability.
    pub status: BiometryStatus,
}

impl BiometryInfo {
    /// Reported when biometry cannot be evaluated at all.
    pub const UNSUPPORTED: Self = Self {
        biometry_type: BiometryType::None,
        status: BiometryStatus::NotSupported,
    };

    /// Whether biometric authentication can be evaluated right now.
    #[must_use]
    pub const fn can_authenticate(&self) -> bool {
        matches!(self.status, BiometryStatus::Available)
    }
}

/// Returns whether biometric authentication can be evaluated for `info`.
#[uniffi::export]
#[must_use]
pub fn biometry_can_authenticate(info: BiometryInfo) -> bool {
    info.can_authenticate()
}

/// Failure reported by a [`BiometryEvaluator`].
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum BiometryError {
    /// The policy cannot be evaluated; carries the platform `LAError` code.
    #[error("policy evaluation failed with code {code}")]
    Policy {
        /// Raw `LAError` code.
        code: i64,
    },

    /// The platform offers no biometric policy evaluation at all.
    #[error("biometric evaluation unsupported")]
    Unsupported,

    /// The foreign implementation failed.
    #[error("biometry callback failed: {reason}")]
    Callback {
        /// Description of the failure.
        reason: String,
    },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for BiometryError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Callback {
            reason: error.reason,
        }
    }
}

/// Host-side biometric policy evaluation.
///
/// On Apple platforms this wraps a fresh `LAContext` per call:
///
/// ```swift
/// final class LocalAuthenticationEvaluator: BiometryEvaluator {
///     func canEvaluatePolicy() throws {
///         var error: NSError?
///         guard LAContext().canEvaluatePolicy(.deviceOwnerAuthenticationWithBiometrics, error: &error) else {
///             throw BiometryError.Policy(code: Int64(error?.code ?? 0))
///         }
///     }
///     // ...
/// }
/// ```
#[uniffi::export(with_foreign)]
pub trait BiometryEvaluator: Send + Sync {
    /// Sensor kind reported by the platform.
    fn biometry_type(&self) -> BiometryType;

    /// Checks whether the biometric policy can be evaluated right now.
    ///
    /// # Errors
    ///
    /// Returns the platform's evaluation error when it cannot.
    fn can_evaluate_policy(&self) -> Result<(), BiometryError>;
}

/// Source of [`BiometryInfo`] consulted before every protected operation.
pub trait BiometryOracle: Send + Sync {
    /// Current biometric capability. Never fails; platforms unable to answer
    /// report [`BiometryInfo::UNSUPPORTED`].
    fn current_biometry_info(&self) -> BiometryInfo;
}

/// Oracle backed by a host [`BiometryEvaluator`].
pub struct EvaluatorOracle {
    evaluator: Arc<dyn BiometryEvaluator>,
}

impl EvaluatorOracle {
    /// Wraps a host evaluator.
    #[must_use]
    pub fn new(evaluator: Arc<dyn BiometryEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl BiometryOracle for EvaluatorOracle {
    fn current_biometry_info(&self) -> BiometryInfo {
        // The sensor kind is only reliable once a policy evaluation ran.
        let evaluation = self.evaluator.can_evaluate_policy();
        let biometry_type = self.evaluator.biometry_type();

        let status = match evaluation {
            Ok(()) if biometry_type == BiometryType::None => BiometryStatus::NotSupported,
            Ok(()) => BiometryStatus::Available,
            Err(BiometryError::Policy { code }) => {
                BiometryStatus::from_policy_error(code, biometry_type)
            }
            Err(error @ (BiometryError::Unsupported | BiometryError::Callback { .. })) => {
                log::debug!("biometry cannot be evaluated: {error}");
                return BiometryInfo::UNSUPPORTED;
            }
        };

        BiometryInfo {
            biometry_type,
            status,
        }
    }
}

/// Oracle for platforms without biometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBiometry;

impl BiometryOracle for UnsupportedBiometry {
    fn current_biometry_info(&self) -> BiometryInfo {
        BiometryInfo::UNSUPPORTED
    }
}
