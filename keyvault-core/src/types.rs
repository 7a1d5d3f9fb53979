//! Value types shared by the keychain store, the query builder and the
//! platform backend.

use std::time::Duration;

use strum::{Display, EnumIter};

/// Longest authentication reuse window the platform accepts.
///
/// Matches `LATouchIDAuthenticationMaximumAllowableReuseDuration`.
pub const MAX_AUTHENTICATION_REUSE_DURATION: Duration = Duration::from_secs(300);

/// Authentication requirement attached to an item when it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum ProtectionLevel {
    /// No authentication. Reading and writing never evaluate biometry.
    #[default]
    None,
    /// Only the biometric set enrolled when the item was written unlocks it.
    /// Enrolling or removing a finger or face makes the item unreadable.
    CurrentBiometricSet,
    /// Any enrolled biometric unlocks the item.
    AnyBiometricSet,
    /// Any enrolled biometric, or the device passcode as a fallback.
    AnyBiometricSetOrPasscode,
}

impl ProtectionLevel {
    /// Whether reading an item with this protection needs user authentication.
    #[must_use]
    pub const fn requires_authentication(self) -> bool {
        !matches!(self, Self::None)
    }

    /// `SecAccessControlCreateFlags` bits describing this protection.
    ///
    /// Returns `0` for [`ProtectionLevel::None`], which is stored without an
    /// access-control object.
    #[must_use]
    pub const fn access_control_flags(self) -> u64 {
        match self {
            Self::None => 0,
            Self::CurrentBiometricSet => access_control_flags::BIOMETRY_CURRENT_SET,
            Self::AnyBiometricSet => access_control_flags::BIOMETRY_ANY,
            Self::AnyBiometricSetOrPasscode => {
                access_control_flags::BIOMETRY_ANY
                    | access_control_flags::OR
                    | access_control_flags::DEVICE_PASSCODE
            }
        }
    }
}

/// `SecAccessControlCreateFlags` values used by [`ProtectionLevel`].
pub mod access_control_flags {
    /// `kSecAccessControlBiometryAny`
    pub const BIOMETRY_ANY: u64 = 1 << 1;
    /// `kSecAccessControlBiometryCurrentSet`
    pub const BIOMETRY_CURRENT_SET: u64 = 1 << 3;
    /// `kSecAccessControlDevicePasscode`
    pub const DEVICE_PASSCODE: u64 = 1 << 4;
    /// `kSecAccessControlOr`
    pub const OR: u64 = 1 << 14;
}

/// Access-control descriptor created by the platform for a protected write.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct AccessControl {
    /// Protection the descriptor enforces.
    pub protection: ProtectionLevel,
    /// `SecAccessControlCreateFlags` bits the descriptor was created with.
    pub flags: u64,
}

impl AccessControl {
    /// Describes the access control a platform creates for `protection`.
    #[must_use]
    pub const fn for_protection(protection: ProtectionLevel) -> Self {
        Self {
            protection,
            flags: protection.access_control_flags(),
        }
    }
}

/// User-facing authentication request attached to a protected read.
///
/// The platform context that actually presents the prompt stays on the host
/// side; it is referenced through `context_handle` and only two of its
/// properties are interpreted here: the reuse window and whether it may
/// interact with the user.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct AuthenticationPrompt {
    /// Localized reason displayed in the system prompt.
    pub reason: String,
    /// How long a successful authentication may be reused without prompting
    /// again. Must not exceed the configured maximum.
    pub reuse_duration: Duration,
    /// `false` when the platform context forbids presenting UI.
    pub interaction_allowed: bool,
    /// Opaque handle to the host's authentication context, passed back to the
    /// backend untouched.
    pub context_handle: Option<u64>,
}

impl AuthenticationPrompt {
    /// Creates an interactive prompt with no reuse window.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            reuse_duration: Duration::ZERO,
            interaction_allowed: true,
            context_handle: None,
        }
    }

    /// Sets the authentication reuse window.
    #[must_use]
    pub fn with_reuse_duration(mut self, reuse_duration: Duration) -> Self {
        self.reuse_duration = reuse_duration;
        self
    }

    /// Marks the prompt as coming from a context that forbids interaction.
    #[must_use]
    pub fn without_interaction(mut self) -> Self {
        self.interaction_allowed = false;
        self
    }
}
