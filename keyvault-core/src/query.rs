//! Keychain query assembly.
//!
//! Every backend call receives a [`KeychainQuery`] put together by a
//! [`QueryBuilder`]. The builder owns the rules the platform expects callers
//! to follow:
//!
//! - Item queries need a non-empty key; namespace queries (remove all) have
//!   none.
//! - Returning the stored payload and attaching a payload to write are
//!   mutually exclusive, and so are forbidding UI and attaching a prompt.
//! - Protected writes carry an access-control descriptor created by the
//!   platform. If the platform refuses to create one the query is not built;
//!   the item is never written without its protection.
//! - The access-group clause is only emitted when the execution context
//!   supports it (see [`crate::ExecutionContext`]).

use crate::error::{InternalFailure, KeychainError, KeychainResult};
use crate::platform::KeychainBackend;
use crate::status::BackendError;
use crate::types::{AccessControl, AuthenticationPrompt, ProtectionLevel};

/// A fully assembled request for the keychain backend.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct KeychainQuery {
    /// Store identifier (`kSecAttrService`).
    pub service: String,
    /// Access group (`kSecAttrAccessGroup`); `None` leaves the group unscoped.
    pub access_group: Option<String>,
    /// Item key (`kSecAttrAccount`); `None` addresses every item of the service.
    pub account: Option<String>,
    /// Payload to write (`kSecValueData`).
    pub payload: Option<Vec<u8>>,
    /// Whether the stored payload should be returned (`kSecReturnData`).
    pub return_data: bool,
    /// Access control attached to a write (`kSecAttrAccessControl`).
    pub access_control: Option<AccessControl>,
    /// Prompt to present when reading a protected item.
    pub prompt: Option<AuthenticationPrompt>,
    /// `false` makes the backend fail instead of presenting authentication UI.
    pub interaction_allowed: bool,
}

/// Attributes replaced by an update.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct KeychainChanges {
    /// New payload.
    pub payload: Vec<u8>,
    /// Access control to apply; `None` stores the item unprotected.
    pub access_control: Option<AccessControl>,
}

/// Item returned by a backend query.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct KeychainRecord {
    /// Stored payload; only present when the query asked for it.
    pub payload: Option<Vec<u8>>,
    /// Protection the item was written with.
    pub protection: ProtectionLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Item,
    Namespace,
}

/// Assembles [`KeychainQuery`] values.
///
/// ```
/// use keyvault_core::query::QueryBuilder;
/// use keyvault_core::platform::memory::MemoryKeychain;
///
/// let backend = MemoryKeychain::new();
/// let query = QueryBuilder::item("wallet", None)
///     .key("seed")
///     .return_data()
///     .forbid_interaction()
///     .build(&backend)
///     .unwrap();
/// assert_eq!(query.account.as_deref(), Some("seed"));
/// assert!(!query.interaction_allowed);
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    scope: Scope,
    service: String,
    access_group: Option<String>,
    scope_access_group: bool,
    key: Option<String>,
    payload: Option<Vec<u8>>,
    return_data: bool,
    protection: Option<ProtectionLevel>,
    prompt: Option<AuthenticationPrompt>,
    forbid_interaction: bool,
}

impl QueryBuilder {
    fn new(scope: Scope, service: &str, access_group: Option<&str>) -> Self {
        Self {
            scope,
            service: service.to_owned(),
            access_group: access_group.map(str::to_owned),
            scope_access_group: true,
            key: None,
            payload: None,
            return_data: false,
            protection: None,
            prompt: None,
            forbid_interaction: false,
        }
    }

    /// Starts a query addressing a single item; a key must be set.
    #[must_use]
    pub fn item(service: &str, access_group: Option<&str>) -> Self {
        Self::new(Scope::Item, service, access_group)
    }

    /// Starts a query addressing every item of the store.
    #[must_use]
    pub fn namespace(service: &str, access_group: Option<&str>) -> Self {
        Self::new(Scope::Namespace, service, access_group)
    }

    /// Whether the configured access group is emitted. Disabled in execution
    /// contexts that reject group-scoped queries.
    #[must_use]
    pub fn scope_access_group(mut self, enabled: bool) -> Self {
        self.scope_access_group = enabled;
        self
    }

    /// Sets the item key.
    #[must_use]
    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_owned());
        self
    }

    /// Attaches a payload to write.
    #[must_use]
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Asks the backend to return the stored payload.
    #[must_use]
    pub fn return_data(mut self) -> Self {
        self.return_data = true;
        self
    }

    /// Sets the protection to write the item with.
    #[must_use]
    pub fn protection(mut self, protection: ProtectionLevel) -> Self {
        self.protection = Some(protection);
        self
    }

    /// Attaches the prompt presented when a protected item is read.
    #[must_use]
    pub fn prompt(mut self, prompt: AuthenticationPrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Makes the backend fail rather than present any authentication UI.
    #[must_use]
    pub fn forbid_interaction(mut self) -> Self {
        self.forbid_interaction = true;
        self
    }

    /// Builds the query, creating the access-control descriptor through
    /// `backend` when a protection other than `None` was requested.
    ///
    /// # Errors
    ///
    /// - [`KeychainError::InvalidKey`] if an item query has no or an empty key.
    /// - [`KeychainError::Other`] if mutually exclusive options were combined
    ///   or the platform refused to create the access-control descriptor.
    pub fn build(self, backend: &dyn KeychainBackend) -> KeychainResult<KeychainQuery> {
        let account = match (self.scope, self.key) {
            (Scope::Item, Some(key)) if !key.is_empty() => Some(key),
            (Scope::Item, _) => return Err(KeychainError::InvalidKey),
            (Scope::Namespace, None) => None,
            (Scope::Namespace, Some(_)) => {
                return Err(conflict("namespace scope", "key"));
            }
        };

        if self.return_data && self.payload.is_some() {
            return Err(conflict("return_data", "payload"));
        }
        if self.forbid_interaction && self.prompt.is_some() {
            return Err(conflict("forbid_interaction", "prompt"));
        }

        let access_control = match self.protection {
            Some(protection) => access_control(backend, protection)?,
            None => None,
        };

        let access_group = if self.scope_access_group {
            self.access_group
        } else {
            None
        };

        Ok(KeychainQuery {
            service: self.service,
            access_group,
            account,
            payload: self.payload,
            return_data: self.return_data,
            access_control,
            prompt: self.prompt,
            interaction_allowed: !self.forbid_interaction,
        })
    }
}

/// Creates the access-control descriptor for `protection`.
///
/// [`ProtectionLevel::None`] needs no descriptor and never reaches the
/// platform.
///
/// # Errors
///
/// Returns [`InternalFailure::AccessControlCreation`] if the platform refuses.
pub fn access_control(
    backend: &dyn KeychainBackend,
    protection: ProtectionLevel,
) -> KeychainResult<Option<AccessControl>> {
    if !protection.requires_authentication() {
        return Ok(None);
    }
    backend
        .create_access_control(protection)
        .map(Some)
        .map_err(|error| {
            log::warn!("access control creation for {protection} failed: {error}");
            let code = match error {
                BackendError::Status { code } => code,
                BackendError::Callback { .. } => 0,
            };
            InternalFailure::AccessControlCreation { protection, code }.into()
        })
}

fn conflict(first: &str, second: &str) -> KeychainError {
    InternalFailure::ConflictingQueryOptions {
        first: first.to_owned(),
        second: second.to_owned(),
    }
    .into()
}
