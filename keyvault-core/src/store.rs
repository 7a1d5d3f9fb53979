//! Synchronized keychain store.
//!
//! A [`KeychainStore`] addresses one keychain namespace (service identifier
//! plus optional access group) and exposes create/read/update/delete over the
//! items in it. Every public operation holds the store's recursive lock for
//! its whole duration, so operations on one store never interleave. Compound
//! operations re-enter the lock (`set` consults `contains_data`).
//!
//! # Item state machine
//!
//! Per key an item is either absent or present with a protection level:
//!
//! ```text
//!            set (add)                     set(replace) with stored protection None
//!   absent ───────────────► present(P) ───────────────────────────────────────► present(P')
//!     ▲                          │
//!     └──── remove / remove_all ─┘
//! ```
//!
//! A present item whose stored protection is not `None` cannot be updated in
//! place; it has to be removed and added again
//! ([`KeychainError::RemoveProtectedItemFirst`]).
//!
//! # Invalidation
//!
//! Stores are handed out by [`crate::KeychainFactory`]. Once the factory
//! invalidates a store, every operation on it fails with
//! [`KeychainError::InstanceNoLongerValid`]; callers fetch a fresh store from
//! the factory.

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use crate::biometry::BiometryOracle;
use crate::config::FactoryConfig;
use crate::error::{BackendCall, InternalFailure, KeychainError, KeychainResult};
use crate::lock::RecursiveLock;
use crate::platform::KeychainBackend;
use crate::query::{access_control, KeychainChanges, QueryBuilder};
use crate::status::SecStatus;
use crate::types::{AuthenticationPrompt, ProtectionLevel};

struct StoreState {
    valid: Cell<bool>,
}

/// What a no-UI attribute lookup learned about an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredItem {
    Absent,
    Unprotected,
    /// Reading it needs authentication. The exact level is not always
    /// reported: the platform may refuse the lookup itself for such items.
    Protected,
}

/// Keychain namespace with synchronized, biometry-aware item access.
#[derive(uniffi::Object)]
pub struct KeychainStore {
    identifier: String,
    access_group: Option<String>,
    scope_access_group: bool,
    max_reuse_duration: Duration,
    backend: Arc<dyn KeychainBackend>,
    oracle: Arc<dyn BiometryOracle>,
    state: RecursiveLock<StoreState>,
}

impl std::fmt::Debug for KeychainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainStore")
            .field("identifier", &self.identifier)
            .field("access_group", &self.access_group)
            .finish_non_exhaustive()
    }
}

#[uniffi::export]
impl KeychainStore {
    /// Store identifier this instance addresses.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.identifier.clone()
    }

    /// Access group the store was created with.
    #[must_use]
    pub fn access_group(&self) -> Option<String> {
        self.access_group.clone()
    }

    /// `false` once the owning factory invalidated this instance.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.synchronized(|state| state.valid.get())
    }

    /// Whether an item exists for `key`.
    ///
    /// Never presents authentication UI, also for protected items. Statuses
    /// that only mean "cannot tell without prompting" resolve to `false`.
    ///
    /// # Errors
    ///
    /// [`KeychainError::InvalidKey`], [`KeychainError::InstanceNoLongerValid`],
    /// or [`KeychainError::Other`] for infrastructure failures.
    pub fn contains_data(&self, key: &str) -> KeychainResult<bool> {
        self.synchronized("contains_data", || {
            validate_key(key)?;
            let query = self
                .item_query(key)
                .forbid_interaction()
                .build(self.backend.as_ref())?;

            match self.backend.query(query) {
                Ok(_) => Ok(true),
                Err(error) => match error.sec_status() {
                    Some(
                        SecStatus::ItemNotFound
                        | SecStatus::Unimplemented
                        | SecStatus::UserCanceled
                        | SecStatus::NotAvailable
                        | SecStatus::AuthFailed,
                    ) => Ok(false),
                    // Only an existing protected item asks for interaction.
                    Some(SecStatus::InteractionNotAllowed | SecStatus::InteractionRequired) => {
                        Ok(true)
                    }
                    _ => Err(KeychainError::from_backend(error, BackendCall::Query)),
                },
            }
        })
    }

    /// Reads the payload stored for `key`, or `None` if there is no item.
    ///
    /// Protected items require biometry to be available and an interactive
    /// `prompt`; the call blocks while the platform presents it.
    ///
    /// # Errors
    ///
    /// - [`KeychainError::BiometryNotAvailable`] if the item is protected and
    ///   biometry cannot be evaluated.
    /// - [`KeychainError::MissingAuthentication`] if the item is protected and
    ///   no prompt was given.
    /// - [`KeychainError::DisabledAuthentication`] if the prompt forbids
    ///   interaction.
    /// - [`KeychainError::UserCancel`] / [`KeychainError::AuthenticationFailed`]
    ///   as reported by the prompt.
    /// - [`KeychainError::Other`] if the prompt's reuse window is too long
    ///   (checked before the keychain is touched) or the backend fails.
    pub fn data(
        &self,
        key: &str,
        prompt: Option<AuthenticationPrompt>,
    ) -> KeychainResult<Option<Vec<u8>>> {
        self.synchronized("data", || {
            validate_key(key)?;
            if let Some(prompt) = &prompt {
                self.check_reuse_duration(prompt)?;
            }

            let builder = self.item_query(key).return_data();
            let builder = match self.stored_item(key)? {
                StoredItem::Absent => return Ok(None),
                StoredItem::Unprotected => builder.forbid_interaction(),
                StoredItem::Protected => {
                    self.ensure_biometry()?;
                    let prompt = prompt.ok_or(KeychainError::MissingAuthentication)?;
                    if !prompt.interaction_allowed {
                        return Err(KeychainError::DisabledAuthentication);
                    }
                    builder.prompt(prompt)
                }
            };
            let query = builder.build(self.backend.as_ref())?;

            match self.backend.query(query) {
                Ok(record) => {
                    let payload = record.payload.ok_or(InternalFailure::MissingPayload)?;
                    log::debug!(
                        "read {} bytes for '{key}' from '{}'",
                        payload.len(),
                        self.identifier
                    );
                    Ok(Some(payload))
                }
                Err(error) if error.sec_status() == Some(SecStatus::ItemNotFound) => Ok(None),
                Err(error) => Err(KeychainError::from_backend(error, BackendCall::Query)),
            }
        })
    }

    /// Returns the payload stored for `key`; if there is none, stores `value`
    /// with `protection` and returns it.
    ///
    /// # Errors
    ///
    /// Any error of [`KeychainStore::data`] or [`KeychainStore::set`].
    pub fn data_or_set(
        &self,
        key: &str,
        value: Vec<u8>,
        protection: ProtectionLevel,
        prompt: Option<AuthenticationPrompt>,
    ) -> KeychainResult<Vec<u8>> {
        self.synchronized("data_or_set", || {
            if let Some(existing) = self.data(key, prompt)? {
                return Ok(existing);
            }
            self.set(value.clone(), key, protection, false)?;
            Ok(value)
        })
    }

    /// Stores `value` under `key` with `protection`.
    ///
    /// With `replace` an existing unprotected item is updated in place and
    /// takes the given protection; without it an existing item is an error.
    ///
    /// # Errors
    ///
    /// - [`KeychainError::BiometryNotAvailable`] if `protection` is not `None`
    ///   and biometry cannot be evaluated. Nothing is written.
    /// - [`KeychainError::ItemExists`] if the item exists and `replace` is
    ///   `false`.
    /// - [`KeychainError::RemoveProtectedItemFirst`] if the existing item is
    ///   protected.
    /// - [`KeychainError::ChangedFromElsewhere`] if another writer added or
    ///   removed the item while this call was running.
    /// - [`KeychainError::Other`] if the platform refuses the access control
    ///   or the backend fails.
    pub fn set(
        &self,
        value: Vec<u8>,
        key: &str,
        protection: ProtectionLevel,
        replace: bool,
    ) -> KeychainResult<()> {
        self.synchronized("set", || {
            validate_key(key)?;
            if protection.requires_authentication() {
                self.ensure_biometry()?;
            }

            if self.contains_data(key)? {
                if !replace {
                    return Err(KeychainError::ItemExists);
                }
                self.update(key, value, protection)
            } else {
                self.add(key, value, protection)
            }
        })
    }

    /// Removes the item stored for `key`. Removing a missing item succeeds.
    ///
    /// # Errors
    ///
    /// [`KeychainError::InvalidKey`], [`KeychainError::InstanceNoLongerValid`],
    /// or [`KeychainError::Other`] for infrastructure failures.
    pub fn remove(&self, key: &str) -> KeychainResult<()> {
        self.synchronized("remove", || {
            validate_key(key)?;
            let query = self
                .item_query(key)
                .forbid_interaction()
                .build(self.backend.as_ref())?;
            self.delete(query)
        })
    }

    /// Removes every item of this store's namespace.
    ///
    /// # Errors
    ///
    /// [`KeychainError::InstanceNoLongerValid`] or [`KeychainError::Other`].
    pub fn remove_all(&self) -> KeychainResult<()> {
        self.synchronized("remove_all", || {
            let query = QueryBuilder::namespace(&self.identifier, self.access_group.as_deref())
                .scope_access_group(self.scope_access_group)
                .forbid_interaction()
                .build(self.backend.as_ref())?;
            self.delete(query)
        })
    }

    /// Marks this instance dead. Waits for an in-flight operation to finish;
    /// every later operation fails with
    /// [`KeychainError::InstanceNoLongerValid`].
    pub fn invalidate(&self) {
        self.state.synchronized(|state| state.valid.set(false));
        log::debug!("invalidated keychain store '{}'", self.identifier);
    }
}

impl KeychainStore {
    pub(crate) fn new(
        identifier: String,
        access_group: Option<String>,
        backend: Arc<dyn KeychainBackend>,
        oracle: Arc<dyn BiometryOracle>,
        config: &FactoryConfig,
    ) -> Self {
        Self {
            identifier,
            access_group,
            scope_access_group: config.execution_context.scopes_access_group(),
            max_reuse_duration: config.max_reuse_duration,
            backend,
            oracle,
            state: RecursiveLock::new(StoreState {
                valid: Cell::new(true),
            }),
        }
    }

    /// Runs `work` under the store lock, after checking the instance is still
    /// valid.
    fn synchronized<R, F>(&self, operation: &str, work: F) -> KeychainResult<R>
    where
        F: FnOnce() -> KeychainResult<R>,
    {
        self.state.synchronized(|state| {
            if !state.valid.get() {
                log::debug!(
                    "{operation} rejected: keychain store '{}' is no longer valid",
                    self.identifier
                );
                return Err(KeychainError::InstanceNoLongerValid);
            }
            work()
        })
    }

    fn item_query(&self, key: &str) -> QueryBuilder {
        QueryBuilder::item(&self.identifier, self.access_group.as_deref())
            .scope_access_group(self.scope_access_group)
            .key(key)
    }

    fn ensure_biometry(&self) -> KeychainResult<()> {
        let info = self.oracle.current_biometry_info();
        if info.can_authenticate() {
            return Ok(());
        }
        log::debug!(
            "biometry unavailable for '{}': {:?}",
            self.identifier,
            info.status
        );
        Err(KeychainError::BiometryNotAvailable)
    }

    fn check_reuse_duration(&self, prompt: &AuthenticationPrompt) -> KeychainResult<()> {
        if prompt.reuse_duration <= self.max_reuse_duration {
            return Ok(());
        }
        Err(InternalFailure::ReuseDurationTooLong {
            requested_ms: millis(prompt.reuse_duration),
            maximum_ms: millis(self.max_reuse_duration),
        }
        .into())
    }

    /// Reads attributes only, so it never prompts.
    fn stored_item(&self, key: &str) -> KeychainResult<StoredItem> {
        let query = self
            .item_query(key)
            .forbid_interaction()
            .build(self.backend.as_ref())?;
        match self.backend.query(query) {
            Ok(record) if record.protection.requires_authentication() => {
                Ok(StoredItem::Protected)
            }
            Ok(_) => Ok(StoredItem::Unprotected),
            Err(error) => match error.sec_status() {
                Some(SecStatus::ItemNotFound) => Ok(StoredItem::Absent),
                // Access-controlled items refuse even the attribute lookup.
                Some(SecStatus::InteractionNotAllowed | SecStatus::InteractionRequired) => {
                    Ok(StoredItem::Protected)
                }
                _ => Err(KeychainError::from_backend(error, BackendCall::Query)),
            },
        }
    }

    fn add(&self, key: &str, value: Vec<u8>, protection: ProtectionLevel) -> KeychainResult<()> {
        let len = value.len();
        let query = self
            .item_query(key)
            .payload(value)
            .protection(protection)
            .forbid_interaction()
            .build(self.backend.as_ref())?;
        self.backend
            .insert(query)
            .map_err(|error| KeychainError::from_backend(error, BackendCall::Insert))?;
        log::debug!(
            "added '{key}' ({len} bytes, {protection}) to '{}'",
            self.identifier
        );
        Ok(())
    }

    fn update(&self, key: &str, value: Vec<u8>, protection: ProtectionLevel) -> KeychainResult<()> {
        match self.stored_item(key)? {
            StoredItem::Absent => return Err(KeychainError::ChangedFromElsewhere),
            StoredItem::Protected => return Err(KeychainError::RemoveProtectedItemFirst),
            StoredItem::Unprotected => {}
        }

        let query = self
            .item_query(key)
            .forbid_interaction()
            .build(self.backend.as_ref())?;
        let changes = KeychainChanges {
            access_control: access_control(self.backend.as_ref(), protection)?,
            payload: value,
        };
        self.backend
            .update(query, changes)
            .map_err(|error| KeychainError::from_backend(error, BackendCall::Update))?;
        log::debug!("updated '{key}' ({protection}) in '{}'", self.identifier);
        Ok(())
    }

    fn delete(&self, query: crate::query::KeychainQuery) -> KeychainResult<()> {
        match self.backend.delete(query) {
            Ok(()) => Ok(()),
            Err(error) if error.sec_status() == Some(SecStatus::ItemNotFound) => Ok(()),
            Err(error) => Err(KeychainError::from_backend(error, BackendCall::Delete)),
        }
    }
}

const fn validate_key(key: &str) -> KeychainResult<()> {
    if key.is_empty() {
        return Err(KeychainError::InvalidKey);
    }
    Ok(())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
