//! In-memory implementations of the platform traits.
//!
//! These implementations keep payloads in process memory and perform no real
//! authentication. They emulate the observable behavior of the platform
//! keychain closely enough to exercise every branch of the store:
//!
//! - items are keyed by (service, access group, account), and queries
//!   without an access group match items of any group;
//! - reading the payload of a protected item fails without a prompt or when
//!   interaction is forbidden, and otherwise resolves to a scripted
//!   [`AuthenticationOutcome`];
//! - protected items cannot be updated in place;
//! - any upcoming call of an operation can be made to fail with a chosen
//!   status.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;
use zeroize::Zeroizing;

use super::KeychainBackend;
use crate::biometry::{BiometryError, BiometryEvaluator, BiometryType};
use crate::query::{KeychainChanges, KeychainQuery, KeychainRecord};
use crate::status::{BackendError, SecStatus};
use crate::types::{AccessControl, ProtectionLevel};

// =============================================================================
// Memory Keychain
// =============================================================================

/// Backend operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    /// [`KeychainBackend::query`]
    Query,
    /// [`KeychainBackend::insert`]
    Insert,
    /// [`KeychainBackend::update`]
    Update,
    /// [`KeychainBackend::delete`]
    Delete,
    /// [`KeychainBackend::create_access_control`]
    CreateAccessControl,
}

/// Result of the emulated authentication prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticationOutcome {
    /// The user authenticates.
    #[default]
    Success,
    /// The user dismisses the prompt.
    UserCancel,
    /// Biometric matching fails.
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ItemKey {
    service: String,
    access_group: Option<String>,
    account: String,
}

impl ItemKey {
    fn matches(&self, query: &KeychainQuery) -> bool {
        self.service == query.service
            && query
                .access_group
                .as_ref()
                .map_or(true, |group| self.access_group.as_ref() == Some(group))
            && query
                .account
                .as_ref()
                .map_or(true, |account| &self.account == account)
    }
}

struct StoredItem {
    payload: Zeroizing<Vec<u8>>,
    protection: ProtectionLevel,
}

#[derive(Default)]
struct MemoryState {
    items: BTreeMap<ItemKey, StoredItem>,
    /// Per operation, the outcome of each upcoming call; `None` lets it through.
    failures: HashMap<BackendOperation, VecDeque<Option<SecStatus>>>,
    authentication: AuthenticationOutcome,
    deny_access_control: bool,
    prompts_presented: usize,
}

impl MemoryState {
    fn take_failure(&mut self, operation: BackendOperation) -> Result<(), BackendError> {
        let scheduled = self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
            .flatten();
        scheduled.map_or(Ok(()), |status| Err(status.into()))
    }
}

/// In-memory keychain backend.
///
/// Thread-safe; a single instance can back several factories to model
/// processes sharing one keychain.
#[derive(Default)]
pub struct MemoryKeychain {
    state: Mutex<MemoryState>,
}

impl MemoryKeychain {
    /// Creates an empty keychain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `operation` fail with `status`.
    pub fn fail_next(&self, operation: BackendOperation, status: SecStatus) {
        self.fail_nth(operation, 0, status);
    }

    /// Makes the call of `operation` after `skip` further calls fail with
    /// `status`. The calls before it behave normally unless scheduled too.
    pub fn fail_nth(&self, operation: BackendOperation, skip: usize, status: SecStatus) {
        let mut state = self.state.lock();
        let schedule = state.failures.entry(operation).or_default();
        if schedule.len() <= skip {
            schedule.resize(skip + 1, None);
        }
        schedule[skip] = Some(status);
    }

    /// Sets how subsequent authentication prompts resolve.
    pub fn set_authentication_outcome(&self, outcome: AuthenticationOutcome) {
        self.state.lock().authentication = outcome;
    }

    /// Makes access-control creation fail with `errSecParam` while enabled.
    pub fn deny_access_control(&self, deny: bool) {
        self.state.lock().deny_access_control = deny;
    }

    /// Number of authentication prompts presented so far.
    #[must_use]
    pub fn prompts_presented(&self) -> usize {
        self.state.lock().prompts_presented
    }

    /// Number of stored items across all services.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether `service` holds an item for `account`, in any access group.
    #[must_use]
    pub fn contains(&self, service: &str, account: &str) -> bool {
        self.state
            .lock()
            .items
            .keys()
            .any(|key| key.service == service && key.account == account)
    }

    /// Writes an item directly, bypassing every store. Models another process
    /// sharing the keychain.
    pub fn insert_external(
        &self,
        service: &str,
        access_group: Option<&str>,
        account: &str,
        payload: &[u8],
        protection: ProtectionLevel,
    ) {
        let key = ItemKey {
            service: service.to_owned(),
            access_group: access_group.map(str::to_owned),
            account: account.to_owned(),
        };
        self.state.lock().items.insert(
            key,
            StoredItem {
                payload: Zeroizing::new(payload.to_vec()),
                protection,
            },
        );
    }

    /// Deletes an item directly, bypassing every store.
    pub fn remove_external(&self, service: &str, account: &str) {
        self.state
            .lock()
            .items
            .retain(|key, _| !(key.service == service && key.account == account));
    }
}

fn protection_of(access_control: Option<&AccessControl>) -> ProtectionLevel {
    access_control.map_or(ProtectionLevel::None, |control| control.protection)
}

impl KeychainBackend for MemoryKeychain {
    fn query(&self, query: KeychainQuery) -> Result<KeychainRecord, BackendError> {
        let mut state = self.state.lock();
        state.take_failure(BackendOperation::Query)?;

        let (payload, protection) = state
            .items
            .iter()
            .find(|(key, _)| key.matches(&query))
            .map(|(_, item)| (item.payload.to_vec(), item.protection))
            .ok_or(SecStatus::ItemNotFound)?;

        if !query.return_data {
            return Ok(KeychainRecord {
                payload: None,
                protection,
            });
        }

        if protection.requires_authentication() {
            if !query.interaction_allowed {
                return Err(SecStatus::InteractionNotAllowed.into());
            }
            if query.prompt.is_none() {
                return Err(SecStatus::InteractionRequired.into());
            }
            state.prompts_presented += 1;
            match state.authentication {
                AuthenticationOutcome::Success => {}
                AuthenticationOutcome::UserCancel => return Err(SecStatus::UserCanceled.into()),
                AuthenticationOutcome::Failure => return Err(SecStatus::AuthFailed.into()),
            }
        }

        Ok(KeychainRecord {
            payload: Some(payload),
            protection,
        })
    }

    fn insert(&self, query: KeychainQuery) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.take_failure(BackendOperation::Insert)?;

        let (Some(account), Some(payload)) = (query.account.clone(), query.payload.clone()) else {
            return Err(SecStatus::Param.into());
        };
        if state.items.keys().any(|key| key.matches(&query)) {
            return Err(SecStatus::DuplicateItem.into());
        }

        let key = ItemKey {
            service: query.service,
            access_group: query.access_group,
            account,
        };
        state.items.insert(
            key,
            StoredItem {
                payload: Zeroizing::new(payload),
                protection: protection_of(query.access_control.as_ref()),
            },
        );
        Ok(())
    }

    fn update(&self, query: KeychainQuery, changes: KeychainChanges) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.take_failure(BackendOperation::Update)?;

        let matching: Vec<ItemKey> = state
            .items
            .keys()
            .filter(|key| key.matches(&query))
            .cloned()
            .collect();
        if matching.is_empty() {
            return Err(SecStatus::ItemNotFound.into());
        }
        if matching
            .iter()
            .any(|key| state.items[key].protection.requires_authentication())
        {
            return Err(SecStatus::InteractionNotAllowed.into());
        }

        let protection = protection_of(changes.access_control.as_ref());
        for key in matching {
            state.items.insert(
                key,
                StoredItem {
                    payload: Zeroizing::new(changes.payload.clone()),
                    protection,
                },
            );
        }
        Ok(())
    }

    fn delete(&self, query: KeychainQuery) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.take_failure(BackendOperation::Delete)?;

        let before = state.items.len();
        state.items.retain(|key, _| !key.matches(&query));
        if state.items.len() == before {
            return Err(SecStatus::ItemNotFound.into());
        }
        Ok(())
    }

    fn create_access_control(
        &self,
        protection: ProtectionLevel,
    ) -> Result<AccessControl, BackendError> {
        let mut state = self.state.lock();
        state.take_failure(BackendOperation::CreateAccessControl)?;
        if state.deny_access_control {
            return Err(SecStatus::Param.into());
        }
        Ok(AccessControl::for_protection(protection))
    }
}

// =============================================================================
// Memory Biometry
// =============================================================================

/// Biometry evaluator with a settable outcome.
pub struct MemoryBiometry {
    state: Mutex<(BiometryType, Option<i64>)>,
}

impl MemoryBiometry {
    /// Creates an evaluator reporting `biometry_type` as available.
    #[must_use]
    pub fn new(biometry_type: BiometryType) -> Self {
        Self {
            state: Mutex::new((biometry_type, None)),
        }
    }

    /// Makes policy evaluation fail with the given `LAError` code, or succeed
    /// again when `None`.
    pub fn set_policy_error(&self, code: Option<i64>) {
        self.state.lock().1 = code;
    }

    /// Changes the reported sensor kind.
    pub fn set_biometry_type(&self, biometry_type: BiometryType) {
        self.state.lock().0 = biometry_type;
    }
}

impl BiometryEvaluator for MemoryBiometry {
    fn biometry_type(&self) -> BiometryType {
        self.state.lock().0
    }

    fn can_evaluate_policy(&self) -> Result<(), BiometryError> {
        match self.state.lock().1 {
            Some(code) => Err(BiometryError::Policy { code }),
            None => Ok(()),
        }
    }
}
