//! Caching constructor of [`KeychainStore`] instances.
//!
//! The factory hands out one shared store per identifier, binds each
//! identifier to the access group it was first requested with, and can
//! invalidate every store it handed out. Applications construct a factory
//! once and pass it to the code that needs keychain access; there is no
//! process-wide instance.
//!
//! The factory lock only guards its tables. Store operations never run while
//! it is held, with one exception: the first-access wipe of a store that has
//! not been published yet, which nobody else can reach.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::biometry::{
    BiometryEvaluator, BiometryInfo, BiometryOracle, EvaluatorOracle, UnsupportedBiometry,
};
use crate::config::FactoryConfig;
use crate::error::{KeychainError, KeychainResult};
use crate::lock::Lock;
use crate::platform::KeychainBackend;
use crate::store::KeychainStore;

#[derive(Default)]
struct FactoryState {
    instances: HashMap<String, Arc<KeychainStore>>,
    /// Access group each identifier was first requested with. Lives as long
    /// as the factory.
    access_groups: HashMap<String, Option<String>>,
    /// Identifiers whose first-access wipe already ran.
    wiped: HashSet<String>,
}

/// Creates, caches and invalidates keychain stores.
#[derive(uniffi::Object)]
pub struct KeychainFactory {
    backend: Arc<dyn KeychainBackend>,
    oracle: Arc<dyn BiometryOracle>,
    config: FactoryConfig,
    state: Lock<FactoryState>,
}

impl std::fmt::Debug for KeychainFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[uniffi::export]
impl KeychainFactory {
    /// Creates a factory over the host keychain.
    ///
    /// Without a `biometry` evaluator every protected operation fails with
    /// [`KeychainError::BiometryNotAvailable`], as on platforms without
    /// biometric hardware.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(
        backend: Arc<dyn KeychainBackend>,
        biometry: Option<Arc<dyn BiometryEvaluator>>,
        config: FactoryConfig,
    ) -> Self {
        let oracle: Arc<dyn BiometryOracle> = match biometry {
            Some(evaluator) => Arc::new(EvaluatorOracle::new(evaluator)),
            None => Arc::new(UnsupportedBiometry),
        };
        Self::with_oracle(backend, oracle, config)
    }

    /// Returns the store for `identifier`, creating it on first request.
    ///
    /// Repeated requests with the same `access_group` return the same
    /// instance. With `remove_content_on_first_access` the store is emptied
    /// the first time this factory resolves `identifier`; later requests,
    /// including after [`KeychainFactory::invalidate_all`], keep the content.
    ///
    /// # Errors
    ///
    /// - [`KeychainError::InvalidAccessGroup`] if `identifier` was requested
    ///   before with a different access group. Nothing changes.
    /// - Any error of [`KeychainStore::remove_all`] if the first-access wipe
    ///   fails. The store is not cached and the wipe runs again next time.
    pub fn store(
        &self,
        identifier: &str,
        access_group: Option<String>,
    ) -> KeychainResult<Arc<KeychainStore>> {
        let mut state = self.state.lock();

        if let Some(bound) = state.access_groups.get(identifier) {
            if *bound != access_group {
                log::warn!(
                    "store '{identifier}' is bound to access group {bound:?}, requested {access_group:?}"
                );
                return Err(KeychainError::InvalidAccessGroup {
                    identifier: identifier.to_owned(),
                });
            }
        }

        if let Some(store) = state.instances.get(identifier) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(KeychainStore::new(
            identifier.to_owned(),
            access_group.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.oracle),
            &self.config,
        ));

        if self.config.remove_content_on_first_access && !state.wiped.contains(identifier) {
            store.remove_all()?;
            state.wiped.insert(identifier.to_owned());
            log::debug!("removed stale content of '{identifier}' on first access");
        }

        state
            .access_groups
            .insert(identifier.to_owned(), access_group);
        state
            .instances
            .insert(identifier.to_owned(), Arc::clone(&store));
        log::debug!("created keychain store '{identifier}'");
        Ok(store)
    }

    /// Invalidates every cached store and empties the cache.
    ///
    /// Holders of a previously returned store get
    /// [`KeychainError::InstanceNoLongerValid`] from then on. Access-group
    /// bindings and first-access records are kept.
    pub fn invalidate_all(&self) {
        let stores: Vec<Arc<KeychainStore>> = self
            .state
            .synchronized(|state| state.instances.drain().map(|(_, store)| store).collect());

        // Outside the factory lock: invalidation waits for in-flight operations.
        for store in &stores {
            store.invalidate();
        }
        log::debug!("invalidated {} keychain stores", stores.len());
    }

    /// Invalidates and evicts the cached store for `identifier`, if any.
    pub fn invalidate(&self, identifier: &str) {
        let store = self
            .state
            .synchronized(|state| state.instances.remove(identifier));
        if let Some(store) = store {
            store.invalidate();
        }
    }

    /// Identifiers with a cached store, sorted.
    #[must_use]
    pub fn cached_identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self
            .state
            .synchronized(|state| state.instances.keys().cloned().collect());
        identifiers.sort_unstable();
        identifiers
    }

    /// Current biometric capability, for UI display.
    #[must_use]
    pub fn biometry_info(&self) -> BiometryInfo {
        self.oracle.current_biometry_info()
    }
}

impl KeychainFactory {
    /// Creates a factory with an explicit biometry oracle.
    #[must_use]
    pub fn with_oracle(
        backend: Arc<dyn KeychainBackend>,
        oracle: Arc<dyn BiometryOracle>,
        config: FactoryConfig,
    ) -> Self {
        Self {
            backend,
            oracle,
            config,
            state: Lock::new(FactoryState::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometry::{BiometryStatus, BiometryType};
    use crate::platform::memory::BackendOperation;
    use crate::platform::{MemoryBiometry, MemoryKeychain};
    use crate::status::SecStatus;
    use crate::types::ProtectionLevel;
    use std::sync::Barrier;
    use std::thread;

    fn factory(backend: &Arc<MemoryKeychain>, wipe: bool) -> KeychainFactory {
        KeychainFactory::new(
            Arc::clone(backend) as Arc<dyn KeychainBackend>,
            Some(Arc::new(MemoryBiometry::new(BiometryType::Fingerprint))),
            FactoryConfig {
                remove_content_on_first_access: wipe,
                ..FactoryConfig::default()
            },
        )
    }

    #[test]
    fn test_store_is_cached_until_invalidate_all() {
        let backend = Arc::new(MemoryKeychain::new());
        let factory = factory(&backend, false);

        let first = factory.store("id1", None).expect("store");
        let second = factory.store("id1", None).expect("store");
        assert!(Arc::ptr_eq(&first, &second));

        factory.invalidate_all();
        let third = factory.store("id1", None).expect("store");
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(
            first.contains_data("k"),
            Err(KeychainError::InstanceNoLongerValid)
        );
        assert!(third.is_valid());
        assert!(!third.contains_data("k").expect("contains"));
    }

    #[test]
    fn test_access_group_binding() {
        let backend = Arc::new(MemoryKeychain::new());
        let factory = factory(&backend, false);

        let store = factory
            .store("id2", Some("A".to_string()))
            .expect("store");
        let mismatch = Err(KeychainError::InvalidAccessGroup {
            identifier: "id2".to_string(),
        });
        assert_eq!(
            factory.store("id2", Some("B".to_string())).map(|_| ()),
            mismatch
        );
        assert_eq!(factory.store("id2", None).map(|_| ()), mismatch);

        // A rejected request leaves the cached instance in place.
        let again = factory
            .store("id2", Some("A".to_string()))
            .expect("store");
        assert!(Arc::ptr_eq(&store, &again));
        assert_eq!(store.access_group().as_deref(), Some("A"));
    }

    #[test]
    fn test_nil_group_binding_rejects_later_group() {
        let backend = Arc::new(MemoryKeychain::new());
        let factory = factory(&backend, false);
        factory.store("id3", None).expect("store");
        assert!(matches!(
            factory.store("id3", Some("A".to_string())),
            Err(KeychainError::InvalidAccessGroup { .. })
        ));
    }

    #[test]
    fn test_access_group_binding_survives_invalidation() {
        let backend = Arc::new(MemoryKeychain::new());
        let factory = factory(&backend, false);
        factory
            .store("id4", Some("A".to_string()))
            .expect("store");
        factory.invalidate_all();
        assert!(matches!(
            factory.store("id4", Some("B".to_string())),
            Err(KeychainError::InvalidAccessGroup { .. })
        ));
    }

    #[test]
    fn test_wipe_runs_once_per_factory() {
        let backend = Arc::new(MemoryKeychain::new());
        backend.insert_external("S", None, "stale", b"old install", ProtectionLevel::None);

        let factory_a = factory(&backend, true);
        let store = factory_a.store("S", None).expect("store");
        assert!(!store.contains_data("stale").expect("contains"));

        store
            .set(vec![1, 2, 3], "k", ProtectionLevel::None, true)
            .expect("set");
        factory_a.invalidate_all();
        let store = factory_a.store("S", None).expect("store");
        assert_eq!(store.data("k", None).expect("data"), Some(vec![1, 2, 3]));

        // A new factory models a fresh process.
        let factory_b = factory(&backend, true);
        let store = factory_b.store("S", None).expect("store");
        assert_eq!(store.data("k", None).expect("data"), None);
    }

    #[test]
    fn test_failed_wipe_is_retried() {
        let backend = Arc::new(MemoryKeychain::new());
        backend.insert_external("S", None, "stale", b"x", ProtectionLevel::None);
        let factory = factory(&backend, true);

        backend.fail_next(BackendOperation::Delete, SecStatus::Io);
        assert!(factory.store("S", None).is_err());
        assert!(factory.cached_identifiers().is_empty());
        assert!(backend.contains("S", "stale"));

        factory.store("S", None).expect("store");
        assert!(!backend.contains("S", "stale"));
    }

    #[test]
    fn test_concurrent_first_access_wipes_once() {
        let backend = Arc::new(MemoryKeychain::new());
        let factory = Arc::new(factory(&backend, true));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8_u8)
            .map(|writer| {
                let factory = Arc::clone(&factory);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let store = factory.store("S", None).expect("store");
                    store
                        .set(vec![writer], &format!("k{writer}"), ProtectionLevel::None, true)
                        .expect("set");
                    store
                })
            })
            .collect();
        let stores: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread join"))
            .collect();

        assert!(stores.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        // A second wipe would have removed writes of earlier threads.
        assert_eq!(backend.item_count(), 8);
    }

    #[test]
    fn test_invalidate_single_store() {
        let backend = Arc::new(MemoryKeychain::new());
        let factory = factory(&backend, false);
        let a = factory.store("a", None).expect("store");
        let b = factory.store("b", None).expect("store");
        assert_eq!(factory.cached_identifiers(), vec!["a", "b"]);

        factory.invalidate("a");
        factory.invalidate("unknown");
        assert!(!a.is_valid());
        assert!(b.is_valid());
        assert_eq!(factory.cached_identifiers(), vec!["b"]);
    }

    #[test]
    fn test_factory_without_biometry() {
        let backend = Arc::new(MemoryKeychain::new());
        let factory = KeychainFactory::new(
            Arc::clone(&backend) as Arc<dyn KeychainBackend>,
            None,
            FactoryConfig::default(),
        );
        assert_eq!(factory.biometry_info(), BiometryInfo::UNSUPPORTED);

        let store = factory.store("S", None).expect("store");
        assert_eq!(
            store.set(vec![1], "k", ProtectionLevel::AnyBiometricSet, true),
            Err(KeychainError::BiometryNotAvailable)
        );
        store
            .set(vec![1], "k", ProtectionLevel::None, true)
            .expect("unprotected set");
    }

    #[test]
    fn test_biometry_info_reflects_evaluator() {
        let backend = Arc::new(MemoryKeychain::new());
        let biometry = Arc::new(MemoryBiometry::new(BiometryType::Face));
        let factory = KeychainFactory::new(
            Arc::clone(&backend) as Arc<dyn KeychainBackend>,
            Some(Arc::clone(&biometry) as Arc<dyn BiometryEvaluator>),
            FactoryConfig::default(),
        );
        assert!(factory.biometry_info().can_authenticate());

        biometry.set_policy_error(Some(-7));
        assert_eq!(factory.biometry_info().status, BiometryStatus::NotEnrolled);
    }
}
