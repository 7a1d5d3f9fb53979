//! Integration tests for the keyvault store.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use keyvault_core::platform::memory::AuthenticationOutcome;
use keyvault_core::{
    AuthenticationPrompt, BiometryStatus, InternalFailure, KeychainError, ProtectionLevel,
};
use rand::Rng;
use test_case::test_case;

#[test]
fn test_random_payload_lifecycle() {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory.store("S", None).expect("store");
    let payload = common::random_payload(128);

    store
        .set(payload.clone(), "Key1", ProtectionLevel::None, true)
        .expect("set");
    assert!(store.contains_data("Key1").expect("contains"));
    assert_eq!(store.data("Key1", None).expect("data"), Some(payload));

    store.remove("Key1").expect("remove");
    assert!(!store.contains_data("Key1").expect("contains"));
    assert_eq!(store.data("Key1", None).expect("data"), None);
}

#[test]
fn test_round_trip_random_payloads() {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory
        .store(&common::unique_identifier(), None)
        .expect("store");
    let mut rng = rand::thread_rng();

    for round in 0..32 {
        let len = rng.gen_range(1..=2048);
        let payload = common::random_payload(len);
        let key = format!("key-{round}");
        store
            .set(payload.clone(), &key, ProtectionLevel::None, true)
            .expect("set");
        assert_eq!(store.data(&key, None).expect("data"), Some(payload));
    }
}

#[test]
fn test_remove_missing_keys() {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory.store("empty", None).expect("store");

    store.remove("never-written").expect("remove on empty store");
    store
        .set(vec![1], "present", ProtectionLevel::None, false)
        .expect("set");
    store.remove("never-written").expect("remove absent key");
    assert!(store.contains_data("present").expect("contains"));
}

#[test]
fn test_no_replace_keeps_first_value() {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory.store("S", None).expect("store");

    store
        .set(b"v1".to_vec(), "k", ProtectionLevel::None, false)
        .expect("set");
    assert_eq!(
        store.set(b"v2".to_vec(), "k", ProtectionLevel::None, false),
        Err(KeychainError::ItemExists)
    );
    assert_eq!(store.data("k", None).expect("data"), Some(b"v1".to_vec()));
}

#[test]
fn test_protected_item_is_replaced_through_remove() {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory.store("S", None).expect("store");

    store
        .set(b"v1".to_vec(), "k", ProtectionLevel::AnyBiometricSet, true)
        .expect("set");
    assert_eq!(
        store.set(b"v2".to_vec(), "k", ProtectionLevel::AnyBiometricSet, true),
        Err(KeychainError::RemoveProtectedItemFirst)
    );

    store.remove("k").expect("remove");
    store
        .set(b"v2".to_vec(), "k", ProtectionLevel::AnyBiometricSet, true)
        .expect("set");
    let prompt = AuthenticationPrompt::new("Confirm");
    assert_eq!(
        store.data("k", Some(prompt)).expect("data"),
        Some(b"v2".to_vec())
    );
}

#[test_case(ProtectionLevel::CurrentBiometricSet ; "current biometric set")]
#[test_case(ProtectionLevel::AnyBiometricSet ; "any biometric set")]
#[test_case(ProtectionLevel::AnyBiometricSetOrPasscode ; "biometric or passcode")]
fn test_protected_read_needs_prompt(protection: ProtectionLevel) {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory.store("S", None).expect("store");

    store.set(vec![42], "k", protection, true).expect("set");
    assert_eq!(
        store.data("k", None),
        Err(KeychainError::MissingAuthentication)
    );
    assert!(store.contains_data("k").expect("contains"));
    assert_eq!(device.keychain.prompts_presented(), 0);
}

#[test]
fn test_or_set_returns_first_value() {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory.store("S", None).expect("store");

    assert_eq!(store.data("k", None).expect("data"), None);
    assert_eq!(
        store
            .data_or_set("k", b"first".to_vec(), ProtectionLevel::None, None)
            .expect("or set"),
        b"first".to_vec()
    );
    assert_eq!(
        store
            .data_or_set("k", b"second".to_vec(), ProtectionLevel::None, None)
            .expect("or set"),
        b"first".to_vec()
    );
}

#[test]
fn test_biometry_state_is_read_per_operation() {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory.store("S", None).expect("store");
    store
        .set(vec![1], "k", ProtectionLevel::CurrentBiometricSet, true)
        .expect("set");

    device.biometry.set_policy_error(Some(-7));
    assert_eq!(factory.biometry_info().status, BiometryStatus::NotEnrolled);
    assert_eq!(
        store.data("k", Some(AuthenticationPrompt::new("Unlock"))),
        Err(KeychainError::BiometryNotAvailable)
    );

    device.biometry.set_policy_error(None);
    assert_eq!(
        store
            .data("k", Some(AuthenticationPrompt::new("Unlock")))
            .expect("data"),
        Some(vec![1])
    );
}

#[test]
fn test_prompt_outcomes() {
    let device = common::Device::new();
    let factory = device.launch_default();
    let store = factory.store("S", None).expect("store");
    store
        .set(vec![1], "k", ProtectionLevel::AnyBiometricSetOrPasscode, true)
        .expect("set");
    let prompt = || Some(AuthenticationPrompt::new("Unlock"));

    device
        .keychain
        .set_authentication_outcome(AuthenticationOutcome::UserCancel);
    let cancelled = store.data("k", prompt()).expect_err("cancelled");
    assert_eq!(cancelled, KeychainError::UserCancel);
    assert!(cancelled.is_authentication_error());

    device
        .keychain
        .set_authentication_outcome(AuthenticationOutcome::Failure);
    assert_eq!(
        store.data("k", prompt()),
        Err(KeychainError::AuthenticationFailed)
    );

    assert_eq!(
        store.data(
            "k",
            Some(AuthenticationPrompt::new("Unlock").without_interaction())
        ),
        Err(KeychainError::DisabledAuthentication)
    );
}

#[test]
fn test_reuse_window_limit_follows_config() {
    let device = common::Device::new();
    let factory = device.launch(keyvault_core::FactoryConfig {
        max_reuse_duration: Duration::from_secs(10),
        ..keyvault_core::FactoryConfig::default()
    });
    let store = factory.store("S", None).expect("store");
    store
        .set(vec![1], "k", ProtectionLevel::AnyBiometricSet, true)
        .expect("set");

    let within = AuthenticationPrompt::new("Unlock").with_reuse_duration(Duration::from_secs(10));
    assert_eq!(store.data("k", Some(within)).expect("data"), Some(vec![1]));

    let beyond = AuthenticationPrompt::new("Unlock").with_reuse_duration(Duration::from_secs(11));
    assert_eq!(
        store.data("k", Some(beyond)),
        Err(KeychainError::Other {
            failure: InternalFailure::ReuseDurationTooLong {
                requested_ms: 11_000,
                maximum_ms: 10_000,
            }
        })
    );
}

#[test]
fn test_other_process_writes_are_observed() {
    let device = common::Device::new();
    let identifier = common::unique_identifier();
    let app = device.launch_default();
    let extension = device.launch_default();

    let app_store = app.store(&identifier, None).expect("store");
    let extension_store = extension.store(&identifier, None).expect("store");
    assert!(!Arc::ptr_eq(&app_store, &extension_store));

    extension_store
        .set(b"token".to_vec(), "session", ProtectionLevel::None, false)
        .expect("set");
    assert_eq!(
        app_store.set(b"other".to_vec(), "session", ProtectionLevel::None, false),
        Err(KeychainError::ItemExists)
    );
    assert_eq!(
        app_store.data("session", None).expect("data"),
        Some(b"token".to_vec())
    );

    app_store.remove_all().expect("remove all");
    assert_eq!(extension_store.data("session", None).expect("data"), None);
}

#[test]
fn test_parallel_writers_on_one_store() {
    const WRITERS: usize = 8;
    let device = common::Device::new();
    let factory = Arc::new(device.launch_default());
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let factory = Arc::clone(&factory);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = factory.store("shared", None).expect("store");
                barrier.wait();
                // Everyone races for the same key; exactly one add wins.
                let outcome = store.set(vec![1], "contended", ProtectionLevel::None, false);
                let payload = common::random_payload(64);
                let key = format!("writer-{writer}");
                store
                    .set(payload.clone(), &key, ProtectionLevel::None, true)
                    .expect("set");
                assert_eq!(store.data(&key, None).expect("data"), Some(payload));
                outcome
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread join"))
        .collect();
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err())
        .all(|error| *error == KeychainError::ItemExists));
    assert_eq!(device.keychain.item_count(), WRITERS + 1);
}
