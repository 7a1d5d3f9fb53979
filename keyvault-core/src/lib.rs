#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

//! Synchronized, biometry-aware access to the platform keychain.
//!
//! `keyvault-core` sits between application code and the platform's secure
//! item store. The host provides the keychain ([`platform::KeychainBackend`])
//! and biometric policy evaluation ([`biometry::BiometryEvaluator`]) through
//! `UniFFI` foreign traits; this crate adds:
//!
//! - per-store serialization of every operation ([`lock`]),
//! - protection levels and authentication prompts ([`types`]),
//! - query assembly with access-control descriptors ([`query`]),
//! - the store state machine ([`KeychainStore`]) and its caching factory
//!   ([`KeychainFactory`]),
//! - a typed error taxonomy translated from platform statuses ([`error`],
//!   [`status`]).
//!
//! ```
//! use std::sync::Arc;
//! use keyvault_core::platform::{MemoryBiometry, MemoryKeychain};
//! use keyvault_core::{
//!     AuthenticationPrompt, BiometryType, FactoryConfig, KeychainError, KeychainFactory,
//!     ProtectionLevel,
//! };
//!
//! let factory = KeychainFactory::new(
//!     Arc::new(MemoryKeychain::new()),
//!     Some(Arc::new(MemoryBiometry::new(BiometryType::Face))),
//!     FactoryConfig::default(),
//! );
//! let store = factory.store("wallet", None).unwrap();
//!
//! store.set(b"seed".to_vec(), "seed", ProtectionLevel::AnyBiometricSet, false).unwrap();
//! assert_eq!(store.data("seed", None), Err(KeychainError::MissingAuthentication));
//!
//! let prompt = AuthenticationPrompt::new("Unlock your wallet");
//! assert_eq!(store.data("seed", Some(prompt)).unwrap(), Some(b"seed".to_vec()));
//! ```

pub mod biometry;
pub mod config;
pub mod error;
pub mod lock;
pub mod logger;
pub mod platform;
pub mod query;
pub mod status;
pub mod types;

mod factory;
mod store;

pub use biometry::{
    BiometryError, BiometryEvaluator, BiometryInfo, BiometryOracle, BiometryStatus,
    BiometryType, EvaluatorOracle, UnsupportedBiometry,
};
pub use config::{ExecutionContext, FactoryConfig};
pub use error::{InternalFailure, KeychainError, KeychainResult};
pub use factory::KeychainFactory;
pub use platform::KeychainBackend;
pub use status::{BackendError, SecStatus};
pub use store::KeychainStore;
pub use types::{
    AccessControl, AuthenticationPrompt, ProtectionLevel, MAX_AUTHENTICATION_REUSE_DURATION,
};

uniffi::setup_scaffolding!("keyvault_core");
