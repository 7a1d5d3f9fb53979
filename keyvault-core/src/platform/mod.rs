//! Platform abstraction for the secure item store.
//!
//! The keychain itself is provided by the host application. On Apple
//! platforms a Swift implementation of [`KeychainBackend`] turns each
//! [`KeychainQuery`] into a `SecItem*` attribute dictionary and reports the
//! raw `OSStatus` of every failed call:
//!
//! ```swift
//! final class SecItemBackend: KeychainBackend {
//!     func delete(query: KeychainQuery) throws {
//!         let status = SecItemDelete(query.attributes as CFDictionary)
//!         guard status == errSecSuccess else { throw BackendError.Status(code: status) }
//!     }
//!     // ...
//! }
//! ```
//!
//! [`memory`] provides an in-process implementation used by the tests and by
//! hosts without a keychain.
//!
//! Backends are stateless from the store's point of view: the store never
//! assumes it is the only writer of a namespace, and reports items that
//! appear or vanish underneath it as `ChangedFromElsewhere`.

pub mod memory;

pub use memory::{MemoryBiometry, MemoryKeychain};

use crate::query::{KeychainChanges, KeychainQuery, KeychainRecord};
use crate::status::BackendError;
use crate::types::{AccessControl, ProtectionLevel};

/// Secure item store provided by the host platform.
///
/// All calls are synchronous. A read of a protected item may block while the
/// platform presents the authentication prompt.
#[uniffi::export(with_foreign)]
pub trait KeychainBackend: Send + Sync {
    /// Looks up the first item matching `query`.
    ///
    /// The payload is only returned when `query.return_data` is set; reading
    /// attributes alone never requires authentication.
    ///
    /// # Errors
    ///
    /// `errSecItemNotFound` when nothing matches; any other platform status
    /// otherwise.
    fn query(&self, query: KeychainQuery) -> Result<KeychainRecord, BackendError>;

    /// Adds the item described by `query` (key, payload, access control).
    ///
    /// # Errors
    ///
    /// `errSecDuplicateItem` if the item already exists.
    fn insert(&self, query: KeychainQuery) -> Result<(), BackendError>;

    /// Replaces payload and access control of the items matching `query`.
    ///
    /// # Errors
    ///
    /// `errSecItemNotFound` when nothing matches.
    fn update(&self, query: KeychainQuery, changes: KeychainChanges) -> Result<(), BackendError>;

    /// Deletes every item matching `query`.
    ///
    /// # Errors
    ///
    /// `errSecItemNotFound` when nothing matches.
    fn delete(&self, query: KeychainQuery) -> Result<(), BackendError>;

    /// Creates the access-control descriptor for a protected write
    /// (`SecAccessControlCreateWithFlags`).
    ///
    /// # Errors
    ///
    /// Any status the platform reports when it refuses the descriptor.
    fn create_access_control(
        &self,
        protection: ProtectionLevel,
    ) -> Result<AccessControl, BackendError>;
}
