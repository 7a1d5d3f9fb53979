//! `KeyVault`: keychain access control for iOS and macOS clients.
//!
//! This crate is what applications and the binding generator link. It
//! re-exports [`keyvault_core`] and its `UniFFI` scaffolding, so one
//! `cdylib`/`staticlib` carries the whole exported surface.

pub use keyvault_core::*;

keyvault_core::uniffi_reexport_scaffolding!();
