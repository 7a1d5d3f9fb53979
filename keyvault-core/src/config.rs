//! Factory configuration.

use std::time::Duration;

use crate::types::MAX_AUTHENTICATION_REUSE_DURATION;

/// Where the process runs. Decides whether queries may be scoped to an
/// access group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, uniffi::Enum)]
pub enum ExecutionContext {
    /// A signed app on a physical device.
    #[default]
    Device,
    /// The iOS simulator.
    Simulator,
    /// A sandboxed host without keychain entitlements, such as a unit-test
    /// bundle.
    Sandboxed,
}

impl ExecutionContext {
    /// Whether queries carry the configured access group.
    ///
    /// Simulators and sandboxed hosts reject group-scoped queries, so the
    /// access-group clause is dropped there even when a group is configured.
    #[must_use]
    pub const fn scopes_access_group(self) -> bool {
        matches!(self, Self::Device)
    }
}

/// Configuration of a [`crate::KeychainFactory`].
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FactoryConfig {
    /// Wipe a store's content the first time its identifier is resolved by
    /// the factory. Models clearing keychain items that survived an app
    /// reinstall.
    pub remove_content_on_first_access: bool,
    /// Execution context of the process.
    pub execution_context: ExecutionContext,
    /// Longest authentication reuse window accepted in prompts.
    pub max_reuse_duration: Duration,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            remove_content_on_first_access: false,
            execution_context: ExecutionContext::Device,
            max_reuse_duration: MAX_AUTHENTICATION_REUSE_DURATION,
        }
    }
}

/// Default factory configuration, for bindings without `Default`.
#[uniffi::export]
#[must_use]
pub fn default_factory_config() -> FactoryConfig {
    FactoryConfig::default()
}
