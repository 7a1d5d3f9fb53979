//! Common test utilities shared across integration tests.

use std::sync::{Arc, Once};

use keyvault_core::platform::{MemoryBiometry, MemoryKeychain};
use keyvault_core::{
    BiometryEvaluator, BiometryType, FactoryConfig, KeychainBackend, KeychainFactory,
};
use rand::{rngs::OsRng, RngCore};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Routes `log` records to the test output. Set `RUST_LOG=keyvault_core=debug`
/// to see them.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_log::LogTracer::init();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A keychain and biometry shared by every factory built from it, like the
/// processes of one device.
pub struct Device {
    /// Shared in-memory keychain.
    pub keychain: Arc<MemoryKeychain>,
    /// Shared in-memory biometry evaluator.
    pub biometry: Arc<MemoryBiometry>,
}

impl Device {
    /// Creates a fresh device with an empty keychain and face biometry.
    pub fn new() -> Self {
        init_logging();
        Self {
            keychain: Arc::new(MemoryKeychain::new()),
            biometry: Arc::new(MemoryBiometry::new(BiometryType::Face)),
        }
    }

    /// Starts a "process": a fresh factory over this device's keychain.
    pub fn launch(&self, config: FactoryConfig) -> KeychainFactory {
        KeychainFactory::new(
            Arc::clone(&self.keychain) as Arc<dyn KeychainBackend>,
            Some(Arc::clone(&self.biometry) as Arc<dyn BiometryEvaluator>),
            config,
        )
    }

    /// Starts a "process" with the default factory configuration.
    #[allow(dead_code, reason = "used in tests")]
    pub fn launch_default(&self) -> KeychainFactory {
        self.launch(FactoryConfig::default())
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a unique service identifier for test isolation.
pub fn unique_identifier() -> String {
    format!("keyvault-test-{}", Uuid::new_v4())
}

/// Returns `len` random bytes.
#[allow(dead_code, reason = "used in tests")]
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    OsRng.fill_bytes(&mut payload);
    payload
}
