//! Shared support for unit tests.

use std::sync::Once;

/// Installs a test-writer tracing subscriber once per process. Safe to call
/// from every test; later calls are no-ops.
pub(crate) fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        #[cfg(feature = "tracing")]
        {
            use tracing_subscriber::EnvFilter;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}
