//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
///
/// Honors `RUST_LOG`. Calling this more than once is harmless; later calls are ignored.
pub fn init() {
    let _ = env_logger::try_init();
}
