//! Logging initialization with tracing

use crate::{Error, Result};

/// Initialize the tracing subscriber for an embedding process.
///
/// Configures:
/// - Environment filter (`RUST_LOG`, defaults to INFO level)
/// - Stderr output (to avoid mixing with stdout)
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::unknown(format!("Failed to initialize tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let _ = init_tracing();
        assert!(init_tracing().is_err());
    }
}
