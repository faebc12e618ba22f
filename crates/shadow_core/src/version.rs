//! Version constants.

/// Version of the running engine, stamped into every capture
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Record file format written by this engine
pub const BASELINE_FORMAT_VERSION: i64 = 1;

/// Record file formats this engine can read
pub const SUPPORTED_FORMAT_VERSIONS: &[i64] = &[1];

/// Check whether a record format version can be read
#[must_use]
pub fn is_supported_format(version: i64) -> bool {
    SUPPORTED_FORMAT_VERSIONS.contains(&version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_format_supported() {
        assert!(is_supported_format(BASELINE_FORMAT_VERSION));
        assert!(!is_supported_format(0));
        assert!(!is_supported_format(2));
    }

    #[test]
    fn test_engine_version_nonempty() {
        assert!(!ENGINE_VERSION.is_empty());
    }
}
