//! SHADOW.TEST Core Types
//!
//! The canonical value model, SHA-256 hashing, semantic fingerprints, policy
//! snapshots, and the shared error taxonomy. This crate performs no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod fingerprint;
pub mod hash;
pub mod snapshot;
pub mod time;
pub mod value;
pub mod version;

// Re-exports
pub use error::{ErrorCategory, ShadowError, ShadowResult};
pub use fingerprint::{fingerprint, truncation_marker, Fingerprint, MAX_FINGERPRINT_DEPTH};
pub use hash::{sha256_hex, Hash};
pub use snapshot::PolicySnapshot;
pub use time::{utc_now_iso, Clock, FixedClock, SystemClock};
pub use value::{Map, Value};
pub use version::{BASELINE_FORMAT_VERSION, ENGINE_VERSION, SUPPORTED_FORMAT_VERSIONS};
