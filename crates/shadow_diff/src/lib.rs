//! SHADOW.TEST Diff Engine
//!
//! Policy-driven filtering and normalization, depth-first structural
//! comparison with severity classification, and human-readable explanation.
//!
//! Diff semantics (version 1):
//! - a runtime type mismatch is a high-severity change;
//! - added or removed keys are high-severity changes;
//! - scalar value and list length mismatches are medium-severity changes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod explain;
pub mod filter;
pub mod normalize;
pub mod policy;

pub use diff::{diff, ChangeType, DiffChange, DiffEngine, Severity, DEFAULT_MAX_DIFF_DEPTH};
pub use explain::{explain_human, reorder_hint, summarize};
pub use filter::{apply_policy, DEPTH_SENTINEL, MAX_POLICY_DEPTH};
pub use normalize::{normalize, prepare};
pub use policy::{DiffPolicy, DEFAULT_POLICY_ID, DIFF_SEMANTICS_VERSION};
